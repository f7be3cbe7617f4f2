pub mod columns;
pub mod filter;
pub mod handlers;
pub mod repository;
pub mod request;
pub mod service;
pub mod text;

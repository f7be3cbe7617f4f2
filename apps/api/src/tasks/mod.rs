pub mod handlers;
pub mod processor;
pub mod question;
pub mod repository;
pub mod service;
pub mod simple;
pub mod upload;

pub mod candidate;
pub mod property;
pub mod task;

pub mod detector;
pub mod task;
pub mod types;

// Public API - what other modules can use
pub use handlers::{create_exercise, delete_exercise, get_exercise, list_exercises, update_exercise};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
mod service;
pub mod types;

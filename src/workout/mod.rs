// Public API - what other modules can use
pub use handlers::{create_workout, delete_workout, get_workout, list_workouts, update_workout};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
mod service;
pub mod types;

// Public API - what other modules can use
pub use handlers::{aggregate_stats, exercise_progress, workout_stats};

// Internal modules
mod handlers;
pub mod models;
mod service;
pub mod types;

// Public API - what other modules can use
pub use handlers::{create_template, delete_template, get_template, list_templates};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
mod service;
pub mod types;

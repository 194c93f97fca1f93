pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use error::CollectionsError;
pub use services::CollectionsEngine;

//! service-core: Shared infrastructure for the story and quiz services.
pub mod config;
pub mod error;
pub mod fallback;
pub mod middleware;
pub mod observability;
pub mod providers;
pub mod server;


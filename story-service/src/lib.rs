//! Story service: subject → title, title → streamed children's story.

pub mod config;
pub mod handlers;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};

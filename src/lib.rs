pub mod commands;
pub mod config;
pub mod errors;
pub mod instagram;
pub mod security;
pub mod story_processor;
pub mod uploader;

pub use commands::{
    handler, handler_with, run_cycle, run_cycle_with, run_once, HandlerResponse, RunOutcome,
};
pub use config::{Config, SourceCredential};
pub use errors::{AppError, AppResult};

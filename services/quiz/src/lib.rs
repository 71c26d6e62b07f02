pub mod commands;
pub mod config;
pub mod document;
pub mod prompt_loader;
pub mod report;
pub mod sinks;

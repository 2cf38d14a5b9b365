pub mod cache;
pub mod cli;
pub mod config;
pub mod docx;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod script;
pub mod selector;
pub mod source;
pub mod util;

pub mod bridge;
pub mod chain;
pub mod config;
pub mod error;
pub mod logger;
pub mod persistency;
pub mod stellar;

pub mod config;
pub mod error;
pub mod input;

pub use config::{Config, EngineConfig, HarnessConfig, OutputFormat};
pub use error::*;
pub use input::Tokens;

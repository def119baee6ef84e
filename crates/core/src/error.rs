use thiserror::Error;

/// Fatal errors raised while preparing a benchmark: missing or malformed
/// input files and unusable configuration. These are never retried.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Missing value: {0}")]
    Missing(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type InputResult<T> = Result<T, InputError>;

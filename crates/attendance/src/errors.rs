use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("remote sync error: {0}")]
    Remote(String),
}

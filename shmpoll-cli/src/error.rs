use shmpoll_config::ConfigError;
use shmpoll_core::PollError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Epoll error: {0}")]
    Poll(#[from] PollError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("Failed to export metrics: {0}")]
    Metrics(String),
}

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("module key `{0}` registered twice")]
    DuplicateModule(&'static str),
    #[error("no queue to capture from")]
    NoQueues,
}

use thiserror::Error;

use crate::api::ApiError;
use crate::app::ConfigError;
use crate::catalog::compare::CompareError;
use crate::catalog::profile::ProfileError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("not signed in; run `evmarket login --user-id <id> --name <name>` first")]
    NotLoggedIn,
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

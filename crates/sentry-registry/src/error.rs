use sea_orm::DbErr;
use sentry_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("project not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => CoreError::ProjectNotFound,
            RegistryError::Forbidden => CoreError::Forbidden,
            RegistryError::Database(source) => CoreError::Internal(source.into()),
        }
    }
}

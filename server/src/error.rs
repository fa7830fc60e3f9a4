use common::network::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    /// Keeps the whole context chain of a collaborator failure.
    pub fn store(error: anyhow::Error) -> Self {
        Self::StoreUnavailable(format!("{:#}", error))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::NotAuthenticated => ErrorCode::NotAuthenticated,
            LedgerError::InvalidInput(_) => ErrorCode::InvalidInput,
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            LedgerError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
        }
    }
}

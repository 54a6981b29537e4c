// src/error.rs
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("must provide username and password")]
    MissingCredentials,

    #[error("invalid username and/or password")]
    InvalidCredentials,

    #[error("login required")]
    Unauthenticated,

    #[error("username already exists")]
    UsernameTaken,

    #[error("not enough cash")]
    InsufficientCash,

    #[error("not enough shares")]
    InsufficientShares,

    #[error("invalid symbol")]
    InvalidSymbol,

    #[error("could not retrieve quote for {0}")]
    QuoteUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingCredentials | AppError::InvalidCredentials => StatusCode::FORBIDDEN,
            AppError::Unauthenticated => StatusCode::SEE_OTHER,
            AppError::Database(_) | AppError::Session(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Text that is safe to show on the apology page.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Session(_) | AppError::Config(_) => {
                "something went wrong".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }
}

impl Reject for AppError {}

pub type Result<T> = std::result::Result<T, AppError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed")]
    PreconditionFailed,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Wrong password or unknown account. Rendered inline by the login
    /// page, never sent as a bare status.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MalformedRequest(_) => 400,
            ServerError::Unauthorized(_) | ServerError::InvalidCredentials => 401,
            ServerError::NotFound(_) => 404,
            ServerError::PreconditionFailed => 412,
            ServerError::Unsupported(_) | ServerError::Io(_) => 500,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad payload: {0}")]
    BadPayload(String),
    #[error("invalid internet address {0:?}")]
    InvalidAddress(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// The HTTP status an inbound request failing with this error is answered with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadPayload(_) | Error::InvalidAddress(_) | Error::MalformedRequest(_) => 400,
            Error::RequestTooLarge { .. } => 413,
            Error::InvalidConfig(_) => 500,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(e: httparse::Error) -> Self {
        Error::MalformedRequest(e.to_string())
    }
}

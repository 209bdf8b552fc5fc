//! Error types for the CMDB API client.
//!
//! # Design
//! Three outcomes matter to callers: the request never completed
//! (`Transport`), the server refused it (`Server`, any non-200 status), or
//! the server answered 200 with a body we cannot make sense of (`Decode`).
//! Transport failures are passed through unexamined; server errors carry the
//! status code plus whatever `message` the error body held (empty when the
//! body itself fails to decode).

use std::fmt;

/// Errors returned by `CmdbClient` operations.
#[derive(Debug)]
pub enum ApiError {
    /// Network-level failure — DNS, connect, TLS, or mid-stream I/O. The
    /// underlying error is propagated unchanged.
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The server returned a non-200 status. `message` is the decoded
    /// `{"message": ...}` error body, or empty if it did not decode.
    Server { status: u16, message: String },

    /// A 200 response whose body did not match the expected result shape.
    Decode(String),

    /// The request payload could not be serialized to JSON.
    Encode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(err) => write!(f, "transport error: {err}"),
            ApiError::Server { status, message } => {
                write!(f, "httpCode={status} message={message}")
            }
            ApiError::Decode(msg) => write!(f, "decode failed: {msg}"),
            ApiError::Encode(msg) => write!(f, "encode failed: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_status_and_message() {
        let err = ApiError::Server {
            status: 404,
            message: "not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn transport_error_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ApiError::Transport(Box::new(io));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("refused"));
    }
}

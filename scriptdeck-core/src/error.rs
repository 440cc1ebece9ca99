//! Client-side error taxonomy
//!
//! Every failure the client can observe is non-fatal. The session only needs
//! to know which bucket an error falls into to decide whether to degrade the
//! connection indicator, show a notification, or refetch the inventory.

use thiserror::Error;

use crate::model::ScriptId;

/// Errors produced while talking to the process-manager backend
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Request rejected, unresolved, or timed out
    #[error("network error: {message}")]
    Network { message: String },
    /// Backend answered `success: false`
    #[error("{message}")]
    Application { message: String },
    /// Action referenced a script the backend no longer knows
    #[error("script not found: {id}")]
    NotFound { id: ScriptId },
    /// Backend answered with a body we could not decode
    #[error("malformed response: {message}")]
    Decode { message: String },
    /// Backend rejected our credentials
    #[error("unauthorized")]
    Unauthorized,
    /// Push channel handshake or framing failure
    #[error("push channel: {message}")]
    Push { message: String },
}

/// Coarse classification used by the session reducer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Keep prior state, degrade the connection indicator
    Network,
    /// Surface as a transient notification
    Application,
    /// Notify and refetch the inventory
    NotFound,
}

impl ClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn push(message: impl Into<String>) -> Self {
        Self::Push {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Decode { .. } | Self::Push { .. } => ErrorKind::Network,
            Self::Application { .. } | Self::Unauthorized => ErrorKind::Application,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ClientError::network("refused").kind(), ErrorKind::Network);
        assert_eq!(ClientError::decode("eof").kind(), ErrorKind::Network);
        assert_eq!(
            ClientError::application("already running").kind(),
            ErrorKind::Application
        );
        assert_eq!(ClientError::Unauthorized.kind(), ErrorKind::Application);
        assert_eq!(
            ClientError::NotFound { id: "a".into() }.kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_display_keeps_backend_message() {
        let err = ClientError::application("Script is already running");
        assert_eq!(err.to_string(), "Script is already running");
    }
}

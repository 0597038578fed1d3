#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No response was received (connection refused, DNS failure, TLS error, ...).
    #[cfg(feature = "client")]
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    /// The server answered 2xx but the body did not match the expected shape.
    #[cfg(feature = "client")]
    #[error("invalid response from {operation}: {source}")]
    InvalidResponse {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Persisted session state is incomplete or cannot be deserialized.
    #[error("corrupt session: {0}")]
    CorruptSession(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// User-facing description of an [`Error`], ready for a dismissible notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub header: &'static str,
    pub message: String,
}

impl Error {
    /// Builds the text shown to the user when a form submission fails.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            #[cfg(feature = "client")]
            Self::Network(_) => Notice {
                header: "Connection error",
                message: "Could not connect to the server. Check your internet connection and try again."
                    .into(),
            },
            Self::Api {
                status, message, ..
            } => {
                let message = if message.is_empty() {
                    "Unknown error"
                } else {
                    message.as_str()
                };
                Notice {
                    header: "API error",
                    message: format!("({status}) {message}"),
                }
            }
            Self::MalformedToken(_) | Self::CorruptSession(_) => Notice {
                header: "Session error",
                message: "Your session data is damaged. Please sign in again.".into(),
            },
            _ => Notice {
                header: "Unexpected error",
                message: self.to_string(),
            },
        }
    }

    /// HTTP status for [`Error::Api`], `None` otherwise.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

//! Error types for the generation pipeline.
//!
//! None of these errors stop a running pipeline. Generation and delivery
//! failures are logged, counted and dropped; only [`Error::InvalidConfig`] is
//! surfaced to the caller, and only when a pipeline is built.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for generators, senders and pipeline construction.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A generator failed to produce a batch.
    #[error("Generation error: {reason}")]
    Generation { reason: String },

    /// Generated content could not be serialized into a batch.
    #[error("Encoding error: {context}")]
    Encoding { context: String },

    /// The batch could not be handed to the remote endpoint (connect, timeout,
    /// client setup).
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// The remote endpoint answered with a non-success status.
    #[error("Batch rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Pipeline parameters were out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub fn generation(reason: impl Into<String>) -> Self {
        Self::Generation {
            reason: reason.into(),
        }
    }

    pub fn encoding(context: impl Into<String>) -> Self {
        Self::Encoding {
            context: context.into(),
        }
    }

    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_carries_status_and_body() {
        let err = Error::Rejected {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "Batch rejected with status 429: slow down");
    }

    #[test]
    fn constructors_wrap_context() {
        assert_eq!(
            Error::transport("connection refused"),
            Error::Transport {
                context: "connection refused".to_string()
            }
        );
        assert_eq!(
            Error::generation("empty").to_string(),
            "Generation error: empty"
        );
    }
}

use thiserror::Error;

/// Why a notification job could not be delivered.
///
/// Only [`DeliveryError::Transport`] is worth another attempt; everything
/// else is a property of the job itself and fails the same way every time.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown notification template '{0}'")]
    UnknownTemplate(String),

    #[error("could not render template: {0}")]
    Render(#[from] minijinja::Error),

    #[error("no channel registered for medium {0}")]
    UnknownMedium(&'static str),

    #[error("notification has no recipients")]
    NoRecipients,

    #[error("could not build message: {0}")]
    Build(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retried() {
        assert!(DeliveryError::Transport("timeout".into()).is_retryable());
        assert!(!DeliveryError::NoRecipients.is_retryable());
        assert!(!DeliveryError::UnknownTemplate("x".into()).is_retryable());
        assert!(!DeliveryError::Build("bad address".into()).is_retryable());
    }
}

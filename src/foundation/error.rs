pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    /// A collaborator (script source, selector, speech source) answered with a failure.
    #[error("{provider} error: {message}")]
    Upstream { provider: String, message: String },

    /// A Timeline Controller Protocol call failed or timed out.
    #[error("controller protocol error in {call}: {message}")]
    Protocol { call: String, message: String },

    #[error("capture error: {0}")]
    Capture(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    pub fn protocol(call: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Protocol {
            call: call.into(),
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }
}

impl From<serde_json::Error> for ReelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(anyhow::Error::new(err).context("json (de)serialization failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(ReelError::capture("x").to_string().contains("capture error:"));
        assert!(ReelError::audio("x").to_string().contains("audio error:"));
        assert!(ReelError::encode("x").to_string().contains("encode error:"));
        assert!(ReelError::upload("x").to_string().contains("upload error:"));
    }

    #[test]
    fn protocol_errors_name_the_failing_call() {
        let err = ReelError::protocol("rebuild", "timed out after 10s");
        assert_eq!(
            err.to_string(),
            "controller protocol error in rebuild: timed out after 10s"
        );
    }

    #[test]
    fn upstream_errors_pass_provider_message_through() {
        let err = ReelError::upstream("speech source", "401 - invalid api key");
        assert_eq!(err.to_string(), "speech source error: 401 - invalid api key");
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}

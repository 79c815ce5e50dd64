use thiserror::Error;

/// Errors arising from frame content parsing.
///
/// None of these are fatal to the decoder: each one is reported as a
/// [`ProtocolEvent::ParseError`](crate::protocol::ProtocolEvent::ParseError)
/// and the offending frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("empty message")]
    EmptyFrame,

    #[error("unknown message type: {tag}")]
    UnknownTag { tag: String },

    #[error("invalid {msg_type} message format: need {need} fields, got {got}")]
    TooFewFields {
        msg_type: &'static str,
        need: usize,
        got: usize,
    },

    #[error("invalid {field} in {msg_type} message: {value:?}")]
    InvalidNumber {
        msg_type: &'static str,
        field: &'static str,
        value: String,
    },
}

impl WireError {
    pub(crate) fn too_few_fields(msg_type: &'static str, need: usize, got: usize) -> Self {
        Self::TooFewFields { msg_type, need, got }
    }

    pub(crate) fn invalid_number(msg_type: &'static str, field: &'static str, value: &str) -> Self {
        Self::InvalidNumber {
            msg_type,
            field,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;

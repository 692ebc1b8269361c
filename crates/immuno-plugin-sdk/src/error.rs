use immuno_plugin_api::{
    IM_END_OF_SEQUENCE, IM_ERR_HOST_UNAVAILABLE, IM_ERR_INTERNAL, IM_ERR_INVALID_ARG,
    IM_VALUE_NOT_FOUND,
};
use thiserror::Error;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("host vtable is not bound")]
    HostUnavailable,
    #[error("host does not provide `{0}`")]
    Unsupported(&'static str),
    #[error("host rejected `{op}` with status {code}")]
    Host { op: &'static str, code: i32 },
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("host returned invalid utf-8: {0}")]
    Utf8(#[from] core::str::Utf8Error),
    #[error("{0}")]
    Plugin(String),
}

impl SdkError {
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        Self::InvalidArg(message.into())
    }

    /// A plugin-defined failure, reported to the host as an internal error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Plugin(message.into())
    }

    /// Status code reported across the ABI. Never zero.
    pub fn code(&self) -> i32 {
        match self {
            Self::HostUnavailable => IM_ERR_HOST_UNAVAILABLE,
            Self::Host { code, .. } if *code != 0 => *code,
            Self::InvalidArg(_) | Self::Utf8(_) => IM_ERR_INVALID_ARG,
            Self::Host { .. } | Self::Unsupported(_) | Self::Plugin(_) => IM_ERR_INTERNAL,
        }
    }

    /// The host answered "no such value" (e.g. an unknown setting name).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Host { code, .. } if *code == IM_VALUE_NOT_FOUND)
    }

    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, Self::Host { code, .. } if *code == IM_END_OF_SEQUENCE)
    }
}

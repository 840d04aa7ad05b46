use thiserror::Error;

/// Errors from the Yamaha Extended Control API.
///
/// Semantic variants map one-to-one onto the non-zero `response_code` values
/// the device returns; `Transport` and `InvalidResponse` cover the HTTP and
/// decoding layers underneath.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YxcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("device is initializing")]
    Initializing,
    #[error("internal device error")]
    InternalError,
    #[error("invalid request")]
    InvalidRequest,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("guarded (device not ready for this operation)")]
    Guarded,
    #[error("device timeout")]
    Timeout,
    #[error("firmware updating")]
    FirmwareUpdating,
    #[error("streaming service access error")]
    AccessError,
    #[error("streaming service error")]
    StreamingError,
    #[error("wrong username")]
    WrongUsername,
    #[error("wrong password")]
    WrongPassword,
    #[error("account expired")]
    AccountExpired,
    #[error("account disconnected")]
    AccountDisconnected,
    #[error("account limit reached")]
    AccountLimitReached,
    #[error("server maintenance")]
    ServerMaintenance,
    #[error("invalid account")]
    InvalidAccount,
    #[error("license error")]
    LicenseError,
    #[error("read-only mode")]
    ReadOnlyMode,
    #[error("max stations reached")]
    MaxStations,
    #[error("access denied")]
    AccessDenied,
    #[error("unknown error (response_code {0})")]
    UnknownError(i64),
}

impl YxcError {
    /// Map a non-zero `response_code` to its error kind.
    pub fn from_response_code(code: i64) -> Self {
        match code {
            1 => YxcError::Initializing,
            2 => YxcError::InternalError,
            3 => YxcError::InvalidRequest,
            4 => YxcError::InvalidParameter,
            5 => YxcError::Guarded,
            6 => YxcError::Timeout,
            99 => YxcError::FirmwareUpdating,
            100 => YxcError::AccessError,
            101 => YxcError::StreamingError,
            102 => YxcError::WrongUsername,
            103 => YxcError::WrongPassword,
            104 => YxcError::AccountExpired,
            105 => YxcError::AccountDisconnected,
            106 => YxcError::AccountLimitReached,
            107 => YxcError::ServerMaintenance,
            108 => YxcError::InvalidAccount,
            109 => YxcError::LicenseError,
            110 => YxcError::ReadOnlyMode,
            111 => YxcError::MaxStations,
            112 => YxcError::AccessDenied,
            other => YxcError::UnknownError(other),
        }
    }
}

impl From<reqwest::Error> for YxcError {
    fn from(e: reqwest::Error) -> Self {
        YxcError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, YxcError>;

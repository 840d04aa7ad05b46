use thiserror::Error;

/// Errors produced by SOAP action calls and GENA subscription requests.
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network I/O failed (connection refused, timeout, unreachable).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered but the body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// SOAP fault carrying a UPnP error code from the device.
    #[error("UPnP error {code}: {description}")]
    Upnp { code: u16, description: String },

    /// GENA SUBSCRIBE was rejected with HTTP 412.
    #[error("subscription precondition failed")]
    PreconditionFailed,
}

impl From<reqwest::Error> for SoapError {
    fn from(e: reqwest::Error) -> Self {
        SoapError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SoapError>;

use thiserror::Error;

use musiccast_soap::SoapError;
use musiccast_upnp::ParseError;
use musiccast_yxc::YxcError;

/// Errors surfaced by the control plane.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A second agent tried to claim an already-registered device id.
    #[error("device {0} is already registered")]
    AlreadyRegistered(String),

    /// The device id is not present in the registry.
    #[error("device {0} is not registered")]
    NotFound(String),

    /// An invalid lookup key or command argument.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The target agent has terminated.
    #[error("device agent is no longer running")]
    AgentGone,

    /// The device's description exposes no AVTransport service.
    #[error("device has no AVTransport service")]
    NoTransport,

    /// Network I/O against a device failed outside the protocol clients.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Yxc(#[from] YxcError),

    #[error(transparent)]
    Soap(#[from] SoapError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;

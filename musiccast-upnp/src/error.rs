use thiserror::Error;

/// Errors raised while decoding UPnP XML documents.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML deserialization failed: {0}")]
    XmlDeserializationFailed(String),

    #[error("missing element: {0}")]
    MissingElement(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors raised when invoking a service action through a runtime table.
#[derive(Debug, Error)]
pub enum ServiceCallError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action {action} is missing argument {argument}")]
    MissingArgument { action: String, argument: String },

    #[error(transparent)]
    Soap(#[from] musiccast_soap::SoapError),
}

//! UPnP A/V service runtime.
//!
//! Building blocks for driving MediaRenderer devices: root-description and
//! SCPD parsing, a runtime action table, a typed AVTransport client, the
//! DIDL-Lite metadata codec, and GENA event payload decoding. SOAP and GENA
//! transport live in `musiccast-soap`; this crate supplies the formats and
//! service specifics on top.

mod avtransport;
mod description;
mod didl;
mod error;
mod event;
mod scpd;
mod xml;

pub use avtransport::{AvTransport, Metadata, AVTRANSPORT_SERVICE_TYPE};
pub use description::{
    DeviceDescription, Icon, RootDescription, ServiceEntry, AVTRANSPORT_SERVICE_ID,
};
pub use didl::{decode_duration, encode_duration, protocol_info, TrackMetadata};
pub use error::{ParseError, ParseResult, ServiceCallError};
pub use event::{
    camel_to_snake, decode as decode_event, decode_with_table as decode_event_with_table,
    AvTransportEvent, ChannelStatus, DecodedDidl, EventValue, StateVarTable,
};
pub use scpd::{Action, ActionArgument, DataType, Direction, Scpd, ServiceHandle, StateVariable};

/// DIDL-Lite codec functions, re-exported as a module for callers that work
/// with raw documents.
pub mod didl_lite {
    pub use crate::didl::{decode, encode};
}

//! Firth Relay Transport
//!
//! The pub/sub boundary between the engine and its network sources. The
//! engine speaks in terms of:
//!
//! - [`ClientRequest`] — open a filtered subscription or close one
//! - [`RelayMessage`] — the typed stream coming back: events tagged with the
//!   subscription that produced them, an end-of-stored marker per
//!   subscription, and connectivity changes
//!
//! Wire framing, relay selection and reconnect policy all live behind the
//! [`Transport`] trait; the engine never sees them. Messages are strongly
//! typed end to end — there is no untyped notification bus to cast out of.
//!
//! [`RecordingTransport`] is a test double that records every request and
//! lets a test script connectivity.

mod filter;
mod message;
mod recording;
mod transport;

pub use filter::{Filter, MAX_FILTER_AUTHORS};
pub use message::{subid, ClientRequest, RelayMessage, SubscriptionId};
pub use recording::RecordingTransport;
pub use transport::{Transport, TransportError};

//! Push channel: server-sent status events for one job.
//!
//! # Architecture
//!
//! ```text
//! PushTransport ──bytes──► SseDecoder ──frames──► decode_status_event
//!                                                        │
//!                     PushConnector ◄──── snapshots ─────┘
//!                           │
//!                           ▼
//!                   mpsc<PushNotice> ──► tracker
//! ```
//!
//! The connector reconnects with exponential backoff, resuming from the last
//! event id, until a terminal snapshot arrives or the consecutive failure
//! limit is reached.

mod connector;
mod error;
mod event;
mod sse;
mod transport;

pub use connector::{ChannelState, PushConnector, PushNotice, ReconnectPolicy};
pub use error::PushError;
pub use event::decode_status_event;
pub use sse::{SseDecoder, SseFrame};
pub use transport::{ByteStream, HttpPushTransport, PushTransport};

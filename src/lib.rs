//! # sensorlink
//! Pushes real-time sensor events from a constrained device to a connected
//! client over a persistent, full-duplex WebSocket subset (RFC 6455 server
//! framing), implemented directly on top of a plain byte stream.
//!
//! The crate covers the protocol core end to end:
//!
//! - [`handshake`]: the one-shot HTTP-style upgrade negotiation,
//! - [`codec`]: binary frame encoding and decoding with variable-length
//!   fields and payload masking,
//! - [`Connection`]: the `OPEN → CLOSING → CLOSED` state machine with
//!   automatic ping/pong handling and an idempotent, fire-and-forget close,
//! - [`producer`]: long-lived polling tasks that multiplex events onto one
//!   shared connection,
//! - [`Listener`]: the accept loop that ties the pieces together.
//!
//! ## Sharing one connection across tasks
//! [`Connection`] is `Clone` and may be driven by any number of concurrent
//! producer tasks without an external lock. A `send` call encodes the whole
//! frame into a private buffer first and only then writes it to the
//! transport in a single guarded operation, so frames from concurrent
//! senders can be reordered relative to each other but never interleaved
//! byte-wise. See [`Connection::send`] for the exact contract.
//!
//! ## Protocol limitations
//! These are deliberate, matching the device-side scope:
//!
//! - no message fragmentation (every outgoing frame is final, incoming
//!   fragments are rejected),
//! - no compression, extension or subprotocol negotiation,
//! - the handshake locates `Sec-WebSocket-Key` and nothing else; the
//!   `Upgrade`/`Connection`/`Sec-WebSocket-Version` headers are not
//!   validated.
//!
//! ## Server example
//! ```no_run
//! use sensorlink::{Listener, ListenerConfig, Message, Options};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sensorlink::Result<()> {
//!     let listener = Listener::bind(&ListenerConfig {
//!         addr: "0.0.0.0".into(),
//!         port: 8080,
//!         options: Options::default(),
//!     })
//!     .await?;
//!
//!     listener
//!         .serve(|conn| async move {
//!             let _ = conn.send(Message::text("hello")).await;
//!         })
//!         .await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod close;
pub mod codec;
mod connection;
pub mod frame;
pub mod handshake;
mod listener;
mod mask;
mod options;
pub mod producer;

use thiserror::Error;

pub use close::CloseCode;
pub use connection::{Connection, Message, Recv, Role, State};
pub use frame::{Frame, OpCode};
pub use listener::{Listener, ListenerConfig};
pub use options::Options;
pub use producer::{EventSource, ProducerConfig};

/// A result type for protocol operations, using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating, framing or driving a connection.
///
/// The variants map onto the failure domains of the protocol:
///
/// - handshake failures (`MissingSecWebSocketKey`) reject the upgrade and
///   never produce a connection,
/// - framing violations (`InvalidOpCode`, `FragmentationUnsupported`,
///   `IncompleteFrame`, `InvalidUtf8`) are terminal for the owning
///   connection only,
/// - `FrameTooLarge` is answered with close code 1009 before the
///   connection shuts down,
/// - `ConnectionClosed` flags use of `send`/`recv` after the state machine
///   left `OPEN`,
/// - `Io` wraps transport-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// The opening request carried no `Sec-WebSocket-Key` header, so no
    /// accept value can be computed and the upgrade is rejected.
    #[error("Sec-WebSocket-Key header is missing")]
    MissingSecWebSocketKey,

    /// A frame header carried an opcode nibble outside the set defined by
    /// RFC 6455.
    #[error("invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// A frame declared a payload length above the configured maximum.
    /// Raised before any payload is buffered, so an oversized declaration
    /// never costs an oversized allocation.
    #[error("declared frame length {len} exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// A fragmented frame (continuation opcode or an unset FIN bit) was
    /// received. Fragmentation is outside this protocol subset.
    #[error("fragmented frames are not supported")]
    FragmentationUnsupported,

    /// A text frame payload was not valid UTF-8.
    #[error("invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// `send` or `recv` was called after the connection left the `OPEN`
    /// state, or the peer went away mid-operation.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The stream ended after a frame header was partially consumed. The
    /// byte stream is no longer frame-aligned, which is terminal; this is
    /// distinct from the no-data case, where the decoder simply waits.
    #[error("stream ended in the middle of a frame")]
    IncompleteFrame,

    /// Transport-level I/O failure outside a partial frame.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Event payload serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

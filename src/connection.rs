//! The connection state machine over an upgraded byte stream.
//!
//! A [`Connection`] owns both ends of the transport and exposes
//! `send`/`recv`/`close` with the lifecycle `OPEN → CLOSING → CLOSED`,
//! one-directional and non-resumable. It is created only after a
//! successful handshake and is `Clone`: every producer task holds the same
//! logical connection through a shared inner state.
//!
//! # Frame atomicity
//! Concurrent `send` calls need no external lock. A `send` encodes the
//! complete frame (header, optional mask key, payload) into a private
//! buffer without suspending, then writes it with a single `write_all`
//! plus flush while holding the internal writer mutex. Whole frames may be
//! reordered between concurrent senders, and one task's sends keep their
//! order, but the bytes of two frames never interleave.
//!
//! The read side is likewise mutex-guarded but meant for a single logical
//! consumer: assembling one frame takes several reads, so a second
//! concurrent reader would only ever wait, never observe a half frame.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use bytes::{Bytes, BytesMut};
use futures::future::poll_immediate;
use serde::Serialize;
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tokio_util::codec::{Decoder as _, Encoder as _};

use crate::{
    close::CloseCode,
    codec::{Decoder, Encoder},
    frame::{Frame, MAX_HEAD_SIZE},
    Error, OpCode, Options, Result,
};

/// The role a connection takes on the wire.
///
/// The initiator ([`Role::Client`]) masks every frame it sends; the
/// responder ([`Role::Server`]) never does. This crate's listener always
/// produces server-role connections, but the codec and connection work for
/// either end.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Connection lifecycle state. Transitions only move forward:
/// `Open → Closing → Closed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// `send` and `recv` are permitted.
    Open = 0,
    /// A close was initiated; the close frame write and transport
    /// teardown may still be in flight.
    Closing = 1,
    /// The transport is released. Terminal.
    Closed = 2,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// An application payload, tagged by kind.
///
/// `send` accepts nothing else: the payload's semantic kind picks the
/// opcode (text or binary), explicitly rather than by runtime inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::Binary(payload.into())
    }

    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::text(text.as_str()),
            Self::Binary(payload) => Frame::binary(&payload[..]),
        }
    }
}

/// Outcome of a receive call.
#[derive(Debug)]
pub enum Recv {
    /// A complete application payload.
    Message(Message),
    /// No complete frame is available right now. Only [`Connection::try_recv`]
    /// returns this; [`Connection::recv`] waits instead.
    Pending,
    /// End of stream: the peer closed, the transport ended on a frame
    /// boundary, or an oversized frame was answered with close code 1009.
    Closed,
}

struct Reader<T> {
    io: io::ReadHalf<T>,
    buf: BytesMut,
    decoder: Decoder,
}

struct Shared<T> {
    role: Role,
    state: AtomicU8,
    reader: Mutex<Reader<T>>,
    writer: Mutex<io::WriteHalf<T>>,
}

/// A framed, full-duplex connection produced by a successful handshake.
///
/// Cheap to clone; all clones drive the same transport and state machine.
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wraps an upgraded transport in a connection with the given role.
    pub fn new(role: Role, io: T, options: &Options) -> Self {
        let (read, write) = io::split(io);
        Self {
            shared: Arc::new(Shared {
                role,
                state: AtomicU8::new(State::Open as u8),
                reader: Mutex::new(Reader {
                    io: read,
                    buf: BytesMut::with_capacity(4096),
                    decoder: Decoder::new(options.max_frame_size),
                }),
                writer: Mutex::new(write),
            }),
        }
    }

    /// Wraps an upgraded transport in a responder-role connection, the
    /// shape the listener hands to producer tasks.
    pub fn server(io: T, options: &Options) -> Self {
        Self::new(Role::Server, io, options)
    }

    /// Current lifecycle state. `close` flips the state synchronously but
    /// finishes the wire write and teardown in the background, so observers
    /// poll this for the terminal [`State::Closed`].
    pub fn state(&self) -> State {
        State::from(self.shared.state.load(Ordering::Acquire))
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            State::Open => Ok(()),
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Sends one application message as a single final frame.
    ///
    /// Fails with [`Error::ConnectionClosed`] unless the connection is
    /// `OPEN`. Safe to call from any number of tasks concurrently; see the
    /// module docs for the atomicity contract.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.ensure_open()?;
        self.shared.write_frame(message.into_frame()).await
    }

    /// Serializes `event` to JSON and sends it as a text frame.
    pub async fn send_json<E: Serialize>(&self, event: &E) -> Result<()> {
        self.ensure_open()?;
        let payload = serde_json::to_string(event)?;
        self.shared.write_frame(Frame::text(payload.as_str())).await
    }

    /// Receives the next application payload, waiting for it.
    ///
    /// Control frames are consumed internally: a ping is answered with a
    /// pong carrying the identical payload, a pong is discarded, a close
    /// transitions the state machine and yields [`Recv::Closed`]. A
    /// fragmented frame, a reserved opcode or a stream that ends mid-frame
    /// is terminal and surfaces as an error.
    pub async fn recv(&self) -> Result<Recv> {
        self.ensure_open()?;
        self.recv_inner(true).await
    }

    /// Like [`Connection::recv`], but never waits for the transport:
    /// returns [`Recv::Pending`] when no complete frame is buffered.
    pub async fn try_recv(&self) -> Result<Recv> {
        self.ensure_open()?;
        self.recv_inner(false).await
    }

    async fn recv_inner(&self, wait: bool) -> Result<Recv> {
        let mut reader = self.shared.reader.lock().await;
        loop {
            let r = &mut *reader;
            match r.decoder.decode(&mut r.buf) {
                Ok(Some(frame)) => match self.on_frame(frame).await {
                    Ok(Some(outcome)) => return Ok(outcome),
                    Ok(None) => continue,
                    Err(err) => {
                        self.shared.advance_state(State::Closed);
                        return Err(err);
                    }
                },
                Ok(None) => {
                    let read = if wait {
                        Some(r.io.read_buf(&mut r.buf).await)
                    } else {
                        poll_immediate(r.io.read_buf(&mut r.buf)).await
                    };
                    match read {
                        None => return Ok(Recv::Pending),
                        Some(Ok(0)) => return self.on_eof(r),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            self.shared.advance_state(State::Closed);
                            return Err(err.into());
                        }
                    }
                }
                Err(Error::FrameTooLarge { len, max }) => {
                    log::debug!("peer declared a {len} byte frame (limit {max}), closing");
                    self.shared
                        .finish_close(Some(Frame::close(CloseCode::Size, "")))
                        .await;
                    return Ok(Recv::Closed);
                }
                Err(err) => {
                    self.shared.advance_state(State::Closed);
                    return Err(err);
                }
            }
        }
    }

    /// Dispatches one decoded frame. `Ok(None)` means the frame was
    /// handled internally and the read loop continues.
    async fn on_frame(&self, frame: Frame) -> Result<Option<Recv>> {
        if !frame.fin || frame.opcode == OpCode::Continuation {
            return Err(Error::FragmentationUnsupported);
        }

        match frame.opcode {
            OpCode::Text => {
                let text =
                    String::from_utf8(frame.payload.to_vec()).map_err(|_| Error::InvalidUtf8)?;
                Ok(Some(Recv::Message(Message::Text(text))))
            }
            OpCode::Binary => Ok(Some(Recv::Message(Message::Binary(frame.payload.freeze())))),
            OpCode::Ping => {
                log::debug!("ping received, answering pong");
                self.shared.write_frame(Frame::pong(frame.payload)).await?;
                Ok(None)
            }
            OpCode::Pong => Ok(None),
            OpCode::Close => {
                log::debug!(
                    "peer closed the connection (code {:?})",
                    frame.close_code()
                );
                self.shared.finish_close(None).await;
                Ok(Some(Recv::Closed))
            }
            OpCode::Continuation => unreachable!("rejected above"),
        }
    }

    /// End of stream: clean on a frame boundary, terminal mid-frame.
    fn on_eof(&self, r: &mut Reader<T>) -> Result<Recv> {
        self.shared.advance_state(State::Closed);
        if r.decoder.is_idle() && r.buf.is_empty() {
            Ok(Recv::Closed)
        } else {
            Err(Error::IncompleteFrame)
        }
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Closes the connection.
    ///
    /// Idempotent: only the first call on an `OPEN` connection does
    /// anything, later calls (and calls racing it) are no-ops. The state
    /// flips to `CLOSING` synchronously; the close frame write and the
    /// transport teardown run on a background task, after which the state
    /// reaches `CLOSED`.
    pub fn close(&self, code: CloseCode, reason: &str) {
        let exchanged = self.shared.state.compare_exchange(
            State::Open as u8,
            State::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if exchanged.is_err() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let frame = Frame::close(code, reason);
        tokio::spawn(async move {
            shared.finish_close(Some(frame)).await;
        });
    }
}

impl<T> Shared<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Moves the state forward, never backward.
    fn advance_state(&self, state: State) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Encodes and transmits one frame as an uninterruptible unit.
    async fn write_frame(&self, frame: Frame) -> Result<()> {
        // Full frame into a private buffer before the transport is
        // touched; the writer lock is held across exactly one write and
        // one flush.
        let mut buf = BytesMut::with_capacity(MAX_HEAD_SIZE + frame.payload.len());
        Encoder::new(self.role).encode(frame, &mut buf)?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Best-effort close path: optional close frame, transport shutdown,
    /// terminal state.
    async fn finish_close(&self, frame: Option<Frame>) {
        self.advance_state(State::Closing);

        if let Some(frame) = frame {
            if let Err(err) = self.write_frame(frame).await {
                log::debug!("close frame write failed: {err}");
            }
        }

        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            log::debug!("transport shutdown failed: {err}");
        }
        drop(writer);

        self.advance_state(State::Closed);
        log::debug!("connection closed");
    }
}

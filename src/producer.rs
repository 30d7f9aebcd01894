//! Producer tasks: long-lived polling loops that push sensor events onto
//! a shared [`Connection`].
//!
//! A producer owns no connection state. On every tick it polls its
//! [`EventSource`]; when the source reports a qualifying transition the
//! event is serialized and sent as a JSON text frame. Failures of any kind
//! (a misbehaving sensor, a closed connection) are absorbed locally:
//! logged, followed by a cooldown sleep, and polling resumes. A producer
//! never tears down the connection and never takes a sibling producer
//! down with it.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Connection, Result};

/// A polled origin of domain events.
///
/// `poll` performs one sampling tick and returns `Ok(Some(event))` only on
/// a qualifying transition; steady-state readings yield `Ok(None)`. Edge
/// detection (thresholds, target latches) belongs to the source, cadence
/// and resilience to the runner.
pub trait EventSource {
    type Event: Serialize;

    fn poll(&mut self) -> impl std::future::Future<Output = Result<Option<Self::Event>>> + Send;
}

/// Cadence and backoff for one producer loop.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Pause between sampling ticks.
    pub poll_interval: Duration,
    /// Pause after a failed tick or a failed send before polling resumes.
    pub cooldown: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            cooldown: Duration::from_secs(1),
        }
    }
}

/// Timestamp fields attached to outgoing events, in the gateway's
/// `dd/mm/yyyy` and `HH:MM:SS` convention.
#[derive(Debug, Clone, Serialize)]
pub struct Timestamp {
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "hora")]
    pub time: String,
}

impl Timestamp {
    /// Captures the local wall-clock time.
    pub fn now() -> Self {
        let now = chrono::Local::now();
        Self {
            date: now.format("%d/%m/%Y").to_string(),
            time: now.format("%H:%M:%S").to_string(),
        }
    }
}

/// Drives one producer loop forever.
///
/// The loop never returns by design; it stops only when the task running
/// it is dropped. Send failures, including [`crate::Error::ConnectionClosed`]
/// after the peer goes away, are non-fatal to the producer itself.
pub async fn run<T, S>(conn: Connection<T>, mut source: S, config: ProducerConfig, name: &str)
where
    T: AsyncRead + AsyncWrite,
    S: EventSource,
{
    loop {
        match source.poll().await {
            Ok(Some(event)) => {
                if let Err(err) = conn.send_json(&event).await {
                    log::warn!("producer {name}: send failed: {err}");
                    tokio::time::sleep(config.cooldown).await;
                    continue;
                }
                log::debug!("producer {name}: event sent");
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("producer {name}: poll failed: {err}");
                tokio::time::sleep(config.cooldown).await;
                continue;
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Decoder, frame::Frame, CloseCode, Error, OpCode, Options};
    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio_util::codec::Decoder as _;

    #[derive(Serialize)]
    struct CountEvent {
        count: u32,
    }

    /// Fails on the first tick, produces on the second, then idles.
    struct FlakySource {
        tick: u32,
    }

    impl EventSource for FlakySource {
        type Event = CountEvent;

        async fn poll(&mut self) -> Result<Option<CountEvent>> {
            self.tick += 1;
            match self.tick {
                1 => Err(Error::ConnectionClosed),
                2 => Ok(Some(CountEvent { count: 1 })),
                _ => Ok(None),
            }
        }
    }

    fn fast_config() -> ProducerConfig {
        ProducerConfig {
            poll_interval: std::time::Duration::from_millis(1),
            cooldown: std::time::Duration::from_millis(1),
        }
    }

    async fn read_frame(io: &mut DuplexStream) -> Frame {
        let mut decoder = Decoder::new(usize::MAX);
        let mut buf = BytesMut::new();
        loop {
            if let Some(frame) = decoder.decode(&mut buf).unwrap() {
                return frame;
            }
            assert_ne!(io.read_buf(&mut buf).await.unwrap(), 0, "unexpected eof");
        }
    }

    #[tokio::test]
    async fn test_producer_survives_source_failure() {
        let (server_io, mut client) = tokio::io::duplex(4096);
        let conn = Connection::server(server_io, &Options::default());

        let task = tokio::spawn(run(conn, FlakySource { tick: 0 }, fast_config(), "flaky"));

        // The first tick fails, yet the event from the second tick still
        // arrives.
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), read_frame(&mut client))
            .await
            .expect("event after source failure");
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(&frame.payload[..], br#"{"count":1}"#);

        task.abort();
    }

    /// Emits one event per tick, unconditionally.
    struct SteadySource;

    impl EventSource for SteadySource {
        type Event = CountEvent;

        async fn poll(&mut self) -> Result<Option<CountEvent>> {
            Ok(Some(CountEvent { count: 7 }))
        }
    }

    #[tokio::test]
    async fn test_producer_survives_closed_connection() {
        let (server_io, _client) = tokio::io::duplex(4096);
        let conn = Connection::server(server_io, &Options::default());

        conn.close(CloseCode::Normal, "");
        let task = tokio::spawn(run(conn, SteadySource, fast_config(), "steady"));

        // Every send fails with ConnectionClosed; the producer keeps
        // polling instead of panicking or ending.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        task.abort();
    }
}

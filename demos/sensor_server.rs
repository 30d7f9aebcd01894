//! Sensor gateway demo: pushes simulated part-counter and rotary-encoder
//! events to whoever connects.
//!
//! Run it, then point any WebSocket client at `ws://127.0.0.1:8080` and
//! watch the JSON events arrive:
//!
//! ```sh
//! cargo run --example sensor_server
//! ```
//!
//! The two producers mirror a small factory-floor setup: a distance
//! sensor counting parts passing under it (by size class) and a rotary
//! encoder reporting every time the shaft reaches its target position.
//! Both run concurrently against one shared connection.

use std::collections::VecDeque;

use rand::Rng;
use serde::Serialize;

use sensorlink::{
    producer::{self, EventSource, ProducerConfig, Timestamp},
    Listener, ListenerConfig, Options, Result,
};

/// Distance below which a passing part is registered, in centimeters.
const DISTANCE_LIMIT_CM: f64 = 10.0;
/// Encoder position that counts as a hit.
const TARGET_POSITION: i32 = 10;

const PART_KINDS: [&str; 3] = ["Grande", "Media", "Pequena"];

#[derive(Serialize)]
struct PartEvent {
    #[serde(rename = "quantidade")]
    count: u32,
    #[serde(rename = "tipo")]
    kind: &'static str,
    #[serde(flatten)]
    stamp: Timestamp,
}

/// Simulated distance-ranging sensor with per-kind part counters.
///
/// A reading at or below the limit on a rising edge registers one pass;
/// the sensor then re-arms once the distance clears the limit again. Each
/// pass queues one event per part kind, drained one per tick so every
/// counter update reaches the client.
struct PartCounter {
    counters: [u32; 3],
    below: bool,
    queued: VecDeque<PartEvent>,
}

impl PartCounter {
    fn new() -> Self {
        Self {
            counters: [0; 3],
            below: false,
            queued: VecDeque::new(),
        }
    }

    fn measure(&mut self) -> f64 {
        rand::thread_rng().gen_range(2.0..30.0)
    }
}

impl EventSource for PartCounter {
    type Event = PartEvent;

    async fn poll(&mut self) -> Result<Option<PartEvent>> {
        if let Some(event) = self.queued.pop_front() {
            return Ok(Some(event));
        }

        let distance = self.measure();
        if distance <= DISTANCE_LIMIT_CM {
            if !self.below {
                self.below = true;
                for (index, counter) in self.counters.iter_mut().enumerate() {
                    *counter += index as u32 + 1;
                    self.queued.push_back(PartEvent {
                        count: *counter,
                        kind: PART_KINDS[index],
                        stamp: Timestamp::now(),
                    });
                }
            }
        } else {
            self.below = false;
        }

        Ok(self.queued.pop_front())
    }
}

#[derive(Serialize)]
struct TargetHit {
    #[serde(rename = "contagem")]
    count: u32,
    #[serde(flatten)]
    stamp: Timestamp,
}

/// Simulated rotary encoder latching on a target position.
struct TargetEncoder {
    position: i32,
    count: u32,
    latched: bool,
}

impl TargetEncoder {
    fn new() -> Self {
        Self {
            position: 0,
            count: 0,
            latched: false,
        }
    }

    fn step(&mut self) {
        if rand::thread_rng().gen_bool(0.5) {
            self.position += 1;
        } else {
            self.position -= 1;
        }
    }
}

impl EventSource for TargetEncoder {
    type Event = TargetHit;

    async fn poll(&mut self) -> Result<Option<TargetHit>> {
        self.step();

        if self.position == TARGET_POSITION {
            if !self.latched {
                self.latched = true;
                self.count += 1;
                return Ok(Some(TargetHit {
                    count: self.count,
                    stamp: Timestamp::now(),
                }));
            }
        } else {
            self.latched = false;
        }

        Ok(None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()?;

    let listener = Listener::bind(&ListenerConfig {
        addr: "0.0.0.0".into(),
        port: 8080,
        options: Options::default(),
    })
    .await?;

    listener
        .serve(|conn| async move {
            let parts = producer::run(
                conn.clone(),
                PartCounter::new(),
                ProducerConfig::default(),
                "parts",
            );
            let encoder = producer::run(
                conn,
                TargetEncoder::new(),
                ProducerConfig {
                    poll_interval: std::time::Duration::from_millis(10),
                    ..ProducerConfig::default()
                },
                "encoder",
            );

            // Both producers share the connection without a lock; they end
            // only when the serving task is dropped.
            futures::future::join(parts, encoder).await;
        })
        .await?;

    Ok(())
}

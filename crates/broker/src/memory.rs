//! In-process broker channel backed by per-lane `tokio::sync::mpsc` queues.
//!
//! Each lane owns an unbounded channel; consumers serialize on a per-lane
//! receiver mutex so one message is handed to exactly one consumer.
//! Unsettled deliveries are tracked in an in-flight table so a nack can
//! requeue the envelope with an incremented redelivery count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pixelift_core::envelope::JobEnvelope;
use pixelift_core::lane::Lane;
use tokio::sync::{mpsc, Mutex};

use crate::channel::{BrokerChannel, BrokerError, Delivery, DeliveryTag};

/// A queued message and its redelivery count.
#[derive(Debug, Clone)]
struct Message {
    envelope: JobEnvelope,
    redeliveries: u32,
}

struct LaneQueue {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
}

/// In-memory, lane-isolated broker channel.
///
/// Shared via `Arc<InMemoryBroker>` between the gateway (push side) and
/// the worker pool (pop/ack/nack side).
pub struct InMemoryBroker {
    lanes: HashMap<Lane, LaneQueue>,
    in_flight: Mutex<HashMap<DeliveryTag, Message>>,
    next_tag: AtomicU64,
    nack_delay: Duration,
}

impl InMemoryBroker {
    /// Broker with immediate redelivery on nack.
    pub fn new() -> Self {
        Self::with_nack_delay(Duration::ZERO)
    }

    /// Broker that waits `nack_delay` before requeueing a nacked message.
    pub fn with_nack_delay(nack_delay: Duration) -> Self {
        let lanes = Lane::all()
            .into_iter()
            .map(|lane| {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    lane,
                    LaneQueue {
                        tx,
                        rx: Mutex::new(rx),
                    },
                )
            })
            .collect();

        Self {
            lanes,
            in_flight: Mutex::new(HashMap::new()),
            next_tag: AtomicU64::new(1),
            nack_delay,
        }
    }

    fn lane(&self, lane: Lane) -> &LaneQueue {
        // Every Lane variant is inserted in the constructor.
        &self.lanes[&lane]
    }

    /// Number of deliveries popped but not yet acked or nacked.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn push(&self, envelope: JobEnvelope) -> Result<(), BrokerError> {
        let queue = self.lane(envelope.lane);
        queue
            .tx
            .send(Message {
                envelope,
                redeliveries: 0,
            })
            .map_err(|_| BrokerError::Closed)
    }

    async fn pop(&self, lane: Lane) -> Result<Delivery, BrokerError> {
        let message = {
            let mut rx = self.lane(lane).rx.lock().await;
            rx.recv().await.ok_or(BrokerError::Closed)?
        };

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery {
            envelope: message.envelope.clone(),
            redeliveries: message.redeliveries,
            tag,
        };
        self.in_flight.lock().await.insert(tag, message);
        Ok(delivery)
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.in_flight
            .lock()
            .await
            .remove(&tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownTag(tag))
    }

    async fn nack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let mut message = self
            .in_flight
            .lock()
            .await
            .remove(&tag)
            .ok_or(BrokerError::UnknownTag(tag))?;

        message.redeliveries += 1;
        let tx = self.lane(message.envelope.lane).tx.clone();

        if self.nack_delay.is_zero() {
            tx.send(message).map_err(|_| BrokerError::Closed)?;
        } else {
            let delay = self.nack_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if tx.send(message).is_err() {
                    tracing::warn!("Lane queue closed before delayed redelivery");
                }
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

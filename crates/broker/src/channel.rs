//! The narrow interface the orchestration layer depends on.

use async_trait::async_trait;
use pixelift_core::envelope::JobEnvelope;
use pixelift_core::lane::Lane;

/// Opaque handle identifying one in-flight delivery for ack/nack.
pub type DeliveryTag = u64;

/// One message handed to a consumer by [`BrokerChannel::pop`].
///
/// Delivery is at-least-once: the same envelope may be seen again after a
/// nack (with `redeliveries` incremented) or, in degenerate cases, as a
/// duplicate. Consumers must tolerate both.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: JobEnvelope,
    /// How many times this envelope has been redelivered after a nack.
    /// `0` on first delivery.
    pub redeliveries: u32,
    /// Pass back to `ack` or `nack` to settle the delivery.
    pub tag: DeliveryTag,
}

/// Errors from the broker transport.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The channel is shut down; no further push or pop will succeed.
    #[error("Broker channel closed")]
    Closed,

    /// The tag does not name an in-flight delivery (double settle, or a
    /// settle after shutdown).
    #[error("Unknown delivery tag: {0}")]
    UnknownTag(DeliveryTag),
}

/// Durable-enough, at-least-once FIFO transport with named lanes.
///
/// Lanes are fully isolated: a push to one lane is only ever observable
/// by pops on the same lane.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Enqueue an envelope onto its lane.
    async fn push(&self, envelope: JobEnvelope) -> Result<(), BrokerError>;

    /// Claim the next envelope on `lane`, waiting until one is available.
    ///
    /// This is the worker loop's sole suspension point.
    async fn pop(&self, lane: Lane) -> Result<Delivery, BrokerError>;

    /// Settle a delivery as consumed; it will not be redelivered.
    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Return a delivery to its lane for redelivery with an incremented
    /// redelivery count.
    async fn nack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;
}

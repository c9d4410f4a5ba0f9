//! Broker channel boundary: named-lane FIFO delivery with ack/nack.
//!
//! The orchestration core talks to its message transport only through the
//! [`BrokerChannel`] trait. The in-memory implementation in [`memory`] is
//! the default wiring; losing its backing store on process restart is an
//! accepted failure mode.

pub mod channel;
pub mod memory;

pub use channel::{BrokerChannel, BrokerError, Delivery, DeliveryTag};
pub use memory::InMemoryBroker;

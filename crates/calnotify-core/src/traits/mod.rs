//! Seams between the store, the queue, and the loops that use them.

pub mod queue;
pub mod store;

pub use queue::{Acknowledger, Delivery, DeliveryStream, MessageQueue};
pub use store::EventStore;

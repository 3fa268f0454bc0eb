//! # calnotify queue
//! Message queue backends. Addresses are URLs; the scheme picks the backend.

pub mod local;

pub use local::{LocalBroker, LocalQueue};

use calnotify_core::config::QueueConfig;
use calnotify_core::error::{CalNotifyError, Result};
use calnotify_core::traits::MessageQueue;

/// Create a message queue from configuration.
pub fn create_queue(config: &QueueConfig) -> Result<Box<dyn MessageQueue>> {
    match scheme(&config.address) {
        "local" => Ok(Box::new(LocalQueue::new(&config.address, config.name.clone()))),
        other => Err(CalNotifyError::Config(
            format!("Unsupported queue address scheme '{other}' in {}", config.address)
        )),
    }
}

/// Reject addresses whose broker cannot be reached from another process.
///
/// `local://` brokers live inside one process, so a scheduler and a sender
/// started as separate processes would never see each other's messages.
pub fn require_shared_broker(config: &QueueConfig) -> Result<()> {
    if scheme(&config.address) == "local" {
        return Err(CalNotifyError::Config(format!(
            "Queue address {} is in-process only; use `calnotify run` to host the scheduler and sender together",
            config.address
        )));
    }
    Ok(())
}

fn scheme(address: &str) -> &str {
    address.split_once("://").map(|(s, _)| s).unwrap_or("")
}

//! Per-interface outbound workers.
//!
//! The actor never awaits an adapter: it queues an [`OutboundCall`] and the
//! interface's own worker task delivers it. Failures are logged, never
//! retried.

use tokio::sync::mpsc;

use rulehub_domain::command::Command;
use rulehub_domain::device::Address;
use rulehub_domain::error::{HubError, ValidationError};

use crate::ports::Interface;

/// One command to deliver to one address.
#[derive(Debug, Clone)]
pub(crate) struct OutboundCall {
    pub device: String,
    pub address: Address,
    pub command: Command,
}

/// Spawn the worker for `interface` and return the sender feeding it.
///
/// The worker exits once every sender is dropped.
pub(crate) fn spawn_worker<I>(interface: I, capacity: usize) -> mpsc::Sender<OutboundCall>
where
    I: Interface + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity);
    tokio::spawn(run(interface, receiver));
    sender
}

async fn run<I: Interface>(interface: I, mut receiver: mpsc::Receiver<OutboundCall>) {
    while let Some(call) = receiver.recv().await {
        match interface.send(&call.address, call.command).await {
            Ok(()) => tracing::debug!(
                interface = interface.name(),
                device = %call.device,
                address = %call.address,
                command = %call.command,
                "command delivered"
            ),
            Err(HubError::Validation(ValidationError::UnsupportedCommand { .. })) => {
                tracing::debug!(
                    interface = interface.name(),
                    device = %call.device,
                    command = %call.command,
                    "interface has no primitive for command"
                );
            }
            Err(error) => tracing::warn!(
                interface = interface.name(),
                device = %call.device,
                address = %call.address,
                command = %call.command,
                %error,
                "failed to deliver command"
            ),
        }
    }
    tracing::debug!(interface = interface.name(), "outbound worker stopped");
}

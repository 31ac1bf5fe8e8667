//! Interface port: delivery of resolved commands to hardware.
//!
//! An interface bridges an external protocol (UPB, Insteon, X10, a virtual
//! test double, …) into the hub. Outbound, the hub calls the primitives
//! below for every device binding on the interface. Inbound, the adapter
//! reports what it hears through [`Hub::inbound`](crate::hub::Hub::inbound).

use std::future::Future;

use rulehub_domain::command::Command;
use rulehub_domain::device::Address;
use rulehub_domain::error::{HubError, ValidationError};

/// A pluggable hardware interface.
///
/// Implementations live in adapter crates (e.g. `adapter_virtual`). Each
/// attached interface gets its own worker task, so a slow adapter never
/// stalls the hub.
pub trait Interface: Send + Sync {
    /// Unique name identifying this interface (e.g. `"upb"`).
    fn name(&self) -> &str;

    /// Switch the device at `address` on.
    fn on(&self, address: &Address) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Switch the device at `address` off.
    fn off(&self, address: &Address) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Set the device at `address` to `level`.
    fn level(
        &self,
        address: &Address,
        level: u8,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Dispatch a resolved command to the matching primitive.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedCommand`] for commands without
    /// a primitive, or whatever the primitive returns.
    fn send(
        &self,
        address: &Address,
        command: Command,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        async move {
            match command {
                Command::On => self.on(address).await,
                Command::Off => self.off(address).await,
                Command::Level(level) => self.level(address, level).await,
                other => Err(ValidationError::UnsupportedCommand {
                    interface: self.name().to_string(),
                    command: other.to_string(),
                }
                .into()),
            }
        }
    }
}

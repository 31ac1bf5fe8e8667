//! # rulehub-app
//!
//! Application layer: the hub actor and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Interface`: deliver `on` / `off` / `level` to a hardware address
//!   - `EventPublisher`: publish state-change events
//! - Run the **hub**: a single actor task that owns every device machine,
//!   serializes commands, walks the delegation graph and manages timers
//! - Provide the restartable **timer** primitive behind every timing rule
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `rulehub-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod hub;
pub mod ports;
pub mod timer;

//! # rulehub-domain
//!
//! Pure domain model for the rulehub home automation controller.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the **State** and **Command** vocabularies shared by every device
//! - Define **Sources** (who issued a command) and the filters rules match on
//! - Define the **Rule tables** (ignore, mapping, delay, trigger, idle, schedule)
//! - Define **Device** configuration (kinds, valid states, bindings)
//! - Implement the **command router** as a pure state machine that returns
//!   effects instead of performing them
//! - Define **Events** (state-change records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It never spawns tasks, sleeps, or logs. Timers, propagation and IO are
//! driven by the `app` crate from the [`machine::Effect`]s returned here.

pub mod error;
pub mod id;
pub mod time;

pub mod command;
pub mod device;
pub mod event;
pub mod machine;
pub mod rules;
pub mod schedule;
pub mod source;
pub mod state;

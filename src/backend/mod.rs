//! Acquisition side of a machine
//!
//! The [`Supervisor`] runs on its own thread and hands finished payloads to
//! the delivery side through a bounded channel.
//!
//! # Architecture
//!
//! ```text
//! Supervisor --(Outbox::send, try_send)--> [bounded queue] --> Wrapper --> broker
//! ```
//!
//! - [`ipc`] - the queue and the counting [`Outbox`]
//! - [`supervisor`] - lifecycle, sampling loop and fault containment

pub mod ipc;
pub mod supervisor;

pub use ipc::{channel, MessageReceiver, MessageSender, Outbox};
pub use supervisor::{Lifecycle, Supervisor};

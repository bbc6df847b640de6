//! Calculation pipelines and sensing stacks
//!
//! A [`Pipeline`] is an ordered chain of calculation units sharing one
//! variable mapping per execution. A [`SensingStack`] binds one device to one
//! pipeline and adds constants and a key prefix. Failures surface as tagged
//! [`StackError`]s that the supervisor turns into error messages.

pub mod chain;
pub mod error;
pub mod stack;

pub use chain::Pipeline;
pub use error::{StackError, StackResult};
pub use stack::SensingStack;

//! Workflow events and signal distribution.
//!
//! `Event` describes facts emitted by aggregates. `EventBus` fans out
//! notification signals to collaborators (notification/UI, payment/ERP) after
//! the corresponding audit entry is durable.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

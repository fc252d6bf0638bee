//! Alert events and the aggregation collaborator that counts them

pub mod memory;
pub mod model;
pub mod search;
pub mod source;

pub use memory::InMemoryEventSource;
pub use model::{AlertEvent, EventStatus};
pub use search::SearchEventSource;
pub use source::{AlertEventSource, AlertQuery, EventSourceError};

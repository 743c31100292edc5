pub mod coordinator;
pub mod message;

pub use coordinator::Coordinator;
pub use message::{Envelope, Inbound, MessageKind, Outbound, Payload};

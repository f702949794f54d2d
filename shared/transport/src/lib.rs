pub mod channel;
pub mod collectives;
pub mod error;
pub mod sim;
pub mod transport;

pub use channel::{SlotPart, Tag};
pub use collectives::Collectives;
pub use error::TransportError;
pub use sim::SimTransport;
pub use transport::Transport;

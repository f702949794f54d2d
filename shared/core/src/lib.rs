pub mod config;
pub mod error;
pub mod identity;
pub mod layer_assignment;
pub mod parameter_store;
pub mod process_group;
pub mod runtime;
pub mod status;

pub use config::{ParallelismMode, RunConfig, TrainMode};
pub use error::CoreError;
pub use identity::{LayerShape, PeerIdentity};
pub use layer_assignment::LayerAssignment;
pub use parameter_store::{ParameterSlot, ParameterStore};
pub use process_group::ProcessGroupState;
pub use runtime::Runtime;
pub use status::TrainStatus;

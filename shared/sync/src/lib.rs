pub mod background_queue;
pub mod data_parallel;
pub mod sync_dispatcher;

pub use background_queue::BackgroundQueue;
pub use data_parallel::{DataParallelSync, LayerBuffer};
pub use sync_dispatcher::SyncDispatcher;

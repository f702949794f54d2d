pub mod accuracy;
pub mod model;
pub mod onehot;
pub mod training_loop;

pub use accuracy::accuracy;
pub use model::DistributedModel;
pub use onehot::{class_count, one_hot};
pub use training_loop::TrainingLoop;

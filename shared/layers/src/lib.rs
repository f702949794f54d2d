pub mod activation;
pub mod linear;
pub mod loss;
pub mod mat;
pub mod module;

pub use activation::{ReLU, Softmax};
pub use linear::Linear;
pub use loss::Mse;
pub use mat::Mat;
pub use module::{FlatParams, Module};

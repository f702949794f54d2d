use crate::mat::Mat;

/// The contract every layer (trainable or not) implements. Coordination code
/// above this crate never depends on which concrete layer it's driving —
/// only on `forward`/`backward` and, for trainable layers, `set_lr` and
/// `param_count`.
pub trait Module {
    fn forward(&mut self, input: &Mat) -> Mat;

    /// `grad_output` is dL/d(output); returns dL/d(input) for the caller to
    /// keep propagating backward. Trainable layers update their own
    /// parameters as a side effect.
    fn backward(&mut self, grad_output: &Mat) -> Mat;

    /// No-op for layers without parameters.
    fn set_lr(&mut self, _lr: f32) {}

    /// Number of trainable scalars (weights + biases); 0 for activations.
    fn param_count(&self) -> usize {
        0
    }

    /// Flattened weight/bias for layers that have them, so the coordination
    /// crates can pull/push parameters without depending on the concrete
    /// layer type. `None` for activations.
    fn flat_params(&self) -> Option<FlatParams> {
        None
    }

    /// Overwrites this layer's parameters from a flattened snapshot. No-op
    /// for activations.
    fn set_flat_params(&mut self, _params: FlatParams) {}
}

/// A layer's weight and bias flattened row-major, with the shape needed to
/// reconstruct the weight matrix.
#[derive(Debug, Clone)]
pub struct FlatParams {
    pub weight: Vec<f32>,
    pub weight_shape: (usize, usize),
    pub bias: Vec<f32>,
}

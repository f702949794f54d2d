use peertrain_core::{LayerShape, ParameterStore};
use peertrain_layers::{Linear, Mat, Module, ReLU, Softmax};

/// The layer stack this peer runs: every trainable (Linear) layer it owns
/// followed by an activation — `ReLU` for every layer but the last, `Softmax`
/// for the last, matching the classification head the one-hot training loop
/// expects. Under data and tensor parallelism this is the whole model; under
/// pipeline parallelism it's just this peer's assigned slice.
pub struct DistributedModel {
    modules: Vec<Box<dyn Module>>,
    /// Index into `modules` of each trainable layer, paired with its global
    /// layer number (used to tag data-parallel pull/push calls).
    trainable: Vec<(usize, usize)>,
}

impl DistributedModel {
    pub fn build(layer_shape: &LayerShape, store: &ParameterStore) -> Self {
        // `layer_shape.len()` is `L + 1` widths; the last trainable layer's
        // global index is `L - 1 = layer_shape.len() - 2`.
        let last_layer = layer_shape.len() - 2;
        let mut modules: Vec<Box<dyn Module>> = Vec::new();
        let mut trainable = Vec::new();

        for (local_idx, global) in store.global_indices().enumerate() {
            let slot = store.slot(local_idx);
            let weight = Mat::from_flat(slot.fan_in, slot.fan_out, &slot.weight);
            modules.push(Box::new(Linear::new(weight, slot.bias.clone(), 0.0)));
            trainable.push((modules.len() - 1, global));

            if global == last_layer {
                modules.push(Box::new(Softmax::new()));
            } else {
                modules.push(Box::new(ReLU::new()));
            }
        }

        Self { modules, trainable }
    }

    pub fn set_lr(&mut self, lr: f32) {
        for &(pos, _) in &self.trainable {
            self.modules[pos].set_lr(lr);
        }
    }

    pub fn forward(&mut self, input: &Mat) -> Mat {
        let mut activation = input.clone();
        for module in self.modules.iter_mut() {
            activation = module.forward(&activation);
        }
        activation
    }

    pub fn backward(&mut self, grad: &Mat) -> Mat {
        let mut g = grad.clone();
        for module in self.modules.iter_mut().rev() {
            g = module.backward(&g);
        }
        g
    }

    pub fn modules_mut(&mut self) -> &mut [Box<dyn Module>] {
        &mut self.modules
    }

    /// Trainable layers in ascending order, as `(module index, global layer
    /// number)`. Data-parallel sync pulls/pushes in this order (reversed for
    /// the push side, per the backward-order gradient push contract).
    pub fn trainable_layers(&self) -> &[(usize, usize)] {
        &self.trainable
    }

    pub fn flat_weight_bias(&self, module_index: usize) -> (Vec<f32>, (usize, usize), Vec<f32>) {
        let params = self.modules[module_index].flat_params().expect("not a trainable layer");
        (params.weight, params.weight_shape, params.bias)
    }

    pub fn set_flat_weight_bias(&mut self, module_index: usize, weight: Vec<f32>, weight_shape: (usize, usize), bias: Vec<f32>) {
        self.modules[module_index].set_flat_params(peertrain_layers::FlatParams {
            weight,
            weight_shape,
            bias,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use peertrain_core::ParameterStore;

    #[test]
    fn build_interleaves_relu_and_ends_in_softmax() {
        let shape = LayerShape::new(vec![2, 3, 2]);
        let store = ParameterStore::init_full(&shape, 1);
        let model = DistributedModel::build(&shape, &store);
        assert_eq!(model.trainable_layers().len(), 2);
        assert_eq!(model.trainable_layers()[1].1, 1); // last trainable layer is global index 1
    }

    #[test]
    fn forward_produces_row_per_input() {
        let shape = LayerShape::new(vec![2, 2]);
        let store = ParameterStore::init_full(&shape, 1);
        let mut model = DistributedModel::build(&shape, &store);
        let input = Mat::from_rows(vec![vec![0.5, 0.5], vec![1.0, 1.0]]);
        let output = model.forward(&input);
        assert_eq!(output.rows(), 2);
    }
}

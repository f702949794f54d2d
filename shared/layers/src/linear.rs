use crate::mat::Mat;
use crate::module::{FlatParams, Module};

/// A fully-connected layer: `y = x . W - b`, matching the original
/// implementation's per-layer forward (which subtracts the bias rather than
/// adding it).
///
/// Caches its last forward input so `backward` can compute the weight
/// gradient without the caller threading it through explicitly. Under
/// pipeline re-materialization the streamer re-runs `forward` against the
/// cached slice input immediately before calling `backward`, which refreshes
/// this cache with the activation the weight update is supposed to see.
pub struct Linear {
    weight: Mat,
    bias: Vec<f32>,
    lr: f32,
    last_input: Option<Mat>,
}

impl Linear {
    pub fn new(weight: Mat, bias: Vec<f32>, lr: f32) -> Self {
        assert_eq!(weight.cols(), bias.len(), "weight/bias width mismatch");
        Self {
            weight,
            bias,
            lr,
            last_input: None,
        }
    }

    pub fn weight(&self) -> &Mat {
        &self.weight
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    pub fn set_weight(&mut self, weight: Mat) {
        self.weight = weight;
    }

    pub fn set_bias(&mut self, bias: Vec<f32>) {
        self.bias = bias;
    }
}

impl Module for Linear {
    fn forward(&mut self, input: &Mat) -> Mat {
        let bias_row = ndarray::Array1::from_vec(self.bias.iter().map(|b| -b).collect());
        let output = input.dot(&self.weight).add_row_broadcast(&bias_row);
        self.last_input = Some(input.clone());
        output
    }

    fn backward(&mut self, grad_output: &Mat) -> Mat {
        let input = self.last_input.as_ref().expect("backward called before forward");

        let weight_grad = input.transpose().dot(grad_output).scale(self.lr);
        self.weight = self.weight.zip_map(&weight_grad, |w, g| w - g);

        let bias_grad = grad_output.mean_axis0();
        for (b, g) in self.bias.iter_mut().zip(bias_grad.iter()) {
            *b -= self.lr * g;
        }

        grad_output.dot(&self.weight.transpose())
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn param_count(&self) -> usize {
        self.weight.rows() * self.weight.cols() + self.bias.len()
    }

    fn flat_params(&self) -> Option<FlatParams> {
        Some(FlatParams {
            weight: self.weight.to_flat(),
            weight_shape: self.weight.shape(),
            bias: self.bias.clone(),
        })
    }

    fn set_flat_params(&mut self, params: FlatParams) {
        let (rows, cols) = params.weight_shape;
        self.weight = Mat::from_flat(rows, cols, &params.weight);
        self.bias = params.bias;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn forward_subtracts_bias_from_matrix_product() {
        let weight = Mat::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let mut layer = Linear::new(weight, vec![0.5, -0.5], 0.1);
        let input = Mat::from_rows(vec![vec![1.0, 2.0]]);
        let output = layer.forward(&input);
        assert_eq!(output.as_array().row(0).to_vec(), vec![0.5, 2.5]);
    }

    #[test]
    fn backward_shrinks_weight_in_gradient_direction() {
        let weight = Mat::from_rows(vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
        let mut layer = Linear::new(weight.clone(), vec![0.0, 0.0], 0.5);
        let input = Mat::from_rows(vec![vec![1.0, 1.0]]);
        layer.forward(&input);
        let grad_output = Mat::from_rows(vec![vec![1.0, 1.0]]);
        layer.backward(&grad_output);
        // x^T . dout = [[1,1],[1,1]]; lr=0.5 -> weight -= 0.5 everywhere.
        assert_eq!(layer.weight().as_array().iter().copied().collect::<Vec<_>>(), vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn bias_update_ignores_input_entirely() {
        // Two different inputs, identical grad_output, must yield the same bias
        // update either way -- the bias gradient never depends on the forward
        // activation, only on `dout`.
        let weight = Mat::from_rows(vec![vec![1.0], vec![1.0]]);
        let grad_output = Mat::from_rows(vec![vec![2.0], vec![4.0]]);

        let mut a = Linear::new(weight.clone(), vec![0.0], 1.0);
        a.forward(&Mat::from_rows(vec![vec![1.0, 1.0], vec![1.0, 1.0]]));
        a.backward(&grad_output);

        let mut b = Linear::new(weight, vec![0.0], 1.0);
        b.forward(&Mat::from_rows(vec![vec![100.0, -100.0], vec![-7.0, 7.0]]));
        b.backward(&grad_output);

        assert_eq!(a.bias(), b.bias());
    }
}

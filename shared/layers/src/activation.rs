use crate::mat::Mat;
use crate::module::Module;

/// Elementwise `max(0, x)`. Backward zeroes the gradient wherever the forward
/// input was non-positive.
#[derive(Default)]
pub struct ReLU {
    mask: Option<Mat>,
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for ReLU {
    fn forward(&mut self, input: &Mat) -> Mat {
        self.mask = Some(input.map(|v| if v > 0.0 { 1.0 } else { 0.0 }));
        input.map(|v| v.max(0.0))
    }

    fn backward(&mut self, grad_output: &Mat) -> Mat {
        let mask = self.mask.as_ref().expect("backward called before forward");
        grad_output.zip_map(mask, |g, m| g * m)
    }
}

/// Row-wise softmax: `s_i = exp(x_i) / sum_j exp(x_j)`, shifted by the row max
/// for numerical stability.
#[derive(Default)]
pub struct Softmax {
    output: Option<Mat>,
}

impl Softmax {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for Softmax {
    fn forward(&mut self, input: &Mat) -> Mat {
        let array = input.as_array();
        let mut out = array.clone();
        for mut row in out.rows_mut() {
            let max = row.iter().copied().fold(f32::MIN, f32::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum: f32 = row.iter().sum();
            row.mapv_inplace(|v| v / sum);
        }
        let result = Mat::from_flat(out.nrows(), out.ncols(), out.as_slice().expect("contiguous output"));
        self.output = Some(result.clone());
        result
    }

    fn backward(&mut self, grad_output: &Mat) -> Mat {
        let softmax = self.output.as_ref().expect("backward called before forward");
        let s = softmax.as_array();
        let dout = grad_output.as_array();
        let mut result = ndarray::Array2::zeros(s.raw_dim());
        for (row_idx, (s_row, d_row)) in s.rows().into_iter().zip(dout.rows()).enumerate() {
            let dot: f32 = s_row.iter().zip(d_row.iter()).map(|(si, di)| si * di).sum();
            for (col_idx, (&si, &di)) in s_row.iter().zip(d_row.iter()).enumerate() {
                result[[row_idx, col_idx]] = si * (di - dot);
            }
        }
        Mat::from_flat(result.nrows(), result.ncols(), result.as_slice().expect("contiguous result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn relu_zeroes_negative_inputs() {
        let mut layer = ReLU::new();
        let input = Mat::from_rows(vec![vec![-1.0, 0.0, 2.0]]);
        let out = layer.forward(&input);
        assert_eq!(out.as_array().row(0).to_vec(), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn relu_backward_blocks_gradient_through_negatives() {
        let mut layer = ReLU::new();
        layer.forward(&Mat::from_rows(vec![vec![-1.0, 2.0]]));
        let grad = layer.backward(&Mat::from_rows(vec![vec![5.0, 5.0]]));
        assert_eq!(grad.as_array().row(0).to_vec(), vec![0.0, 5.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let mut layer = Softmax::new();
        let out = layer.forward(&Mat::from_rows(vec![vec![1.0, 2.0, 3.0]]));
        let sum: f32 = out.as_array().row(0).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}

use crate::mat::Mat;

/// Mean squared error between a prediction and a one-hot target. Not a
/// [`crate::module::Module`] — a loss is the end of the chain, not a link in
/// it, so it takes the target directly instead of threading through `forward`.
pub struct Mse;

impl Mse {
    /// `(pred - target).squaredNorm() / rows` — matches the original
    /// implementation's per-batch (not per-element) normalization.
    pub fn loss(pred: &Mat, target: &Mat) -> f32 {
        let diff = pred.zip_map(target, |p, t| (p - t).powi(2));
        diff.as_array().sum() / diff.rows() as f32
    }

    /// `d(loss)/d(pred) = 2 * (pred - target) / rows` — the gradient the
    /// training loop feeds into the model's last `backward`.
    pub fn grad(pred: &Mat, target: &Mat) -> Mat {
        let n = pred.rows() as f32;
        pred.zip_map(target, move |p, t| 2.0 * (p - t) / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn loss_is_zero_for_identical_matrices() {
        let m = Mat::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(Mse::loss(&m, &m), 0.0);
    }

    #[test]
    fn grad_points_toward_target() {
        let pred = Mat::from_rows(vec![vec![2.0]]);
        let target = Mat::from_rows(vec![vec![0.0]]);
        let grad = Mse::grad(&pred, &target);
        assert!(grad.as_array()[[0, 0]] > 0.0);
    }
}

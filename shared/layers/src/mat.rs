use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_chacha::ChaCha8Rng;

/// The dense-matrix type every layer operates on. A thin wrapper over
/// `ndarray::Array2<f32>` — shape, reductions, product and transpose are all
/// it provides; it is not a numerics crate in its own right.
#[derive(Debug, Clone, PartialEq)]
pub struct Mat(Array2<f32>);

impl Mat {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self(Array2::zeros((rows, cols)))
    }

    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Self(Array2::from_shape_vec((height, width), flat).expect("ragged row lengths"))
    }

    pub fn uniform(rows: usize, cols: usize, low: f32, high: f32, rng: &mut ChaCha8Rng) -> Self {
        Self(Array2::random_using((rows, cols), Uniform::new(low, high), rng))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.0.nrows(), self.0.ncols())
    }

    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.0
    }

    pub fn into_array(self) -> Array2<f32> {
        self.0
    }

    pub fn row_slice(&self, start: usize, len: usize) -> Self {
        Self(self.0.slice(ndarray::s![start..start + len, ..]).to_owned())
    }

    pub fn dot(&self, other: &Mat) -> Mat {
        Mat(self.0.dot(&other.0))
    }

    pub fn transpose(&self) -> Mat {
        Mat(self.0.t().to_owned())
    }

    pub fn add_assign(&mut self, other: &Mat) {
        self.0 += &other.0;
    }

    pub fn scale(&self, factor: f32) -> Mat {
        Mat(&self.0 * factor)
    }

    /// Column-wise mean, as a single row (used by `Linear::backward` for the
    /// bias gradient: `mean(dout, axis=0)`).
    pub fn mean_axis0(&self) -> Array1<f32> {
        self.0.mean_axis(Axis(0)).expect("mean of empty matrix")
    }

    pub fn add_row_broadcast(&self, row: &Array1<f32>) -> Mat {
        Mat(&self.0 + row)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Mat {
        Mat(self.0.mapv(f))
    }

    pub fn zip_map(&self, other: &Mat, f: impl Fn(f32, f32) -> f32) -> Mat {
        Mat(ndarray::Zip::from(&self.0).and(&other.0).map_collect(|&a, &b| f(a, b)))
    }

    /// Index (argmax) of the largest value in each row — used for the
    /// accuracy metric's predicted-class extraction.
    pub fn row_argmax(&self) -> Vec<usize> {
        self.0
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Flattens row-major into a plain `Vec<f32>`, e.g. for a collective pull/push.
    pub fn to_flat(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }

    pub fn from_flat(rows: usize, cols: usize, flat: &[f32]) -> Self {
        Self(Array2::from_shape_vec((rows, cols), flat.to_vec()).expect("flat buffer size mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dot_product_matches_expected_shape() {
        let a = Mat::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = Mat::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]);
        let c = a.dot(&b);
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.as_array()[[0, 0]], 1.0 * 5.0 + 2.0 * 7.0);
    }

    #[test]
    fn mean_axis0_averages_columns() {
        let m = Mat::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mean = m.mean_axis0();
        assert_eq!(mean.to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn row_argmax_picks_largest_entry() {
        let m = Mat::from_rows(vec![vec![0.1, 0.9, 0.2], vec![5.0, 1.0, 2.0]]);
        assert_eq!(m.row_argmax(), vec![1, 0]);
    }

    #[test]
    fn flat_roundtrip_preserves_values() {
        let m = Mat::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let flat = m.to_flat();
        let back = Mat::from_flat(2, 3, &flat);
        assert_eq!(m, back);
    }
}

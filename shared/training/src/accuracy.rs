use peertrain_layers::Mat;

/// Fraction of rows where the predicted class (argmax of `prediction`)
/// matches the label's class (argmax of the one-hot `target`, or the raw
/// integer value if `target` is a single column).
pub fn accuracy(prediction: &Mat, target: &Mat) -> f32 {
    let predicted = prediction.row_argmax();
    let actual: Vec<usize> = if target.cols() == 1 {
        target.as_array().iter().map(|&v| v.round() as usize).collect()
    } else {
        target.row_argmax()
    };
    let correct = predicted.iter().zip(actual.iter()).filter(|(p, a)| p == a).count();
    correct as f32 / predicted.len().max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_matching_argmax_rows() {
        let prediction = Mat::from_rows(vec![vec![0.1, 0.9], vec![0.8, 0.2]]);
        let target = Mat::from_rows(vec![vec![1.0], vec![1.0]]);
        assert_eq!(accuracy(&prediction, &target), 0.5);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let prediction = Mat::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let target = Mat::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(accuracy(&prediction, &target), 1.0);
    }
}

use peertrain_layers::Mat;

/// Determines the one-hot width from the full training label set at
/// bootstrap, rather than `max(batch) + 1` per batch — a batch that happens
/// not to contain the rarest class would otherwise get a narrower encoding
/// than the model's output layer, corrupting the loss gradient's shape.
pub fn class_count(labels: &Mat) -> usize {
    labels
        .as_array()
        .iter()
        .map(|&v| v.round() as i64)
        .max()
        .map(|max| (max + 1).max(1) as usize)
        .unwrap_or(1)
}

/// One-hot encodes a column of integer class labels against a globally fixed
/// width.
pub fn one_hot(labels: &Mat, width: usize) -> Mat {
    let array = labels.as_array();
    let mut rows = Vec::with_capacity(array.nrows());
    for row in array.rows() {
        let class = row[0].round() as usize;
        let mut encoded = vec![0.0; width];
        encoded[class] = 1.0;
        rows.push(encoded);
    }
    Mat::from_rows(rows)
}

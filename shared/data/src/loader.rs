use std::fs;
use std::path::{Path, PathBuf};

use peertrain_layers::Mat;

use crate::error::DataError;

/// Numbers the `part-*****` files present for `role` (e.g. `train_features`)
/// in `dir`, sorted by their numeric suffix. Rank 0 calls this once at
/// bootstrap; the resulting count drives [`crate::sharding::DataSharding`].
pub fn list_parts(dir: &Path, role: &str) -> Result<Vec<usize>, DataError> {
    let mut indices = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| DataError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let prefix = format!("{role}-part-");
    for entry in entries {
        let entry = entry.map_err(|e| DataError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(suffix) = name.strip_prefix(&prefix) {
            if let Ok(idx) = suffix.parse::<usize>() {
                indices.push(idx);
            }
        }
    }
    if indices.is_empty() {
        return Err(DataError::EmptyDataDir(dir.to_path_buf()));
    }
    indices.sort_unstable();
    Ok(indices)
}

fn part_path(dir: &Path, role: &str, index: usize) -> PathBuf {
    dir.join(format!("{role}-part-{index:05}"))
}

/// Parses one `part-NNNNN` file: comma- or whitespace-separated float rows.
fn parse_rows(path: &Path) -> Result<Vec<Vec<f32>>, DataError> {
    let text = fs::read_to_string(path).map_err(|e| DataError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rows = Vec::new();
    let mut width = None;
    for (row_idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<f32> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(|f| f.parse::<f32>().expect("non-numeric field in part file"))
            .collect();
        let expected = *width.get_or_insert(fields.len());
        if fields.len() != expected {
            return Err(DataError::RaggedRow {
                path: path.to_path_buf(),
                row: row_idx,
                expected,
                actual: fields.len(),
            });
        }
        rows.push(fields);
    }
    Ok(rows)
}

/// Loads every `{role}-part-{index}` file named by `indices`, in order, and
/// vertically concatenates their rows into a single [`Mat`].
pub fn load_role(dir: &Path, role: &str, indices: &[usize]) -> Result<Mat, DataError> {
    let mut rows = Vec::new();
    for &index in indices {
        rows.extend(parse_rows(&part_path(dir, role, index))?);
    }
    Ok(Mat::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn parses_comma_and_whitespace_rows() {
        let dir = tempdir();
        let path = dir.join("train_features-part-00000");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "1.0,2.0,3.0").unwrap();
        writeln!(f, "4.0 5.0 6.0").unwrap();
        let rows = parse_rows(&path).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn list_parts_sorts_numerically() {
        let dir = tempdir();
        for i in [2, 0, 1] {
            fs::File::create(dir.join(format!("train_features-part-{i:05}"))).unwrap();
        }
        let indices = list_parts(&dir, "train_features").unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn load_role_concatenates_parts_vertically() {
        let dir = tempdir();
        for (i, row) in ["1,1", "2,2"].iter().enumerate() {
            let mut f = fs::File::create(dir.join(format!("train_labels-part-{i:05}"))).unwrap();
            writeln!(f, "{row}").unwrap();
        }
        let mat = load_role(&dir, "train_labels", &[0, 1]).unwrap();
        assert_eq!(mat.shape(), (2, 2));
    }

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("peertrain-data-test-{}-{unique}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

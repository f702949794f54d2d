/// This peer's position in the fixed process group. Immutable for the run.
///
/// Rank 0 is the parameter master under data parallelism and the pipeline head
/// under pipeline parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    rank: i32,
    size: i32,
}

impl PeerIdentity {
    /// Panics if `size < 1` or `rank` is out of `[0, size)` — both indicate a
    /// misconfigured transport rather than a recoverable condition.
    pub fn new(rank: i32, size: i32) -> Self {
        assert!(size >= 1, "process group size must be at least 1, got {size}");
        assert!(
            (0..size).contains(&rank),
            "rank {rank} out of range for process group of size {size}"
        );
        Self { rank, size }
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    pub fn is_tail(&self) -> bool {
        self.rank == self.size - 1
    }
}

/// Ordered widths `[w0, w1, ..., wL]` of the trainable (Linear) layers. Identical
/// on every peer; `len()` is `L + 1` (one width per layer boundary), so the
/// trainable-layer count the pipeline assignment and bootstrap gate reason
/// about is `len() - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShape(Vec<usize>);

impl LayerShape {
    pub fn new(widths: Vec<usize>) -> Self {
        assert!(!widths.is_empty(), "layer shape must name at least one layer");
        Self(widths)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn widths(&self) -> &[usize] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_out_of_range_rank() {
        let result = std::panic::catch_unwind(|| PeerIdentity::new(4, 4));
        assert!(result.is_err());
    }

    #[test]
    fn root_and_tail_at_boundaries() {
        let root = PeerIdentity::new(0, 3);
        let tail = PeerIdentity::new(2, 3);
        assert!(root.is_root());
        assert!(!root.is_tail());
        assert!(tail.is_tail());
        assert!(!tail.is_root());
    }
}

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::identity::LayerShape;
use crate::layer_assignment::LayerAssignment;

/// One trainable layer's weight and bias, flattened row-major so they can be
/// handed directly to [`peertrain_transport::Collectives`]'s flat-slice pull and
/// push operations without an intermediate copy.
#[derive(Debug, Clone)]
pub struct ParameterSlot {
    pub fan_in: usize,
    pub fan_out: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ParameterSlot {
    fn init(fan_in: usize, fan_out: usize, rng: &mut ChaCha8Rng) -> Self {
        let weight = (0..fan_in * fan_out).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let bias = (0..fan_out).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self {
            fan_in,
            fan_out,
            weight,
            bias,
        }
    }
}

/// The parameter slots this peer owns. Under data and tensor parallelism every
/// peer owns all `L` slots (one per consecutive pair of widths in the layer
/// shape); under pipeline parallelism a peer owns only the slots inside its
/// [`LayerAssignment`].
///
/// Initialization draws uniform `[-1, 1]` floats from a `ChaCha8Rng` seeded
/// identically on every peer, so replicas start from the same draw under modes
/// that never synchronize (tensor). Data parallelism additionally distributes
/// rank 0's draw via a first pull (see `peertrain-sync`) so every peer starts
/// byte-identical regardless of per-peer RNG state drift from earlier draws.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    /// Global layer index of `slots[0]`.
    base_layer: usize,
    slots: Vec<ParameterSlot>,
}

impl ParameterStore {
    /// Allocates every layer 0..L — used by data and tensor parallelism.
    /// `shape.len()` is `L + 1` (the width entries `[w0, ..., wL]`), so the
    /// trainable-layer count `L` is `shape.len() - 1`.
    pub fn init_full(shape: &LayerShape, seed: u64) -> Self {
        Self::init_range(shape, 0, shape.len() - 1, seed)
    }

    /// Allocates only the layers named by `assignment` — used by pipeline
    /// parallelism, where each peer owns a contiguous slice of the model.
    pub fn init_assigned(shape: &LayerShape, assignment: LayerAssignment, seed: u64) -> Self {
        Self::init_range(shape, assignment.start, assignment.end, seed)
    }

    fn init_range(shape: &LayerShape, start: usize, end: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let widths = shape.widths();
        // Layer `i` maps widths[i] -> widths[i + 1]; draw every slot up to
        // `start` too so peers stay aligned on the same RNG stream regardless
        // of which slice of the model they end up owning.
        let mut slots = Vec::with_capacity(end - start);
        for i in 0..end {
            let slot = ParameterSlot::init(widths[i], widths[i + 1], &mut rng);
            if i >= start {
                slots.push(slot);
            }
        }
        Self { base_layer: start, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Converts a global layer index into an index into `self.slots`, or
    /// `None` if this peer doesn't own that layer.
    pub fn local_index(&self, global_layer: usize) -> Option<usize> {
        global_layer
            .checked_sub(self.base_layer)
            .filter(|&i| i < self.slots.len())
    }

    pub fn base_layer(&self) -> usize {
        self.base_layer
    }

    /// Global layer indices this peer owns, in ascending order.
    pub fn global_indices(&self) -> impl Iterator<Item = usize> {
        self.base_layer..self.base_layer + self.slots.len()
    }

    pub fn slot(&self, local_index: usize) -> &ParameterSlot {
        &self.slots[local_index]
    }

    pub fn slot_mut(&mut self, local_index: usize) -> &mut ParameterSlot {
        &mut self.slots[local_index]
    }

    pub fn slots(&self) -> &[ParameterSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [ParameterSlot] {
        &mut self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_seed_yields_identical_draws() {
        let shape = LayerShape::new(vec![2, 3, 1]);
        let a = ParameterStore::init_full(&shape, 42);
        let b = ParameterStore::init_full(&shape, 42);
        for (sa, sb) in a.slots().iter().zip(b.slots()) {
            assert_eq!(sa.weight, sb.weight);
            assert_eq!(sa.bias, sb.bias);
        }
    }

    #[test]
    fn assigned_store_only_holds_its_range() {
        let shape = LayerShape::new(vec![2, 3, 4, 1]); // L = 3
        let assignment = LayerAssignment { start: 1, end: 3 };
        let store = ParameterStore::init_assigned(&shape, assignment, 7);
        assert_eq!(store.len(), 2);
        assert!(store.local_index(0).is_none());
        assert_eq!(store.local_index(1), Some(0));
        assert_eq!(store.local_index(2), Some(1));
    }
}

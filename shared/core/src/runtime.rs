use std::sync::Arc;

use peertrain_transport::Collectives;

use crate::config::{ParallelismMode, RunConfig};
use crate::identity::LayerShape;
use crate::layer_assignment::LayerAssignment;
use crate::parameter_store::ParameterStore;
use crate::process_group::ProcessGroupState;
use crate::status::TrainStatus;

/// Everything a training loop needs, bundled into one explicitly-owned value
/// instead of the reference implementation's process-wide globals
/// (`globalController`, `globalState`, `globalTrainMode`,
/// `globalParallelismMode`, `globalTrainStatus`, `globalBackgroundThread`).
/// Built once at bootstrap and passed by reference (or cloned behind an `Arc`
/// for the background queue) into every module that needs it.
pub struct Runtime {
    pub config: RunConfig,
    pub layer_shape: LayerShape,
    pub group: Arc<ProcessGroupState>,
    pub assignment: Option<LayerAssignment>,
    pub parameters: ParameterStore,
}

impl Runtime {
    /// Builds the runtime for a peer: validates the config against the actual
    /// transport size, computes this peer's pipeline assignment (if
    /// applicable), and allocates its parameter slots from the shared seed.
    pub fn bootstrap(config: RunConfig, transport: Arc<dyn Collectives>, seed: u64) -> Result<Self, crate::error::CoreError> {
        config.validate(transport.size())?;
        let layer_shape = LayerShape::new(config.layer_shape.clone());
        // Placeholder until the training loop knows batches_per_epoch and calls
        // `set_finish_flag`; the sentinel can't match a real stamped status, so
        // no peer is mistaken for finished before the loop sets the real value.
        let group = Arc::new(ProcessGroupState::new(transport, TrainStatus::FINISH));

        let (assignment, parameters) = if config.parallelism_mode == ParallelismMode::Pipeline {
            let assignment = LayerAssignment::for_rank(&layer_shape, group.size(), group.rank());
            let parameters = ParameterStore::init_assigned(&layer_shape, assignment, seed);
            (Some(assignment), parameters)
        } else {
            (None, ParameterStore::init_full(&layer_shape, seed))
        };

        Ok(Self {
            config,
            layer_shape,
            group,
            assignment,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::config::TrainMode;
    use peertrain_transport::SimTransport;
    use std::path::PathBuf;

    fn config(mode: ParallelismMode, layer_shape: Vec<usize>) -> RunConfig {
        RunConfig {
            layer_shape,
            epochs: 1,
            batch_size: 4,
            learning_rate: 0.1,
            log_step: 1,
            parallelism_mode: mode,
            train_mode: TrainMode::Sync,
            data_dir: PathBuf::from("data"),
        }
    }

    #[test]
    fn pipeline_bootstrap_computes_local_assignment() {
        let transports = SimTransport::group(2);
        let mut iter = transports.into_iter();
        let t0: Arc<dyn Collectives> = Arc::new(iter.next().unwrap());
        let runtime = Runtime::bootstrap(config(ParallelismMode::Pipeline, vec![2, 3, 4, 1]), t0, 1).unwrap();
        assert!(runtime.assignment.is_some());
        assert_eq!(runtime.parameters.len(), runtime.assignment.unwrap().len());
    }

    #[test]
    fn data_parallel_bootstrap_owns_every_layer() {
        let transports = SimTransport::group(1);
        let t: Arc<dyn Collectives> = Arc::new(transports.into_iter().next().unwrap());
        let runtime = Runtime::bootstrap(config(ParallelismMode::Data, vec![2, 3, 1]), t, 1).unwrap();
        assert!(runtime.assignment.is_none());
        assert_eq!(runtime.parameters.len(), 2);
    }
}

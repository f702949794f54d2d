use std::sync::Arc;

use peertrain_core::{ParallelismMode, ProcessGroupState, RunConfig, TrainStatus};
use peertrain_layers::{Mat, Mse};
use peertrain_pipeline::PipelineStreamer;
use peertrain_sync::{DataParallelSync, LayerBuffer};

use crate::accuracy::accuracy;
use crate::model::DistributedModel;
use crate::onehot::{class_count, one_hot};

/// Drives epochs and batches across a peer's local data, dispatching the
/// per-batch synchronization appropriate to the configured parallelism mode:
/// pull-before-forward/push-during-backward under data parallelism, the
/// flag-gated stream under pipeline parallelism, or nothing at all under
/// tensor parallelism (an intentional drift, not an omission).
pub struct TrainingLoop {
    group: Arc<ProcessGroupState>,
    config: RunConfig,
    model: DistributedModel,
    dp_sync: Option<DataParallelSync>,
    streamer: Option<PipelineStreamer>,
    train_features: Mat,
    train_labels: Mat,
    test_features: Mat,
    test_labels: Mat,
    class_count: usize,
}

impl TrainingLoop {
    pub fn new(
        group: Arc<ProcessGroupState>,
        config: RunConfig,
        model: DistributedModel,
        train_features: Mat,
        train_labels: Mat,
        test_features: Mat,
        test_labels: Mat,
    ) -> Self {
        let class_count = class_count(&train_labels);
        let dp_sync = match config.parallelism_mode {
            ParallelismMode::Data => Some(DataParallelSync::new(group.clone(), config.train_mode)),
            _ => None,
        };
        let streamer = match config.parallelism_mode {
            ParallelismMode::Pipeline => Some(PipelineStreamer::new(group.transport().clone())),
            _ => None,
        };
        Self {
            group,
            config,
            model,
            dp_sync,
            streamer,
            train_features,
            train_labels,
            test_features,
            test_labels,
            class_count,
        }
    }

    pub fn run(mut self) -> DistributedModel {
        self.model.set_lr(self.config.learning_rate);
        let batch_size = self.config.batch_size;
        let n = self.train_features.rows();
        let batches_per_epoch = (n / batch_size).max(1);

        self.group.set_finish_flag(TrainStatus::new(
            (self.config.epochs - 1) as i64,
            (batches_per_epoch - 1) as i64,
        ));

        let rank = self.group.rank();

        for epoch in 0..self.config.epochs {
            for batch_idx in 0..batches_per_epoch {
                self.group.stamp_status(TrainStatus::new(epoch as i64, batch_idx as i64));
                let start = batch_idx * batch_size;
                let x = self.train_features.row_slice(start, batch_size);
                let y = self.train_labels.row_slice(start, batch_size);
                let target = one_hot(&y, self.class_count);
                self.train_batch(&x, &target);
            }

            if epoch % self.config.log_step.max(1) == 0 {
                let (train_acc, train_loss) = self.evaluate(&self.train_features.clone(), &self.train_labels.clone());
                let (test_acc, _) = self.evaluate(&self.test_features.clone(), &self.test_labels.clone());
                tracing::info!(
                    rank,
                    epoch,
                    train_accuracy = train_acc,
                    loss = train_loss,
                    test_accuracy = test_acc,
                    "Rank: {rank}, Epoch: {epoch}, train accuracy: {train_acc}, loss: {train_loss}, test accuracy: {test_acc}"
                );
            }
        }

        if let Some(streamer) = &mut self.streamer {
            // Terminal flush: one more zero-flag round so any activation still
            // in flight between stages is drained before teardown.
            streamer.forward(self.model.modules_mut(), None);
            streamer.backward(self.model.modules_mut(), None);
        }

        self.model
    }

    fn train_batch(&mut self, x: &Mat, target: &Mat) {
        match self.config.parallelism_mode {
            ParallelismMode::Data => {
                let dp = self.dp_sync.as_ref().expect("data parallelism requires DataParallelSync");
                run_data_parallel_batch(&mut self.model, dp, x, target);
            }
            ParallelismMode::Pipeline => {
                let streamer = self.streamer.as_mut().expect("pipeline parallelism requires PipelineStreamer");
                let is_tail = self.group.identity().is_tail();
                run_pipeline_batch(&mut self.model, streamer, self.group.rank() == 0, is_tail, x, target);
            }
            ParallelismMode::Tensor => {
                run_tensor_batch(&mut self.model, x, target);
            }
        }
    }

    fn evaluate(&mut self, features: &Mat, labels: &Mat) -> (f32, f32) {
        let target = one_hot(labels, self.class_count);
        let prediction = match self.config.parallelism_mode {
            ParallelismMode::Pipeline => {
                let streamer = self.streamer.as_mut().expect("pipeline parallelism requires PipelineStreamer");
                let local_batch = if self.group.rank() == 0 { Some(features) } else { None };
                streamer.forward(self.model.modules_mut(), local_batch).activation
            }
            ParallelismMode::Data | ParallelismMode::Tensor => self.model.forward(features),
        };
        if prediction.rows() == 0 {
            return (0.0, 0.0);
        }
        let loss = Mse::loss(&prediction, &target);
        let acc = accuracy(&prediction, &target);
        (acc, loss)
    }
}

fn run_data_parallel_batch(model: &mut DistributedModel, dp: &DataParallelSync, x: &Mat, target: &Mat) -> Mat {
    let trainable = model.trainable_layers().to_vec();

    let pull_layers: Vec<(usize, LayerBuffer)> = trainable
        .iter()
        .map(|&(pos, global)| {
            let (weight, _, bias) = model.flat_weight_bias(pos);
            (global, LayerBuffer::new(weight, bias))
        })
        .collect();
    dp.pull_parameters(pull_layers.clone());
    for (&(pos, _), (_, buf)) in trainable.iter().zip(pull_layers.iter()) {
        let (_, shape, _) = model.flat_weight_bias(pos);
        let weight = buf.weight.lock().unwrap().clone();
        let bias = buf.bias.lock().unwrap().clone();
        model.set_flat_weight_bias(pos, weight, shape, bias);
    }

    let prediction = model.forward(x);
    let loss_grad = Mse::grad(&prediction, target);

    let befores: Vec<(usize, usize, Vec<f32>, (usize, usize), Vec<f32>)> = trainable
        .iter()
        .map(|&(pos, global)| {
            let (w, s, b) = model.flat_weight_bias(pos);
            (pos, global, w, s, b)
        })
        .collect();

    model.backward(&loss_grad);

    for (pos, global, before_weight, shape, before_bias) in befores.into_iter().rev() {
        let (after_weight, _, after_bias) = model.flat_weight_bias(pos);
        let buf = LayerBuffer::new(after_weight, after_bias);
        dp.push_gradient(global, buf.clone(), before_weight, before_bias);
        let weight = buf.weight.lock().unwrap().clone();
        let bias = buf.bias.lock().unwrap().clone();
        model.set_flat_weight_bias(pos, weight, shape, bias);
    }

    prediction
}

fn run_pipeline_batch(
    model: &mut DistributedModel,
    streamer: &mut PipelineStreamer,
    is_root: bool,
    is_tail: bool,
    x: &Mat,
    target: &Mat,
) -> Option<Mat> {
    let local_batch = if is_root { Some(x) } else { None };
    let fwd = streamer.forward(model.modules_mut(), local_batch);

    let tail_grad = if is_tail && fwd.flag {
        Some(Mse::grad(&fwd.activation, target))
    } else {
        None
    };
    streamer.backward(model.modules_mut(), tail_grad);

    if is_tail && fwd.flag {
        Some(fwd.activation)
    } else {
        None
    }
}

fn run_tensor_batch(model: &mut DistributedModel, x: &Mat, target: &Mat) -> Mat {
    let prediction = model.forward(x);
    let grad = Mse::grad(&prediction, target);
    model.backward(&grad);
    prediction
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use peertrain_core::{LayerShape, ParameterStore, TrainMode};
    use peertrain_transport::{Collectives, SimTransport};
    use std::path::PathBuf;
    use std::thread;

    fn config(mode: ParallelismMode) -> RunConfig {
        RunConfig {
            layer_shape: vec![2, 4, 2],
            epochs: 2,
            batch_size: 2,
            learning_rate: 0.05,
            log_step: 1,
            parallelism_mode: mode,
            train_mode: TrainMode::Sync,
            data_dir: PathBuf::from("data"),
        }
    }

    fn toy_dataset() -> (Mat, Mat, Mat, Mat) {
        let features = Mat::from_rows(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![0.0, 1.0], vec![1.0, 0.0]]);
        let labels = Mat::from_rows(vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]]);
        (features.clone(), labels.clone(), features, labels)
    }

    #[test]
    fn data_parallel_run_completes_and_syncs_root() {
        let transports = SimTransport::group(2);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let transport: Arc<dyn Collectives> = Arc::new(t);
                    let group = Arc::new(ProcessGroupState::new(transport, TrainStatus::FINISH));
                    let cfg = config(ParallelismMode::Data);
                    let shape = LayerShape::new(cfg.layer_shape.clone());
                    let store = ParameterStore::init_full(&shape, 7);
                    let model = DistributedModel::build(&shape, &store);
                    let (train_f, train_l, test_f, test_l) = toy_dataset();
                    let loop_ = TrainingLoop::new(group, cfg, model, train_f, train_l, test_f, test_l);
                    loop_.run();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn tensor_mode_run_completes_without_any_collective_sync() {
        let transports = SimTransport::group(2);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let transport: Arc<dyn Collectives> = Arc::new(t);
                    let group = Arc::new(ProcessGroupState::new(transport, TrainStatus::FINISH));
                    let cfg = config(ParallelismMode::Tensor);
                    let shape = LayerShape::new(cfg.layer_shape.clone());
                    let store = ParameterStore::init_full(&shape, 3);
                    let model = DistributedModel::build(&shape, &store);
                    let (train_f, train_l, test_f, test_l) = toy_dataset();
                    let loop_ = TrainingLoop::new(group, cfg, model, train_f, train_l, test_f, test_l);
                    loop_.run();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn pipeline_run_completes_across_stages() {
        let transports = SimTransport::group(2);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let rank = t.rank();
                    let transport: Arc<dyn Collectives> = Arc::new(t);
                    let group = Arc::new(ProcessGroupState::new(transport, TrainStatus::FINISH));
                    let cfg = config(ParallelismMode::Pipeline);
                    let shape = LayerShape::new(cfg.layer_shape.clone());
                    let assignment = peertrain_core::LayerAssignment::for_rank(&shape, group.size(), rank);
                    let store = ParameterStore::init_assigned(&shape, assignment, 11);
                    let model = DistributedModel::build(&shape, &store);
                    let (train_f, train_l, test_f, test_l) = toy_dataset();
                    let loop_ = TrainingLoop::new(group, cfg, model, train_f, train_l, test_f, test_l);
                    loop_.run();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}

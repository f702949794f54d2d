use std::sync::{Arc, Mutex};

use peertrain_core::{ProcessGroupState, TrainMode};
use peertrain_transport::{Collectives, SlotPart, Tag};

use crate::sync_dispatcher::SyncDispatcher;

/// A layer's weight and bias, shared so a queued ASYNC job can still reach
/// them after the caller that submitted the job has moved on to the next
/// batch.
#[derive(Clone)]
pub struct LayerBuffer {
    pub weight: Arc<Mutex<Vec<f32>>>,
    pub bias: Arc<Mutex<Vec<f32>>>,
}

impl LayerBuffer {
    pub fn new(weight: Vec<f32>, bias: Vec<f32>) -> Self {
        Self {
            weight: Arc::new(Mutex::new(weight)),
            bias: Arc::new(Mutex::new(bias)),
        }
    }
}

/// Component F: per-batch data-parallel synchronization. Pulls rank 0's
/// parameters before forward and, for each layer during backward (in reverse
/// layer order), pushes that layer's locally-applied update so rank 0 ends up
/// holding the average of every peer's local gradient step.
pub struct DataParallelSync {
    dispatcher: SyncDispatcher,
    transport: Arc<dyn Collectives>,
}

impl DataParallelSync {
    pub fn new(group: Arc<ProcessGroupState>, mode: TrainMode) -> Self {
        let transport = group.transport().clone();
        Self {
            dispatcher: SyncDispatcher::new(group, mode),
            transport,
        }
    }

    /// Overwrites every listed layer's weight and bias with root's current
    /// values, in ascending layer order.
    pub fn pull_parameters(&self, layers: Vec<(usize, LayerBuffer)>) {
        let transport = self.transport.clone();
        self.dispatcher.run(move || {
            for (layer, buf) in layers {
                let mut weight = buf.weight.lock().unwrap();
                transport.request_pull_f32(&mut weight, Tag::pull_for_layer(layer, SlotPart::Weight));
                drop(weight);
                let mut bias = buf.bias.lock().unwrap();
                transport.request_pull_f32(&mut bias, Tag::pull_for_layer(layer, SlotPart::Bias));
            }
        });
    }

    /// `buf` already holds this peer's post-backward weight/bias; `before_*`
    /// is the snapshot from immediately after the last `pull_parameters`.
    /// Computes this peer's local delta, sums it with every other peer's
    /// delta, and — on root only — rewrites `buf` as `before - average_delta`.
    /// Non-root peers keep their own locally-applied update; it's overwritten
    /// on the next `pull_parameters` regardless.
    pub fn push_gradient(&self, layer: usize, buf: LayerBuffer, before_weight: Vec<f32>, before_bias: Vec<f32>) {
        let transport = self.transport.clone();
        self.dispatcher.run(move || {
            let mut weight_delta: Vec<f32> = {
                let weight = buf.weight.lock().unwrap();
                before_weight.iter().zip(weight.iter()).map(|(b, a)| b - a).collect()
            };
            let mut bias_delta: Vec<f32> = {
                let bias = buf.bias.lock().unwrap();
                before_bias.iter().zip(bias.iter()).map(|(b, a)| b - a).collect()
            };

            transport.collect_push_f32(&mut weight_delta, Tag::push_for_layer(layer, SlotPart::Weight));
            transport.collect_push_f32(&mut bias_delta, Tag::push_for_layer(layer, SlotPart::Bias));

            if transport.is_root() {
                let size = transport.size() as f32;
                let mut weight = buf.weight.lock().unwrap();
                for (w, (b, d)) in weight.iter_mut().zip(before_weight.iter().zip(weight_delta.iter())) {
                    *w = b - d / size;
                }
                let mut bias = buf.bias.lock().unwrap();
                for (b_, (b, d)) in bias.iter_mut().zip(before_bias.iter().zip(bias_delta.iter())) {
                    *b_ = b - d / size;
                }
            }
        });
    }

    pub fn barrier(&self) {
        let transport = self.transport.clone();
        self.dispatcher.run(move || transport.barrier());
    }
}

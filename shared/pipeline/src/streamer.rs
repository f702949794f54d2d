use std::sync::Arc;

use peertrain_core::PeerIdentity;
use peertrain_layers::{Mat, Module};
use peertrain_transport::{Collectives, Tag};

/// Result of a forward step: whether this round carried real work (`flag`)
/// and, if so, this peer's slice output (the activation sent on to the next
/// neighbor, or the tail rank's prediction).
pub struct ForwardResult {
    pub flag: bool,
    pub activation: Mat,
}

/// Result of a backward step: whether this round carried a real gradient and
/// this peer's slice input gradient (sent on to the previous neighbor, or
/// unused at rank 0).
pub struct BackwardResult {
    pub flag: bool,
    pub grad_input: Mat,
}

/// Drives the flag-gated forward/backward exchange described for pipeline
/// parallelism: a flag of 1 authorizes a peer to run its slice and forward
/// work downstream; 0 means "no work this step, just propagate" so in-flight
/// batches can drain at the end of training.
///
/// State machine per rank: IDLE -> (fwd_flag=1) FORWARDING -> READY_FOR_BACKWARD
/// -> (bwd_flag=1) BACKWARDING -> IDLE.
pub struct PipelineStreamer {
    transport: Arc<dyn Collectives>,
    identity: PeerIdentity,
    last_slice_input: Option<Mat>,
    backward_flag: bool,
}

impl PipelineStreamer {
    pub fn new(transport: Arc<dyn Collectives>) -> Self {
        let identity = PeerIdentity::new(transport.rank(), transport.size());
        Self {
            transport,
            identity,
            last_slice_input: None,
            backward_flag: false,
        }
    }

    /// `local_batch` is `Some` on rank 0 when there's a new batch to feed, and
    /// `None` to propagate the terminal flush (flag 0) at the end of training.
    /// Ignored on every other rank, which instead receives the flag and
    /// (if set) the activation from its upstream neighbor.
    pub fn forward(&mut self, slice: &mut [Box<dyn Module>], local_batch: Option<&Mat>) -> ForwardResult {
        let rank = self.identity.rank();
        let size = self.identity.size();

        let (flag, mut activation) = if rank > 0 {
            let flag = self.transport.p2p_recv_i32(rank - 1, Tag::FORWARD_FLAG)[0] == 1;
            if flag {
                let shape = self.transport.p2p_recv_i32(rank - 1, Tag::FORWARD_SHAPE);
                let payload = self.transport.p2p_recv_f32(rank - 1, Tag::FORWARD_PAYLOAD);
                (true, Mat::from_flat(shape[0] as usize, shape[1] as usize, &payload))
            } else {
                (false, Mat::zeros(0, 0))
            }
        } else {
            match local_batch {
                Some(batch) => (true, batch.clone()),
                None => (false, Mat::zeros(0, 0)),
            }
        };

        self.last_slice_input = if flag { Some(activation.clone()) } else { None };

        if flag {
            for layer in slice.iter_mut() {
                activation = layer.forward(&activation);
            }
        }

        if rank < size - 1 {
            self.transport.p2p_send_i32(rank + 1, Tag::FORWARD_FLAG, &[flag as i32]);
            if flag {
                let (rows, cols) = activation.shape();
                self.transport.p2p_send_i32(rank + 1, Tag::FORWARD_SHAPE, &[rows as i32, cols as i32]);
                self.transport.p2p_send_f32(rank + 1, Tag::FORWARD_PAYLOAD, &activation.to_flat());
            }
        }

        if flag && self.identity.is_tail() {
            self.backward_flag = true;
        }

        ForwardResult { flag, activation }
    }

    /// `tail_grad` is the loss gradient, required on the tail rank exactly
    /// when its matching `forward` call set `flag`. Ignored elsewhere, which
    /// instead receives the flag and (if set) the gradient from downstream.
    pub fn backward(&mut self, slice: &mut [Box<dyn Module>], tail_grad: Option<Mat>) -> BackwardResult {
        let rank = self.identity.rank();
        let size = self.identity.size();

        let (flag, mut grad) = if rank < size - 1 {
            let flag = self.transport.p2p_recv_i32(rank + 1, Tag::BACKWARD_FLAG)[0] == 1;
            if flag {
                let shape = self.transport.p2p_recv_i32(rank + 1, Tag::BACKWARD_SHAPE);
                let payload = self.transport.p2p_recv_f32(rank + 1, Tag::BACKWARD_PAYLOAD);
                (true, Mat::from_flat(shape[0] as usize, shape[1] as usize, &payload))
            } else {
                (false, Mat::zeros(0, 0))
            }
        } else {
            match tail_grad {
                Some(g) if self.backward_flag => (true, g),
                _ => (false, Mat::zeros(0, 0)),
            }
        };

        if flag {
            // Re-materialization: activations internal to the slice were not
            // kept past the forward pass, so re-run it from the cached slice
            // input. Each layer's `forward` refreshes the input it caches for
            // its own weight update, which the backward pass below then uses.
            if let Some(slice_input) = self.last_slice_input.clone() {
                let mut act = slice_input;
                for layer in slice.iter_mut() {
                    act = layer.forward(&act);
                }
            }
            for layer in slice.iter_mut().rev() {
                grad = layer.backward(&grad);
            }
        }

        if rank > 0 {
            self.transport.p2p_send_i32(rank - 1, Tag::BACKWARD_FLAG, &[flag as i32]);
            if flag {
                let (rows, cols) = grad.shape();
                self.transport.p2p_send_i32(rank - 1, Tag::BACKWARD_SHAPE, &[rows as i32, cols as i32]);
                self.transport.p2p_send_f32(rank - 1, Tag::BACKWARD_PAYLOAD, &grad.to_flat());
            }
        }

        BackwardResult { flag, grad_input: grad }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use peertrain_layers::{Linear, ReLU};
    use peertrain_transport::SimTransport;
    use std::thread;

    fn linear_slice(fan_in: usize, fan_out: usize) -> Vec<Box<dyn Module>> {
        let weight = Mat::from_rows(vec![vec![1.0; fan_out]; fan_in]);
        vec![
            Box::new(Linear::new(weight, vec![0.0; fan_out], 0.1)) as Box<dyn Module>,
            Box::new(ReLU::new()) as Box<dyn Module>,
        ]
    }

    #[test]
    fn forward_flows_activation_across_three_ranks() {
        let transports = SimTransport::group(3);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let rank = t.rank();
                    let transport: Arc<dyn Collectives> = Arc::new(t);
                    let mut streamer = PipelineStreamer::new(transport);
                    let mut slice = linear_slice(2, 2);
                    let batch = Mat::from_rows(vec![vec![1.0, 1.0]]);
                    let result = streamer.forward(&mut slice, if rank == 0 { Some(&batch) } else { None });
                    (rank, result.flag, result.activation)
                })
            })
            .collect();

        for h in handles {
            let (rank, flag, activation) = h.join().unwrap();
            assert!(flag, "rank {rank} should have seen real work");
            if rank == 2 {
                // two Linear(+ReLU) layers of all-ones weight on [1,1] input: [2,2] then [4,4]
                assert_eq!(activation.as_array().row(0).to_vec(), vec![4.0, 4.0]);
            }
        }
    }

    #[test]
    fn terminal_flush_propagates_zero_flag_without_payload() {
        let transports = SimTransport::group(2);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let rank = t.rank();
                    let transport: Arc<dyn Collectives> = Arc::new(t);
                    let mut streamer = PipelineStreamer::new(transport);
                    let mut slice = linear_slice(2, 2);
                    let result = streamer.forward(&mut slice, if rank == 0 { None } else { None });
                    (rank, result.flag)
                })
            })
            .collect();

        for h in handles {
            let (_rank, flag) = h.join().unwrap();
            assert!(!flag);
        }
    }
}

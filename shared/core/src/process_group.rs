use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use peertrain_transport::Collectives;

use crate::identity::PeerIdentity;
use crate::status::TrainStatus;

/// The shared coordination context the reference implementation keeps as a set
/// of process-wide globals (`globalController`, `globalState`,
/// `globalTrainStatus`, ...). Collapsed here into one value, owned at the
/// program entry point and shared via `Arc` with the background queue rather
/// than reached through hidden statics.
pub struct ProcessGroupState {
    identity: PeerIdentity,
    transport: Arc<dyn Collectives>,
    finish_flag: Mutex<TrainStatus>,
    global_status: Mutex<TrainStatus>,
    done_count: AtomicI32,
}

impl ProcessGroupState {
    /// `finish_flag` is provisional until the training loop knows the batch
    /// count for the loaded dataset; set the real value with
    /// [`Self::set_finish_flag`] before the first batch.
    pub fn new(transport: Arc<dyn Collectives>, finish_flag: TrainStatus) -> Self {
        let identity = PeerIdentity::new(transport.rank(), transport.size());
        Self {
            identity,
            transport,
            finish_flag: Mutex::new(finish_flag),
            global_status: Mutex::new(TrainStatus::new(0, 0)),
            done_count: AtomicI32::new(0),
        }
    }

    pub fn identity(&self) -> PeerIdentity {
        self.identity
    }

    pub fn rank(&self) -> i32 {
        self.identity.rank()
    }

    pub fn size(&self) -> i32 {
        self.identity.size()
    }

    pub fn transport(&self) -> &Arc<dyn Collectives> {
        &self.transport
    }

    pub fn barrier(&self) {
        self.transport.barrier();
    }

    pub fn finish_flag(&self) -> TrainStatus {
        *self.finish_flag.lock().unwrap()
    }

    /// Called once by the training loop before the first batch, per the
    /// latest training-loop variant: `finish_flag = (epochs - 1, batches_per_epoch - 1)`.
    pub fn set_finish_flag(&self, finish_flag: TrainStatus) {
        *self.finish_flag.lock().unwrap() = finish_flag;
    }

    pub fn global_status(&self) -> TrainStatus {
        *self.global_status.lock().unwrap()
    }

    pub fn stamp_status(&self, status: TrainStatus) {
        *self.global_status.lock().unwrap() = status;
    }

    pub fn done_count(&self) -> i32 {
        self.done_count.load(Ordering::SeqCst)
    }

    pub fn set_done_count(&self, value: i32) {
        self.done_count.store(value, Ordering::SeqCst);
    }

    /// Steps 1 and 3-4 of the Sync Dispatcher's termination logic, factored
    /// out so both the inline (SYNC) and queued (ASYNC) paths share it.
    pub fn all_peers_finished(&self) -> bool {
        self.done_count() == self.size() - 1
    }

    pub fn local_done_status(&self) -> i32 {
        if self.global_status() == self.finish_flag() {
            1
        } else {
            0
        }
    }
}

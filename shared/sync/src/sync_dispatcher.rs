use std::sync::Arc;

use peertrain_core::{ProcessGroupState, TrainMode};

use crate::background_queue::BackgroundQueue;

/// Wraps `pull_parameters`, `push_gradients`, and `barrier` with the uniform
/// termination logic every collective-bearing call needs:
///
/// 1. If every other peer already finished, skip the call entirely — nothing
///    should block on a collective that peers who are done won't enter.
/// 2. Run the wrapped operation.
/// 3. Compare the stamped status against the finish flag to get this peer's
///    local done status.
/// 4. Allreduce-sum the done status across the group and store it as the new
///    done count.
///
/// In [`TrainMode::Sync`] all four steps run on the caller's thread. In
/// [`TrainMode::Async`] they're enqueued onto a single-worker
/// [`BackgroundQueue`] and the caller returns immediately; the queue's FIFO
/// ordering bounds how stale the parameters a later batch reads can be.
pub struct SyncDispatcher {
    group: Arc<ProcessGroupState>,
    queue: Option<BackgroundQueue>,
}

impl SyncDispatcher {
    pub fn new(group: Arc<ProcessGroupState>, mode: TrainMode) -> Self {
        let queue = match mode {
            TrainMode::Async => Some(BackgroundQueue::spawn()),
            TrainMode::Sync => None,
        };
        Self { group, queue }
    }

    /// Runs `op` through the four-step termination wrapper, inline or queued
    /// depending on the configured train mode.
    pub fn run(&self, op: impl FnOnce() + Send + 'static) {
        let group = self.group.clone();
        let transport = group.transport().clone();
        let task = move || {
            if group.all_peers_finished() {
                return;
            }
            op();
            let local_done = group.local_done_status();
            let summed = transport.allreduce_sum_i32(&[local_done]);
            group.set_done_count(summed[0]);
        };
        match &self.queue {
            Some(queue) => queue.submit(task),
            None => task(),
        }
    }

    /// Blocks until every job submitted so far has completed. A no-op in SYNC
    /// mode, where `run` already executed inline.
    pub fn drain(&mut self) {
        if let Some(queue) = &mut self.queue {
            queue.shutdown();
            *queue = BackgroundQueue::spawn();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use peertrain_core::TrainStatus;
    use peertrain_transport::{Collectives, SimTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn groups(size: usize) -> Vec<Arc<ProcessGroupState>> {
        SimTransport::group(size)
            .into_iter()
            .map(|t| {
                let transport: Arc<dyn Collectives> = Arc::new(t);
                Arc::new(ProcessGroupState::new(transport, TrainStatus::FINISH))
            })
            .collect()
    }

    #[test]
    fn sync_mode_runs_inline_and_tallies_done_count() {
        let groups = groups(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let ran = ran.clone();
                thread::spawn(move || {
                    let dispatcher = SyncDispatcher::new(group.clone(), TrainMode::Sync);
                    dispatcher.run(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    });
                    group.done_count()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 0); // neither peer stamped the finish flag
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn skips_op_once_all_peers_finished() {
        let group = groups(1).pop().unwrap();
        group.set_done_count(0); // size - 1 == 0, so a lone peer is already "finished"
        let dispatcher = SyncDispatcher::new(group.clone(), TrainMode::Sync);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        dispatcher.run(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn async_mode_defers_but_still_runs() {
        let groups = groups(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let ran = ran.clone();
                thread::spawn(move || {
                    let mut dispatcher = SyncDispatcher::new(group, TrainMode::Async);
                    let r = ran.clone();
                    dispatcher.run(move || {
                        r.fetch_add(1, Ordering::SeqCst);
                    });
                    dispatcher.drain();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}

use mpi::collective::SystemOperation;
use mpi::datatype::Partition;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;
use tracing::debug;

use crate::channel::Tag;
use crate::error::TransportError;

/// Typed wrapper over the underlying collective/point-to-point library.
///
/// Owns three logical communicators duplicated from the same peer set so a
/// background parameter pull can proceed without ordering against a foreground
/// gradient push: `ctrl` carries barriers, broadcasts, scatters and the pipeline's
/// flag/shape/payload exchange; `pull` carries `request_pull`; `push` carries
/// `collect_push`.
pub struct Transport {
    // Held only to keep the MPI runtime alive for the process lifetime.
    _universe: Universe,
    ctrl: SimpleCommunicator,
    pull: SimpleCommunicator,
    push: SimpleCommunicator,
}

// SAFETY: each `Transport` is constructed and used by exactly one OS thread for
// the lifetime of the owning process (one rank per thread/process); it is never
// mutated concurrently from multiple threads even though it is shared via
// `Arc<dyn Collectives>` for ownership convenience.
unsafe impl Send for Transport {}
unsafe impl Sync for Transport {}

impl Transport {
    /// Initializes the collective runtime and duplicates the control communicator
    /// into the pull and push channels. Must be called exactly once per process.
    pub fn init() -> Result<Self, TransportError> {
        let universe = mpi::initialize().ok_or(TransportError::InitFailed)?;
        let ctrl = universe.world();
        let pull = ctrl.duplicate();
        let push = ctrl.duplicate();
        Ok(Self {
            _universe: universe,
            ctrl,
            pull,
            push,
        })
    }

    pub fn rank(&self) -> i32 {
        self.ctrl.rank()
    }

    pub fn size(&self) -> i32 {
        self.ctrl.size()
    }

    pub fn is_root(&self) -> bool {
        self.rank() == 0
    }

    pub fn barrier(&self) {
        debug!(channel = "ctrl", "barrier");
        self.ctrl.barrier();
    }

    pub fn bcast<T: Equivalence>(&self, buf: &mut [T], root: i32) {
        debug!(channel = "ctrl", root, len = buf.len(), "bcast");
        self.ctrl.process_at_rank(root).broadcast_into(buf);
    }

    pub fn bcast_scalar<T: Equivalence + Copy>(&self, value: &mut T, root: i32) {
        self.ctrl.process_at_rank(root).broadcast_into(value);
    }

    /// Scatters a single `i32` count per peer (used by [`Self::scatterv`] to hand
    /// each peer its local element count before the variable-length payload).
    pub fn scatter_count(&self, counts: Option<&[i32]>, root: i32) -> i32 {
        let root_process = self.ctrl.process_at_rank(root);
        let mut recv = 0i32;
        if self.rank() == root {
            let counts = counts.expect("root must supply counts");
            root_process.scatter_into_root(counts, &mut recv);
        } else {
            root_process.scatter_into(&mut recv);
        }
        recv
    }

    /// Scatters a variable-length buffer using per-peer `counts` (root only) and
    /// the `local_count` this peer already learned via [`Self::scatter_count`].
    pub fn scatterv<T>(&self, sendbuf: Option<&[T]>, counts: Option<&[i32]>, local_count: i32, root: i32) -> Vec<T>
    where
        T: Equivalence + Copy + Default,
    {
        let mut recv = vec![T::default(); local_count as usize];
        let root_process = self.ctrl.process_at_rank(root);
        if self.rank() == root {
            let counts = counts.expect("root must supply counts");
            let displs = Self::displacements(counts);
            let partition = Partition::new(sendbuf.expect("root must supply sendbuf"), counts, &displs[..]);
            root_process.scatter_varcount_into_root(&partition, &mut recv[..]);
        } else {
            root_process.scatter_varcount_into(&mut recv[..]);
        }
        recv
    }

    fn displacements(counts: &[i32]) -> Vec<Count> {
        let mut displs = Vec::with_capacity(counts.len());
        let mut running = 0;
        for &c in counts {
            displs.push(running);
            running += c;
        }
        displs
    }

    pub fn reduce_sum<T>(&self, src: &[T], root: i32) -> Option<Vec<T>>
    where
        T: Equivalence + Copy + Default,
    {
        let root_process = self.ctrl.process_at_rank(root);
        if self.rank() == root {
            let mut recv = vec![T::default(); src.len()];
            root_process.reduce_into_root(src, &mut recv[..], SystemOperation::sum());
            Some(recv)
        } else {
            root_process.reduce_into(src, SystemOperation::sum());
            None
        }
    }

    pub fn allreduce_sum<T>(&self, src: &[T]) -> Vec<T>
    where
        T: Equivalence + Copy + Default,
    {
        let mut recv = vec![T::default(); src.len()];
        self.ctrl.all_reduce_into(src, &mut recv[..], SystemOperation::sum());
        recv
    }

    /// Non-root peers send their rank as a 1-int request on `pull` and block
    /// receiving `local.len()` values back from root; root serves one request
    /// per non-root peer, replying with its own current buffer.
    pub fn request_pull<T>(&self, local: &mut [T], tag: Tag)
    where
        T: Equivalence + Copy + Default,
    {
        let rank = self.rank();
        if rank == 0 {
            let snapshot = local.to_vec();
            for _ in 1..self.size() {
                let (requester, status) = self.pull.any_process().receive_with_tag::<i32>(tag.0);
                debug!(channel = "pull", tag = tag.0, from = requester, src = status.source_rank(), "served pull request");
                self.pull
                    .process_at_rank(status.source_rank())
                    .send_with_tag(&snapshot[..], tag.0);
            }
        } else {
            self.pull.process_at_rank(0).send_with_tag(&[rank], tag.0);
            let (buf, _status) = self.pull.process_at_rank(0).receive_vec_with_tag::<T>(tag.0);
            local.copy_from_slice(&buf);
        }
    }

    /// Root receives `size - 1` buffers from `ANY_SOURCE` matching `tag` and sums
    /// them elementwise into `local` (which already holds root's own contribution).
    /// Non-roots send `local` unmodified and the return value is meaningless to them.
    pub fn collect_push<T>(&self, local: &mut [T], tag: Tag)
    where
        T: Equivalence + Copy + std::ops::AddAssign,
    {
        if self.rank() == 0 {
            for _ in 1..self.size() {
                let (incoming, _status) = self.push.any_process().receive_vec_with_tag::<T>(tag.0);
                for (acc, val) in local.iter_mut().zip(incoming.into_iter()) {
                    *acc += val;
                }
            }
        } else {
            self.push.process_at_rank(0).send_with_tag(local, tag.0);
        }
    }

    pub fn p2p_send<T: Equivalence>(&self, to: i32, tag: Tag, buf: &[T]) {
        self.ctrl.process_at_rank(to).send_with_tag(buf, tag.0);
    }

    pub fn p2p_recv_scalar<T: Equivalence + Copy>(&self, from: i32, tag: Tag) -> T {
        let (value, _status) = self.ctrl.process_at_rank(from).receive_with_tag::<T>(tag.0);
        value
    }

    pub fn p2p_recv_vec<T: Equivalence + Copy>(&self, from: i32, tag: Tag) -> Vec<T> {
        let (buf, _status) = self.ctrl.process_at_rank(from).receive_vec_with_tag::<T>(tag.0);
        buf
    }
}

impl crate::collectives::Collectives for Transport {
    fn rank(&self) -> i32 {
        Transport::rank(self)
    }

    fn size(&self) -> i32 {
        Transport::size(self)
    }

    fn barrier(&self) {
        Transport::barrier(self)
    }

    fn bcast_f32(&self, buf: &mut [f32], root: i32) {
        Transport::bcast(self, buf, root)
    }

    fn bcast_i64(&self, buf: &mut [i64], root: i32) {
        Transport::bcast(self, buf, root)
    }

    fn scatter_count(&self, counts: Option<&[i32]>, root: i32) -> i32 {
        Transport::scatter_count(self, counts, root)
    }

    fn scatterv_i64(&self, sendbuf: Option<&[i64]>, counts: Option<&[i32]>, local_count: i32, root: i32) -> Vec<i64> {
        Transport::scatterv(self, sendbuf, counts, local_count, root)
    }

    fn allreduce_sum_i32(&self, src: &[i32]) -> Vec<i32> {
        Transport::allreduce_sum(self, src)
    }

    fn request_pull_f32(&self, local: &mut [f32], tag: Tag) {
        Transport::request_pull(self, local, tag)
    }

    fn collect_push_f32(&self, local: &mut [f32], tag: Tag) {
        Transport::collect_push(self, local, tag)
    }

    fn p2p_send_i32(&self, to: i32, tag: Tag, buf: &[i32]) {
        Transport::p2p_send(self, to, tag, buf)
    }

    fn p2p_recv_i32(&self, from: i32, tag: Tag) -> Vec<i32> {
        Transport::p2p_recv_vec(self, from, tag)
    }

    fn p2p_send_f32(&self, to: i32, tag: Tag, buf: &[f32]) {
        Transport::p2p_send(self, to, tag, buf)
    }

    fn p2p_recv_f32(&self, from: i32, tag: Tag) -> Vec<f32> {
        Transport::p2p_recv_vec(self, from, tag)
    }
}

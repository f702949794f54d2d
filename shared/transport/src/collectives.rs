use crate::channel::Tag;

/// The operations the coordination core needs from a transport: point-to-point
/// send/recv, broadcast, scatter/scatterv, reduce, allreduce, and barrier, plus
/// the pull/push request patterns layered on top of them.
///
/// Implemented by [`crate::Transport`] (real MPI) and by [`crate::sim::SimTransport`]
/// (an in-process, thread-per-peer simulation used by the test suites described in
/// the testable-properties section of the design: it lets multi-peer invariants be
/// exercised by `cargo test` without an external collective launcher).
///
/// Element types are fixed per method rather than generic so the trait stays
/// object-safe-adjacent and easy to simulate; this mirrors the spec's "static
/// dispatch over a small set of element types" rather than a single generic method.
pub trait Collectives: Send + Sync {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    fn barrier(&self);

    fn bcast_f32(&self, buf: &mut [f32], root: i32);
    fn bcast_i64(&self, buf: &mut [i64], root: i32);

    /// Scatters one `i32` count per peer; non-root passes `None` for `counts`.
    fn scatter_count(&self, counts: Option<&[i32]>, root: i32) -> i32;

    /// Scatters a variable-length `i64` buffer; non-root passes `None` for both
    /// `sendbuf` and `counts`, and must already know `local_count` (from
    /// [`Self::scatter_count`]).
    fn scatterv_i64(&self, sendbuf: Option<&[i64]>, counts: Option<&[i32]>, local_count: i32, root: i32) -> Vec<i64>;

    fn allreduce_sum_i32(&self, src: &[i32]) -> Vec<i32>;

    /// See the `pull_parameters` contract: non-root peers request and block on
    /// root's current buffer; root serves one request per non-root peer.
    fn request_pull_f32(&self, local: &mut [f32], tag: Tag);

    /// See the `push_gradients` contract: root accumulates `size - 1` peer
    /// buffers by elementwise sum into `local`, which already holds its own.
    fn collect_push_f32(&self, local: &mut [f32], tag: Tag);

    fn p2p_send_i32(&self, to: i32, tag: Tag, buf: &[i32]);
    fn p2p_recv_i32(&self, from: i32, tag: Tag) -> Vec<i32>;
    fn p2p_send_f32(&self, to: i32, tag: Tag, buf: &[f32]);
    fn p2p_recv_f32(&self, from: i32, tag: Tag) -> Vec<f32>;
}

use peertrain_core::ParallelismMode;
use peertrain_transport::Collectives;

/// Component H: decides which `part-*****` file indices this peer loads.
/// Under data parallelism the file list is split `floor(F / size)` each
/// (first `F mod size` peers get one extra) and scattered; under pipeline and
/// tensor parallelism the full index list is broadcast unchanged, since the
/// dataset is identical everywhere and only specific ranks consume it (rank 0
/// feeds input, the tail rank sees labels).
pub struct DataSharding;

impl DataSharding {
    /// Called on every peer; `all_indices` is only meaningful on root (rank 0)
    /// — non-root peers pass an empty slice, since they don't need to have
    /// listed the directory themselves.
    pub fn plan(transport: &dyn Collectives, mode: ParallelismMode, all_indices: &[usize]) -> Vec<usize> {
        match mode {
            ParallelismMode::Data => Self::scatter(transport, all_indices),
            ParallelismMode::Pipeline | ParallelismMode::Tensor => Self::broadcast(transport, all_indices),
        }
    }

    fn scatter(transport: &dyn Collectives, all_indices: &[usize]) -> Vec<usize> {
        let size = transport.size() as usize;
        let root = 0;

        let counts = if transport.is_root() {
            let total = all_indices.len();
            let base = total / size;
            let remainder = total % size;
            Some((0..size).map(|rank| (base + if rank < remainder { 1 } else { 0 }) as i32).collect::<Vec<_>>())
        } else {
            None
        };

        let local_count = transport.scatter_count(counts.as_deref(), root);

        let sendbuf = if transport.is_root() {
            Some(all_indices.iter().map(|&i| i as i64).collect::<Vec<_>>())
        } else {
            None
        };

        transport
            .scatterv_i64(sendbuf.as_deref(), counts.as_deref(), local_count, root)
            .into_iter()
            .map(|i| i as usize)
            .collect()
    }

    fn broadcast(transport: &dyn Collectives, all_indices: &[usize]) -> Vec<usize> {
        let root = 0;
        let mut len_buf = [all_indices.len() as i64];
        transport.bcast_i64(&mut len_buf, root);
        let len = len_buf[0] as usize;

        let mut buf: Vec<i64> = if transport.is_root() {
            all_indices.iter().map(|&i| i as i64).collect()
        } else {
            vec![0; len]
        };
        transport.bcast_i64(&mut buf, root);
        buf.into_iter().map(|i| i as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use peertrain_transport::SimTransport;
    use std::thread;

    #[test]
    fn scatter_distributes_remainder_to_first_peers() {
        let transports = SimTransport::group(3);
        let all: Vec<usize> = (0..7).collect();
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                let all = all.clone();
                thread::spawn(move || {
                    let indices = if t.rank() == 0 { all } else { Vec::new() };
                    DataSharding::plan(&t, ParallelismMode::Data, &indices)
                })
            })
            .collect();
        let shards: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(shards[0].len(), 3);
        assert_eq!(shards[1].len(), 2);
        assert_eq!(shards[2].len(), 2);
        let mut combined: Vec<usize> = shards.into_iter().flatten().collect();
        combined.sort_unstable();
        assert_eq!(combined, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn broadcast_gives_every_peer_the_full_list_under_pipeline() {
        let transports = SimTransport::group(3);
        let all: Vec<usize> = vec![0, 1, 2, 3];
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                let all = all.clone();
                thread::spawn(move || {
                    let indices = if t.rank() == 0 { all } else { Vec::new() };
                    DataSharding::plan(&t, ParallelismMode::Pipeline, &indices)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![0, 1, 2, 3]);
        }
    }
}

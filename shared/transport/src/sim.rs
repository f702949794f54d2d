//! An in-process, thread-per-peer transport used by test suites across the
//! workspace. It implements the same [`Collectives`] contract as the real MPI
//! transport so multi-peer properties (parameter identity, gradient averaging,
//! termination liveness, ...) can be exercised by `cargo test` alone.

use std::cell::RefCell;
use std::sync::{Arc, Barrier, Mutex};

use crate::channel::Tag;
use crate::collectives::Collectives;

#[derive(Clone, Debug)]
enum Payload {
    Unit,
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
}

impl Payload {
    fn into_i32(self) -> Vec<i32> {
        match self {
            Payload::I32(v) => v,
            _ => panic!("sim transport: payload type mismatch, expected i32"),
        }
    }

    fn into_i64(self) -> Vec<i64> {
        match self {
            Payload::I64(v) => v,
            _ => panic!("sim transport: payload type mismatch, expected i64"),
        }
    }

    fn into_f32(self) -> Vec<f32> {
        match self {
            Payload::F32(v) => v,
            _ => panic!("sim transport: payload type mismatch, expected f32"),
        }
    }
}

/// Shared rendezvous point for the symmetric collectives (every peer calls these
/// in the same program order): each peer writes into its slot, all peers wait,
/// then every peer reads the full slot set before the round is cleared for reuse.
struct CollectiveHub {
    size: usize,
    entry: Barrier,
    exit: Barrier,
    slots: Mutex<Vec<Option<Payload>>>,
}

impl CollectiveHub {
    fn new(size: usize) -> Self {
        Self {
            size,
            entry: Barrier::new(size),
            exit: Barrier::new(size),
            slots: Mutex::new(vec![None; size]),
        }
    }

    fn exchange(&self, rank: usize, payload: Payload) -> Vec<Payload> {
        {
            let mut slots = self.slots.lock().unwrap();
            slots[rank] = Some(payload);
        }
        self.entry.wait();
        let result = {
            let slots = self.slots.lock().unwrap();
            slots.iter().map(|s| s.clone().unwrap()).collect::<Vec<_>>()
        };
        self.exit.wait();
        if rank == 0 {
            let mut slots = self.slots.lock().unwrap();
            for slot in slots.iter_mut().take(self.size) {
                *slot = None;
            }
        }
        result
    }
}

struct Msg {
    tag: i32,
    payload: Payload,
}

/// A single peer's mailbox: a channel other peers send into, plus a holding area
/// for messages received out of the tag order a caller asked for.
struct Mailbox {
    rx: flume::Receiver<Msg>,
    pending: RefCell<Vec<Msg>>,
}

impl Mailbox {
    fn recv_tag(&self, tag: Tag) -> Payload {
        {
            let mut pending = self.pending.borrow_mut();
            if let Some(pos) = pending.iter().position(|m| m.tag == tag.0) {
                return pending.remove(pos).payload;
            }
        }
        loop {
            let msg = self.rx.recv().expect("sim transport: sender dropped");
            if msg.tag == tag.0 {
                return msg.payload;
            }
            self.pending.borrow_mut().push(msg);
        }
    }
}

struct Shared {
    senders: Vec<flume::Sender<Msg>>,
    pull_senders: Vec<flume::Sender<Msg>>,
    push_senders: Vec<flume::Sender<Msg>>,
    collective: CollectiveHub,
}

/// One peer's handle into the simulated process group. Build a full group with
/// [`SimTransport::group`] and hand one instance to each simulated-peer thread.
pub struct SimTransport {
    rank: i32,
    size: i32,
    shared: Arc<Shared>,
    ctrl_inbox: Mailbox,
    pull_inbox: Mailbox,
    push_inbox: Mailbox,
}

// SAFETY: each `SimTransport` is moved into exactly one dedicated simulated-peer
// thread (see `SimTransport::group` callers) and its `RefCell` mailboxes are
// never accessed concurrently from more than that one thread, even though the
// type is shared via `Arc<dyn Collectives>` for ownership convenience.
unsafe impl Send for SimTransport {}
unsafe impl Sync for SimTransport {}

impl SimTransport {
    /// Builds `size` linked transports, one per simulated rank, ready to be moved
    /// into `size` OS threads.
    pub fn group(size: usize) -> Vec<SimTransport> {
        let mut senders = Vec::with_capacity(size);
        let mut pull_senders = Vec::with_capacity(size);
        let mut push_senders = Vec::with_capacity(size);
        let mut ctrl_rx = Vec::with_capacity(size);
        let mut pull_rx = Vec::with_capacity(size);
        let mut push_rx = Vec::with_capacity(size);

        for _ in 0..size {
            let (tx, rx) = flume::unbounded();
            senders.push(tx);
            ctrl_rx.push(rx);
            let (tx, rx) = flume::unbounded();
            pull_senders.push(tx);
            pull_rx.push(rx);
            let (tx, rx) = flume::unbounded();
            push_senders.push(tx);
            push_rx.push(rx);
        }

        let shared = Arc::new(Shared {
            senders,
            pull_senders,
            push_senders,
            collective: CollectiveHub::new(size),
        });

        (0..size)
            .map(|rank| SimTransport {
                rank: rank as i32,
                size: size as i32,
                shared: shared.clone(),
                ctrl_inbox: Mailbox {
                    rx: ctrl_rx[rank].clone(),
                    pending: RefCell::new(Vec::new()),
                },
                pull_inbox: Mailbox {
                    rx: pull_rx[rank].clone(),
                    pending: RefCell::new(Vec::new()),
                },
                push_inbox: Mailbox {
                    rx: push_rx[rank].clone(),
                    pending: RefCell::new(Vec::new()),
                },
            })
            .collect()
    }
}

impl Collectives for SimTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn barrier(&self) {
        self.shared.collective.exchange(self.rank as usize, Payload::Unit);
    }

    fn bcast_f32(&self, buf: &mut [f32], root: i32) {
        let mine = if self.rank == root { Payload::F32(buf.to_vec()) } else { Payload::Unit };
        let all = self.shared.collective.exchange(self.rank as usize, mine);
        let broadcast = all[root as usize].clone().into_f32();
        buf.copy_from_slice(&broadcast);
    }

    fn bcast_i64(&self, buf: &mut [i64], root: i32) {
        let mine = if self.rank == root { Payload::I64(buf.to_vec()) } else { Payload::Unit };
        let all = self.shared.collective.exchange(self.rank as usize, mine);
        let broadcast = all[root as usize].clone().into_i64();
        buf.copy_from_slice(&broadcast);
    }

    fn scatter_count(&self, counts: Option<&[i32]>, root: i32) -> i32 {
        let mine = if self.rank == root {
            Payload::I32(counts.expect("root must supply counts").to_vec())
        } else {
            Payload::Unit
        };
        let all = self.shared.collective.exchange(self.rank as usize, mine);
        let counts = all[root as usize].clone().into_i32();
        counts[self.rank as usize]
    }

    fn scatterv_i64(&self, sendbuf: Option<&[i64]>, counts: Option<&[i32]>, local_count: i32, root: i32) -> Vec<i64> {
        let mine = if self.rank == root {
            let mut bundle = counts.expect("root must supply counts").iter().map(|&c| c as i64).collect::<Vec<_>>();
            bundle.extend(sendbuf.expect("root must supply sendbuf").iter().copied());
            Payload::I64(bundle)
        } else {
            Payload::Unit
        };
        let all = self.shared.collective.exchange(self.rank as usize, mine);
        let bundle = all[root as usize].clone().into_i64();
        let counts: Vec<i64> = bundle[..self.size as usize].to_vec();
        let data = &bundle[self.size as usize..];
        let offset: usize = counts[..self.rank as usize].iter().map(|&c| c as usize).sum();
        data[offset..offset + local_count as usize].to_vec()
    }

    fn allreduce_sum_i32(&self, src: &[i32]) -> Vec<i32> {
        let all = self.shared.collective.exchange(self.rank as usize, Payload::I32(src.to_vec()));
        let mut sum = vec![0i32; src.len()];
        for payload in all {
            for (acc, v) in sum.iter_mut().zip(payload.into_i32()) {
                *acc += v;
            }
        }
        sum
    }

    fn request_pull_f32(&self, local: &mut [f32], tag: Tag) {
        if self.rank == 0 {
            for _ in 1..self.size {
                let requester = self.pull_inbox.recv_tag(tag).into_i32()[0];
                self.shared.pull_senders[requester as usize]
                    .send(Msg {
                        tag: tag.0,
                        payload: Payload::F32(local.to_vec()),
                    })
                    .expect("sim transport: peer thread gone");
            }
        } else {
            self.shared.pull_senders[0]
                .send(Msg {
                    tag: tag.0,
                    payload: Payload::I32(vec![self.rank]),
                })
                .expect("sim transport: root thread gone");
            let reply = self.pull_inbox.recv_tag(tag).into_f32();
            local.copy_from_slice(&reply);
        }
    }

    fn collect_push_f32(&self, local: &mut [f32], tag: Tag) {
        if self.rank == 0 {
            for _ in 1..self.size {
                let incoming = self.push_inbox.recv_tag(tag).into_f32();
                for (acc, v) in local.iter_mut().zip(incoming) {
                    *acc += v;
                }
            }
        } else {
            self.shared.push_senders[0]
                .send(Msg {
                    tag: tag.0,
                    payload: Payload::F32(local.to_vec()),
                })
                .expect("sim transport: root thread gone");
        }
    }

    fn p2p_send_i32(&self, to: i32, tag: Tag, buf: &[i32]) {
        self.shared.senders[to as usize]
            .send(Msg {
                tag: tag.0,
                payload: Payload::I32(buf.to_vec()),
            })
            .expect("sim transport: peer thread gone");
    }

    fn p2p_recv_i32(&self, _from: i32, tag: Tag) -> Vec<i32> {
        self.ctrl_inbox.recv_tag(tag).into_i32()
    }

    fn p2p_send_f32(&self, to: i32, tag: Tag, buf: &[f32]) {
        self.shared.senders[to as usize]
            .send(Msg {
                tag: tag.0,
                payload: Payload::F32(buf.to_vec()),
            })
            .expect("sim transport: peer thread gone");
    }

    fn p2p_recv_f32(&self, _from: i32, tag: Tag) -> Vec<f32> {
        self.ctrl_inbox.recv_tag(tag).into_f32()
    }
}

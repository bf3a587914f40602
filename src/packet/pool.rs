//! Fixed-size packet pools. A pool is sized once at construction (`num_bufs`
//! / `num_pcls` slots) and never grows; allocation blocks or times out when
//! the pool is exhausted rather than falling back to the heap, matching the
//! fixed-pool contract in the spec: "allocations from a fixed pool; blocking
//! variant suspends caller until a cell is available; timed variant returns
//! absence on timeout."

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::pcl::PclChain;
use super::Packet;
use crate::config::StackLimits;

struct Inner<T> {
    free: Vec<T>,
    outstanding: usize,
    capacity: usize,
}

/// A pool of reusable storage objects of type `T`. Holds at most `capacity`
/// objects live at once (free + outstanding); allocation beyond that blocks
/// or times out rather than allocating fresh storage.
struct Pool<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> Pool<T> {
    fn new(capacity: usize, seed: impl Fn() -> T) -> Self {
        let free = (0..capacity).map(|_| seed()).collect();
        Self {
            inner: Mutex::new(Inner {
                free,
                outstanding: 0,
                capacity,
            }),
            cond: Condvar::new(),
        }
    }

    fn alloc_blocking(&self) -> T {
        let mut guard = self.inner.lock();
        loop {
            if let Some(item) = guard.free.pop() {
                guard.outstanding += 1;
                return item;
            }
            self.cond.wait(&mut guard);
        }
    }

    fn alloc_timed(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.inner.lock();
        if let Some(item) = guard.free.pop() {
            guard.outstanding += 1;
            return Some(item);
        }
        if timeout.is_zero() {
            return None;
        }
        let timed_out = self.cond.wait_for(&mut guard, timeout).timed_out();
        if timed_out {
            return None;
        }
        guard.free.pop().map(|item| {
            guard.outstanding += 1;
            item
        })
    }

    fn free(&self, item: T) {
        let mut guard = self.inner.lock();
        guard.outstanding -= 1;
        guard.free.push(item);
        self.cond.notify_one();
    }

    fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

/// Owns both packet pools (one for `Buf` storage, one for `Pcl` chains) and
/// hands out fully-formed [`Packet`]s with freshly zeroed metadata.
pub struct PacketPool {
    bufs: Pool<Vec<u8>>,
    pcls: Pool<PclChain>,
    buf_size: usize,
    pcl_cell_size: usize,
}

impl PacketPool {
    pub fn new(limits: &StackLimits) -> Self {
        let buf_size = limits.buf_size;
        let pcl_cell_size = limits.pcl_cell_size;
        let num_pcls = limits.num_pcls;
        Self {
            bufs: Pool::new(limits.num_bufs, move || vec![0u8; buf_size]),
            pcls: Pool::new(1, move || PclChain::new(pcl_cell_size, num_pcls)),
            buf_size,
            pcl_cell_size,
        }
    }

    pub fn alloc_buf_blocking(&self) -> Packet {
        let storage = self.bufs.alloc_blocking();
        Packet::new_buf_from(storage)
    }

    pub fn alloc_buf_timed(&self, timeout: Duration) -> Option<Packet> {
        self.bufs
            .alloc_timed(timeout)
            .map(Packet::new_buf_from)
    }

    pub fn free_buf(&self, packet: Packet) {
        if let super::PacketBody::Buf(mut storage) = packet.body {
            storage.iter_mut().for_each(|b| *b = 0);
            self.bufs.free(storage);
        }
    }

    pub fn alloc_pcl_blocking(&self) -> Packet {
        let chain = self.pcls.alloc_blocking();
        Packet::new_pcl(chain)
    }

    pub fn alloc_pcl_timed(&self, timeout: Duration) -> Option<Packet> {
        self.pcls.alloc_timed(timeout).map(Packet::new_pcl)
    }

    pub fn free_chain(&self, packet: Packet) {
        if let super::PacketBody::Pcl(chain) = packet.body {
            self.pcls.free(chain);
        }
    }

    pub fn bufs_outstanding(&self) -> usize {
        self.bufs.outstanding()
    }

    pub fn bufs_capacity(&self) -> usize {
        self.bufs.capacity()
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn pcl_cell_size(&self) -> usize {
        self.pcl_cell_size
    }
}

impl Packet {
    fn new_buf_from(storage: Vec<u8>) -> Self {
        Self {
            meta: super::PacketMeta::default(),
            body: super::PacketBody::Buf(storage),
        }
    }
}

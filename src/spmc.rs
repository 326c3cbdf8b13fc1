use crate::sync::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use std::error::Error;
use std::fmt;
use std::fmt::Debug;

/// One ring slot: a seqlock version counter and the payload bytes it guards.
///
/// The version encodes the slot's write state:
///
/// - **even**: the payload is stable, either the zeroed initial state
///   (`version == 0`) or a fully published message.
/// - **odd**: a write is in progress; the payload bytes must not be trusted.
///
/// A slot's version never decreases, and each publication into the slot
/// raises it by exactly 2.
#[repr(C)]
struct Slot<const S: usize> {
    version: AtomicUsize,
    payload: [AtomicU8; S],
}

impl<const S: usize> Slot<S> {
    fn new() -> Self {
        Self {
            version: AtomicUsize::new(0),
            payload: std::array::from_fn(|_| AtomicU8::new(0)),
        }
    }

    /// Copies the payload bytes out of the slot.
    ///
    /// The writer may be overwriting these bytes concurrently. Element-wise
    /// relaxed loads keep each byte read an observable operation the compiler
    /// cannot fuse or hoist across the bracketing version loads; the caller
    /// discards the copy unless the slot version is identical on both sides
    /// of it.
    #[inline(always)]
    fn read_payload(&self) -> [u8; S] {
        std::array::from_fn(|i| self.payload[i].load(Ordering::Relaxed))
    }

    /// Writer-side counterpart of [`Slot::read_payload`].
    #[inline(always)]
    fn write_payload(&self, bytes: &[u8; S]) {
        for (cell, byte) in self.payload.iter().zip(bytes) {
            cell.store(*byte, Ordering::Relaxed);
        }
    }
}

impl<const S: usize> Debug for Slot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A fixed-capacity, lock-free, single-producer multi-consumer broadcast
/// ring buffer for messages of `S` bytes across `N` slots.
///
/// The buffer is a plain value with a stable `#[repr(C)]` layout and no heap
/// allocation, so it can live on the stack, in a `Box`, in a `static`, or in
/// a shared-memory mapping (see the `shm` module). A freshly constructed
/// buffer is all zeroes, which doubles as its valid initial state.
///
/// # Roles
///
/// - Exactly one writer at a time, enforced by [`RingBuffer::try_lock`] and
///   the scoped [`WriteGuard`] it returns.
/// - Any number of readers created with [`RingBuffer::reader`]. A single
///   [`SharedReader`] shared by reference makes its threads *cooperate*:
///   every message is claimed by at most one of them. Cloning a reader
///   instead yields an *independent* consumer that observes the stream on
///   its own.
///
/// # No backpressure
///
/// Publication never blocks and never fails. When the ring wraps, the writer
/// overwrites the oldest message; a reader that fell behind detects the
/// overrun on its next [`SharedReader::pop_front`] and resumes at the fresh
/// end of the stream. This is a deliberate freshness-over-completeness
/// trade-off.
///
/// # Hot-field layout
///
/// The write cursor, the global version and the claim flag each sit on their
/// own cache line (`CachePadded`), as do the cursor fields of every reader.
/// Without this, cursor traffic from competing consumers false-shares with
/// the writer's publication path and throughput collapses.
#[repr(C)]
pub struct RingBuffer<const S: usize, const N: usize> {
    /// Slot index the writer publishes into next. Stored only by the writer.
    index: CachePadded<AtomicUsize>,
    /// Global version counter: the per-slot version left behind by the most
    /// recent publication. Seeds the cursor of newly created readers.
    version: CachePadded<AtomicUsize>,
    /// Writer-claim flag backing [`RingBuffer::try_lock`].
    claimed: CachePadded<AtomicBool>,
    slots: [Slot<S>; N],
}

impl<const S: usize, const N: usize> RingBuffer<S, N> {
    /// Creates a zero-initialized ring buffer.
    pub fn new() -> Self {
        assert!(N > 0, "ring buffer must have at least one slot");
        Self {
            index: CachePadded::new(AtomicUsize::new(0)),
            version: CachePadded::new(AtomicUsize::new(0)),
            claimed: CachePadded::new(AtomicBool::new(false)),
            slots: std::array::from_fn(|_| Slot::new()),
        }
    }

    /// Number of slots in the ring.
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Attempts to claim the writer role.
    ///
    /// Succeeds for exactly one caller at a time; the claim is held until
    /// the returned [`WriteGuard`] is dropped. There is no waiting: if the
    /// claim is already taken this returns [`ClaimFailed`] immediately and
    /// has no side effects. Callers wanting blocking semantics layer their
    /// own retry loop on top.
    ///
    /// The acquire ordering on success pairs with the release store in the
    /// previous guard's drop, so a new claimant observes every message the
    /// previous writer published.
    pub fn try_lock(&self) -> Result<WriteGuard<'_, S, N>, ClaimFailed> {
        self.claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ClaimFailed)?;
        Ok(WriteGuard { buffer: self })
    }

    /// Creates a reader attached at the current tail of the stream.
    ///
    /// The cursor is seeded from the buffer's write cursor and global
    /// version, so the reader observes messages published from this point
    /// on rather than replaying whatever the ring still retains. On a
    /// freshly constructed buffer the seed is `(0, 0)`.
    ///
    /// Share the returned value by reference for cooperative consumption,
    /// or [`Clone`] it for an independent view of the stream.
    pub fn reader(&self) -> SharedReader<'_, S, N> {
        SharedReader {
            buffer: self,
            index: CachePadded::new(AtomicUsize::new(self.index.load(Ordering::Acquire))),
            version: CachePadded::new(AtomicUsize::new(self.version.load(Ordering::Acquire))),
        }
    }
}

impl<const S: usize, const N: usize> Default for RingBuffer<S, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const S: usize, const N: usize> Debug for RingBuffer<S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("message_size", &S)
            .field("index", &self.index.load(Ordering::Relaxed))
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("claimed", &self.claimed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Error returned by [`RingBuffer::try_lock`] while another [`WriteGuard`]
/// is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimFailed;

impl fmt::Display for ClaimFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring buffer writer is already claimed")
    }
}

impl Error for ClaimFailed {}

/// Exclusive write handle for a [`RingBuffer`].
///
/// Obtained from [`RingBuffer::try_lock`]; at most one guard exists per
/// buffer at any moment. Dropping the guard releases the claim and makes
/// every publication performed under it visible to the next claimant.
///
/// Because the guard holder is the only thread mutating slot payloads and
/// per-slot versions, publication needs no CAS loop: each step is a plain
/// atomic store at the ordering the protocol requires.
#[derive(Debug)]
pub struct WriteGuard<'a, const S: usize, const N: usize> {
    buffer: &'a RingBuffer<S, N>,
}

impl<const S: usize, const N: usize> WriteGuard<'_, S, N> {
    /// Publishes one message, overwriting the oldest slot when the ring is
    /// full.
    ///
    /// Never blocks and never fails. A reader still parked on the
    /// overwritten slot detects the reuse through the slot's raised version
    /// on its next pop.
    ///
    /// # Protocol
    ///
    /// 1. raise the slot version to odd (write in progress),
    /// 2. push the global version past anything a reader could have already
    ///    observed at this slot,
    /// 3. store the payload bytes,
    /// 4. raise the slot version to even with release ordering (published),
    /// 5. advance the write cursor.
    ///
    /// The odd store precedes the payload store so a concurrent reader that
    /// samples mid-write sees an odd version and rejects the slot. The final
    /// release store pairs with the readers' acquire loads and is what
    /// publishes the payload bytes.
    #[inline(always)]
    pub fn push_back(&mut self, payload: [u8; S]) {
        let buffer = self.buffer;
        let i = buffer.index.load(Ordering::Relaxed);
        let slot = &buffer.slots[i];

        let seq = slot.version.load(Ordering::Relaxed);
        debug_assert_eq!(seq & 1, 0, "slot version must be even between publications");

        slot.version.store(seq + 1, Ordering::Relaxed);
        buffer.version.store(seq + 2, Ordering::Relaxed);

        slot.write_payload(&payload);

        slot.version.store(seq + 2, Ordering::Release);
        buffer.index.store((i + 1) % N, Ordering::Relaxed);
    }
}

impl<const S: usize, const N: usize> Drop for WriteGuard<'_, S, N> {
    fn drop(&mut self) {
        // Release pairs with the acquire CAS in `try_lock`.
        self.buffer.claimed.store(false, Ordering::Release);
    }
}

/// Consumer cursor over a [`RingBuffer`].
///
/// The state is a `(index, version)` pair: `index` is the slot this reader
/// intends to consume next, `version` is the largest per-slot version it has
/// definitively consumed. Both fields are atomic so one `SharedReader` can
/// be shared by reference across threads; such threads cooperate, and each
/// published message is handed to at most one of them.
///
/// [`Clone`] duplicates the cursor instead: the copy is a logically separate
/// consumer that progresses on its own and re-observes messages the original
/// also sees.
pub struct SharedReader<'a, const S: usize, const N: usize> {
    buffer: &'a RingBuffer<S, N>,
    /// Slot index this reader consumes next.
    index: CachePadded<AtomicUsize>,
    /// Largest per-slot version this reader has definitively consumed.
    version: CachePadded<AtomicUsize>,
}

/// Decides whether the slot at `i`, observed with version `seq`, holds a
/// message a reader with consumed-version watermark `ver` may claim.
#[inline(always)]
fn admissible(seq: usize, ver: usize, i: usize) -> bool {
    if seq & 1 == 1 {
        // Write in progress.
        return false;
    }
    if i == 0 && seq == ver {
        // Parked at slot 0 with nothing new: either the fresh `(0, 0)` state
        // or exactly one full lap consumed. Load-bearing on wrap-around; do
        // not fold into the comparison below.
        return false;
    }
    // seq < ver: the slot was not republished since the reader moved past it.
    seq >= ver
}

impl<const S: usize, const N: usize> SharedReader<'_, S, N> {
    /// Attempts to claim and return the next message.
    ///
    /// Returns `None` when there is nothing new for this reader right now:
    /// the stream is drained, the writer is mid-publication on the target
    /// slot, the reader was overrun, or a cooperating thread claimed the
    /// message first. `None` is not sticky; callers poll again at their
    /// discretion.
    ///
    /// # Claim protocol
    ///
    /// The two acquire loads of the slot version bracketing the payload copy
    /// form the seqlock read: a changed version means the writer touched the
    /// slot and the copy is discarded. The CAS on `version` is the
    /// linearization point among cooperating threads, so no two of them
    /// accept the same slot. The CAS on `index` then advances the shared
    /// cursor; losing it means another thread moved first, and the loser
    /// retries at the index it observed since its own claim may still hold
    /// there. Every retry strictly advances the slot index, so the loop is
    /// bounded by the ring capacity for any finite set of cooperating
    /// threads.
    #[inline(always)]
    pub fn pop_front(&self) -> Option<[u8; S]> {
        let mut i = self.index.load(Ordering::Acquire);
        loop {
            let ver = self.version.load(Ordering::Relaxed);
            let slot = &self.buffer.slots[i];

            let seq1 = slot.version.load(Ordering::Acquire);
            if !admissible(seq1, ver, i) {
                return None;
            }

            let payload = slot.read_payload();

            let seq2 = slot.version.load(Ordering::Acquire);
            if seq1 != seq2 {
                // Torn read: the writer touched the slot mid-copy.
                continue;
            }

            if self
                .version
                .compare_exchange(ver, seq2, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
            {
                // A cooperating thread claimed this message first.
                return None;
            }

            match self
                .index
                .compare_exchange(i, (i + 1) % N, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return Some(payload),
                Err(current) => i = current,
            }
        }
    }
}

impl<const S: usize, const N: usize> Clone for SharedReader<'_, S, N> {
    /// Duplicates the cursor. The copy shares nothing with the original
    /// except the buffer and progresses independently from this moment.
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer,
            index: CachePadded::new(AtomicUsize::new(self.index.load(Ordering::Acquire))),
            version: CachePadded::new(AtomicUsize::new(self.version.load(Ordering::Relaxed))),
        }
    }
}

impl<const S: usize, const N: usize> Debug for SharedReader<'_, S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedReader")
            .field("index", &self.index.load(Ordering::Relaxed))
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use loom::thread;

    fn leak<const S: usize, const N: usize>() -> &'static RingBuffer<S, N> {
        Box::leak(Box::new(RingBuffer::new()))
    }

    /// A concurrent pop never observes torn payload bytes: every `Some` is
    /// exactly one of the published messages.
    #[test]
    fn pops_are_never_torn() {
        loom::model(|| {
            let buffer: &'static RingBuffer<2, 2> = leak();
            let reader: &'static SharedReader<'static, 2, 2> =
                Box::leak(Box::new(buffer.reader()));

            let writer = thread::spawn(move || {
                let mut guard = buffer.try_lock().expect("unclaimed buffer");
                guard.push_back([1, 1]);
                guard.push_back([2, 2]);
            });

            let mut seen = Vec::new();
            for _ in 0..2 {
                if let Some(message) = reader.pop_front() {
                    assert!(message == [1, 1] || message == [2, 2]);
                    seen.push(message);
                }
            }
            // Whatever subset arrived, it arrived in publication order.
            if seen.len() == 2 {
                assert_eq!(seen, vec![[1, 1], [2, 2]]);
            }

            writer.join().unwrap();
        });
    }

    /// Two threads sharing one reader state claim a message at most once.
    #[test]
    fn shared_state_claims_at_most_once() {
        loom::model(|| {
            let buffer: &'static RingBuffer<2, 2> = leak();
            let reader: &'static SharedReader<'static, 2, 2> =
                Box::leak(Box::new(buffer.reader()));

            {
                let mut guard = buffer.try_lock().expect("unclaimed buffer");
                guard.push_back([9, 9]);
            }

            let a = thread::spawn(move || reader.pop_front());
            let b = thread::spawn(move || reader.pop_front());

            let results = [a.join().unwrap(), b.join().unwrap()];
            let hits = results.iter().filter(|r| r.is_some()).count();
            assert_eq!(hits, 1, "exactly one cooperating thread claims the message");
            for result in results.into_iter().flatten() {
                assert_eq!(result, [9, 9]);
            }
        });
    }

    /// The claim flag admits one writer at a time.
    #[test]
    fn writer_claim_is_mutually_exclusive() {
        loom::model(|| {
            let buffer: &'static RingBuffer<2, 2> = leak();
            let holders: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));

            let contend = move || {
                if let Ok(mut guard) = buffer.try_lock() {
                    assert_eq!(holders.fetch_add(1, Ordering::AcqRel), 0);
                    guard.push_back([5, 5]);
                    holders.fetch_sub(1, Ordering::AcqRel);
                }
            };

            let a = thread::spawn(contend);
            let b = thread::spawn(contend);
            a.join().unwrap();
            b.join().unwrap();
        });
    }
}

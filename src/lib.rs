//! # SPMC seqlock ring buffer for fixed-size messages
//!
//! A fixed-capacity, lock-free **single-producer / multi-consumer** broadcast
//! ring buffer built on a per-slot seqlock discipline, designed for
//! low-latency pipelines where the newest data matters more than complete
//! delivery.
//!
//! One writer publishes fixed-size messages without ever blocking; any number
//! of readers observe the stream concurrently. Readers sharing one
//! [`SharedReader`] by reference cooperate so that each message is claimed by
//! at most one of them; cloned readers each observe the full stream
//! independently.
//!
//! # Features
//!
//! * **Lock-free** publication and consumption; the only trylock is the
//!   one-time writer claim
//! * **Per-slot seqlock** versioning for torn-read and overwrite detection
//! * **Cooperative consumption**: share one reader state across threads and
//!   each message is delivered at most once
//! * **Cache-friendly** layout (`CachePadded` hot fields)
//! * **Zero allocations**: the buffer is a plain `#[repr(C)]` value, usable
//!   on the stack, in a `static`, or placed in shared memory
//! * Compile-time message size and capacity via const generics
//!
//! # Overrun Behavior
//!
//! The writer never waits for readers. When the ring wraps, the oldest
//! message is overwritten; a reader that fell behind notices the raised slot
//! version on its next pop and resumes at the fresh end of the stream. Use a
//! larger `N` if your consumers need more slack.
//!
//! # Design Overview
//!
//! Each slot carries a version counter next to its payload bytes:
//!
//! ```text
//! version even  =>  payload stable (initial zeroes, or a published message)
//! version odd   =>  write in progress, payload must not be trusted
//! ```
//!
//! Publication brackets the payload store between an odd and an even version
//! store; readers bracket their payload copy between two acquire loads of
//! the same counter and discard the copy on any mismatch. A shared reader
//! then claims the message through a CAS pair on its own `(version, index)`
//! cursor, which is what keeps cooperating consumers from delivering one
//! message twice.
//!
//! # Quick Example
//!
//! ```
//! use seqring::RingBuffer;
//!
//! let buffer = RingBuffer::<8, 256>::new();
//!
//! let mut writer = buffer.try_lock().expect("first claim always succeeds");
//! let reader = buffer.reader();
//!
//! writer.push_back([0, 1, 2, 3, 4, 5, 6, 7]);
//!
//! assert_eq!(reader.pop_front(), Some([0, 1, 2, 3, 4, 5, 6, 7]));
//! assert_eq!(reader.pop_front(), None);
//! ```
//!
//! # Modules
//!
//! - `spmc`: the ring buffer, writer guard and reader state (re-exported
//!   here)
//! - `shm`: placement of a ring buffer in a named POSIX shared-memory
//!   region, for inter-process use (unix only)

mod spmc;
mod sync;

#[cfg(all(unix, not(feature = "loom")))]
pub mod shm;

pub use spmc::{ClaimFailed, RingBuffer, SharedReader, WriteGuard};

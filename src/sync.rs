//! Atomic primitives, switchable between `std` and `loom`.
//!
//! Every atomic in the crate is imported through this module so that the
//! `loom` cargo feature can substitute loom's model-checked types without
//! touching the protocol code itself.

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

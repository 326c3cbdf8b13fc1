//! Placement of a [`RingBuffer`] in POSIX shared memory.
//!
//! A ring buffer is a plain `#[repr(C)]` value whose all-zeroes bit pattern
//! is its valid initial state. `ftruncate` zero-fills a freshly created
//! shared-memory object, so a new region is a ready-to-use buffer with no
//! further initialization, and any process attaching to the same name sees
//! the same buffer. The writer-claim CAS coordinates producers across
//! processes exactly as it does across threads.
//!
//! On Linux the backing objects live under `/dev/shm`.

use crate::RingBuffer;
use std::io;
use std::mem::size_of;
use std::ops::Deref;
use std::ptr::NonNull;

/// A [`RingBuffer`] living in a named POSIX shared-memory region.
///
/// Created with [`ShmRing::open`], which attaches to the named region or
/// creates it if it does not exist yet. The mapping is released when the
/// value is dropped; the named region itself persists until
/// [`ShmRing::unlink`] removes it.
///
/// The buffer is reached through `Deref`, so the usual
/// [`try_lock`](RingBuffer::try_lock) / [`reader`](RingBuffer::reader)
/// surface applies unchanged:
///
/// ```no_run
/// use seqring::shm::ShmRing;
///
/// let ring = ShmRing::<8, 256>::open("/market-data")?;
/// let mut writer = ring.try_lock().expect("no other writer attached");
/// writer.push_back([1, 2, 3, 4, 5, 6, 7, 8]);
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// # Naming
///
/// The region name must follow POSIX shared-memory rules: it **must start
/// with `'/'`** and contain no other `'/'` characters.
#[derive(Debug)]
pub struct ShmRing<const S: usize, const N: usize> {
    ptr: NonNull<RingBuffer<S, N>>,
}

// The mapping is shared memory full of atomics; the value itself carries no
// thread affinity.
unsafe impl<const S: usize, const N: usize> Send for ShmRing<S, N> {}
unsafe impl<const S: usize, const N: usize> Sync for ShmRing<S, N> {}

impl<const S: usize, const N: usize> ShmRing<S, N> {
    /// Creates or attaches to the named shared-memory region.
    ///
    /// The region is sized for exactly one `RingBuffer<S, N>`. Creating a
    /// name that already exists attaches to the existing region, so a writer
    /// process and its reader processes can open the same name in any order.
    ///
    /// All processes attaching to one name must agree on `S` and `N`; the
    /// region carries no header to check them against.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or any OS-level
    /// shared-memory operation fails.
    pub fn open(name: impl AsRef<str>) -> io::Result<Self> {
        let ptr = map_shared_memory(name.as_ref(), size_of::<RingBuffer<S, N>>())?;
        Ok(Self { ptr: ptr.cast() })
    }

    /// Removes the named region from the system.
    ///
    /// Existing mappings stay valid; the name simply stops resolving and the
    /// backing memory is reclaimed once the last mapping is gone.
    pub fn unlink(name: impl AsRef<str>) -> io::Result<()> {
        let name = to_c_name(name.as_ref())?;
        if unsafe { libc::shm_unlink(name.as_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl<const S: usize, const N: usize> Deref for ShmRing<S, N> {
    type Target = RingBuffer<S, N>;

    fn deref(&self) -> &RingBuffer<S, N> {
        // The region is at least size_of::<RingBuffer<S, N>>() bytes,
        // page-aligned, and every field of the buffer is an atomic whose
        // zeroed bit pattern is valid.
        unsafe { self.ptr.as_ref() }
    }
}

impl<const S: usize, const N: usize> Drop for ShmRing<S, N> {
    /// Unmaps the region.
    ///
    /// # Panics
    ///
    /// Panics if unmapping fails. A half-released shared mapping can break
    /// other processes attached to the same region, so this is treated as
    /// unrecoverable.
    fn drop(&mut self) {
        unsafe {
            unmap_shared_memory(self.ptr.cast(), size_of::<RingBuffer<S, N>>())
                .expect("ShmRing::drop failed");
        }
    }
}

fn to_c_name(name: &str) -> io::Result<std::ffi::CString> {
    std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shm name contains NUL"))
}

fn map_shared_memory(name: &str, size: usize) -> io::Result<NonNull<u8>> {
    let name = to_c_name(name)?;
    let addr = unsafe {
        let fd = libc::shm_open(name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        if libc::ftruncate(fd, size as libc::off_t) == -1 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        let addr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );

        if addr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        // The mapping stays valid after the descriptor is closed.
        libc::close(fd);
        addr
    };

    NonNull::new(addr.cast())
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
}

unsafe fn unmap_shared_memory(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
    unsafe {
        if libc::munmap(ptr.as_ptr().cast(), size) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/seqring-test-{tag}-{}", std::process::id())
    }

    #[test]
    fn fresh_region_is_a_valid_empty_buffer() {
        let name = unique_name("fresh");
        let ring = ShmRing::<8, 16>::open(&name).expect("create shm region");

        let reader = ring.reader();
        assert_eq!(reader.pop_front(), None);

        let mut writer = ring.try_lock().expect("claim fresh shm buffer");
        writer.push_back([7; 8]);
        assert_eq!(reader.pop_front(), Some([7; 8]));

        drop(writer);
        drop(ring);
        ShmRing::<8, 16>::unlink(&name).expect("unlink shm region");
    }

    #[test]
    fn reattaching_addresses_the_same_buffer() {
        let name = unique_name("reattach");

        let ring = ShmRing::<8, 16>::open(&name).expect("create shm region");
        let reader = ring.reader();

        // A message published through a second mapping of the same name
        // arrives at the first mapping's reader.
        let other = ShmRing::<8, 16>::open(&name).expect("attach shm region");
        let mut writer = other.try_lock().expect("claim via second mapping");
        writer.push_back([1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(reader.pop_front(), Some([1, 2, 3, 4, 5, 6, 7, 8]));

        drop(writer);
        drop(reader);
        drop(other);
        drop(ring);
        ShmRing::<8, 16>::unlink(&name).expect("unlink shm region");
    }

    #[test]
    fn nul_in_name_is_rejected() {
        let err = ShmRing::<8, 16>::open("/bad\0name").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

//! Huge-page-backed source buffer allocation (§4.1 startup step 5).
//!
//! The original falls back to `posix_memalign` when `MAP_HUGETLB` mmap
//! fails; §4.1 makes huge-page backing **mandatory** instead ("if
//! unavailable, abort — huge-page backing is mandatory for address
//! stability across PGO runs"), so this wrapper has no fallback path.

use std::ptr::NonNull;

use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};

use crate::error::{Error, Result};

/// A private anonymous huge-page-backed region, unmapped on drop.
pub struct HugePageBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for HugePageBuffer {}

impl HugePageBuffer {
    /// Allocate `len` bytes backed by `MAP_HUGETLB`. Fails (does not fall
    /// back to ordinary pages) if the kernel cannot satisfy the request —
    /// e.g. no huge pages reserved via `/proc/sys/vm/nr_hugepages`.
    pub fn allocate(len: usize) -> Result<Self> {
        let flags = MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS | MapFlags::MAP_HUGETLB;
        let ptr = unsafe {
            mmap_anonymous(None, std::num::NonZeroUsize::new(len).ok_or_else(|| {
                Error::Precondition("huge-page allocation length must be nonzero".into())
            })?, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, flags)
        }
        .map_err(|e| {
            Error::Resource(format!(
                "huge-page allocation of {len} bytes failed: {e} (reserve pages via \
                 /proc/sys/vm/nr_hugepages)"
            ))
        })?;

        Ok(HugePageBuffer { ptr: ptr.cast(), len })
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mark the region read-only (§4.1 startup step 7, after the data
    /// chunk has been read in full).
    pub fn mark_read_only(&mut self) -> Result<()> {
        use nix::sys::mman::{mprotect, ProtFlags as Prot};
        unsafe { mprotect(self.ptr.cast(), self.len, Prot::PROT_READ) }
            .map_err(|e| Error::Resource(format!("mprotect(PROT_READ) failed: {e}")))
    }
}

impl Drop for HugePageBuffer {
    fn drop(&mut self) {
        unsafe {
            let _ = nix::sys::mman::munmap(self.ptr.cast(), self.len);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_length_is_rejected() {
        assert!(HugePageBuffer::allocate(0).is_err());
    }
}

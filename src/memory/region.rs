/*!
 * Shared Memory Region
 *
 * Contiguous byte region backing one map. Either an anonymous `MAP_SHARED`
 * mapping owned by this handle (inherited across `fork`) or a foreign region
 * supplied by another allocator, which is never unmapped here.
 */

use crate::core::errors::{RegistryError, RegistryResult};
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Required alignment of a region base (atomic u64 header fields)
pub const REGION_ALIGN: usize = std::mem::align_of::<u64>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    /// Anonymous shared mapping, unmapped on drop
    Mapped,
    /// Caller-owned memory
    Foreign,
}

/// Contiguous region of possibly shared memory
pub struct ShmRegion {
    base: NonNull<u8>,
    len: usize,
    backing: Backing,
}

// SAFETY: the region is plain memory; every structure placed in it
// synchronizes through atomics and its embedded lock.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Map `len` bytes of anonymous shared memory
    pub fn anonymous(len: usize) -> RegistryResult<Self> {
        let length = NonZeroUsize::new(len)
            .ok_or_else(|| RegistryError::InvalidArgument("region length must be non-zero".into()))?;

        // SAFETY: fresh anonymous mapping, no existing memory is aliased
        let ptr = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .map_err(|e| RegistryError::Full(format!("mmap of {} bytes failed: {}", len, e.desc())))?;

        debug!(len, "Mapped anonymous shared region");
        Ok(Self {
            base: ptr.cast::<u8>(),
            len,
            backing: Backing::Mapped,
        })
    }

    /// Wrap memory supplied by another allocator
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for the whole
    /// lifetime of the returned handle, and the memory must not be accessed
    /// non-atomically by anything other than structures placed through it.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> RegistryResult<Self> {
        let base = NonNull::new(ptr)
            .ok_or_else(|| RegistryError::InvalidArgument("region pointer is null".into()))?;
        if (ptr as usize) % REGION_ALIGN != 0 {
            return Err(RegistryError::InvalidArgument(format!(
                "region base {:p} is not {}-byte aligned",
                ptr, REGION_ALIGN
            )));
        }
        Ok(Self {
            base,
            len,
            backing: Backing::Foreign,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this handle unmaps the memory on drop
    pub fn is_owned(&self) -> bool {
        self.backing == Backing::Mapped
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if self.backing != Backing::Mapped {
            return;
        }
        // SAFETY: base/len came from our own mmap_anonymous call
        if let Err(e) = unsafe { munmap(self.base.cast::<c_void>(), self.len) } {
            warn!(error = %e, len = self.len, "Failed to unmap shared region");
        }
    }
}

impl fmt::Debug for ShmRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("backing", &self.backing)
            .finish()
    }
}

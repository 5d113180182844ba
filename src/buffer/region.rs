//! Backing memory for native buffers: one large allocation, heap or mmap,
//! sliced into fixed-size buffers by the pool.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::error::Result;

/// One contiguous backing allocation. Buffers hold an `Arc<Region>` so the
/// memory outlives every view sliced from it; the last drop unmaps.
pub(crate) struct Region {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
}

enum Backing {
    /// Heap allocation, freed on drop.
    Heap,
    /// File-backed mapping; the file is unlinked on drop.
    Mapped { path: PathBuf },
}

// The region hands out disjoint ranges and never reads or writes its own
// memory; all access goes through NativeBuffer views.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate a zero-filled heap region.
    pub(crate) fn heap(len: usize) -> Region {
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        Region {
            // Box allocations are non-null for non-zero lengths.
            ptr: NonNull::new(raw).expect("heap region allocation"),
            len,
            backing: Backing::Heap,
        }
    }

    /// Create a file of `len` bytes at `path` and map it shared.
    pub(crate) fn mapped(path: &Path, len: usize) -> Result<Region> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;

        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            let _ = std::fs::remove_file(path);
            return Err(err.into());
        }
        // The mapping stays valid after the fd closes.
        debug!(path = %path.display(), len, "mapped buffer region");
        Ok(Region {
            ptr: NonNull::new(raw as *mut u8).expect("mmap returned null"),
            len,
            backing: Backing::Mapped {
                path: path.to_path_buf(),
            },
        })
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match &self.backing {
            Backing::Heap => {
                let slice = ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
                drop(unsafe { Box::from_raw(slice) });
            }
            Backing::Mapped { path } => {
                let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
                if rc != 0 {
                    debug!(
                        path = %path.display(),
                        errno = std::io::Error::last_os_error().raw_os_error(),
                        "munmap failed"
                    );
                }
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

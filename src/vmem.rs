//! The executable memory manager (spec §4.5, §5).
//!
//! Suballocates OS-granted executable pages with a first-fit bitmap at
//! page granularity, coalesces on free, and returns an empty region to
//! the OS once it has at least one other non-empty region to fall back
//! on. The dependency stack — `region` for page-size queries, `libc`/
//! `winapi` for the raw OS calls, `lazy_static` for the process-wide
//! default instance — mirrors `wasmtime-runtime`'s own executable-memory
//! plumbing (same job, same crates).
//!
//! Thread-safety (spec §5): every operation here takes the manager's
//! single `Mutex` for the duration of its bookkeeping update, including
//! the OS call, so concurrent `alloc`/`free`/`reset` from different
//! threads stay serialized and consistent.

use crate::error::AsmError;
use lazy_static::lazy_static;
use std::sync::Mutex;

/// Whether an allocation can later be returned with [`VirtualMemory::free`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocType {
    /// Returned to the pool by an explicit `free` call.
    Freeable,
    /// Never freed individually; only released wholesale by `reset`.
    Permanent,
}

/// One OS-level mapping, suballocated at page granularity via a simple
/// "used" bitmap (one bit per page).
struct Region {
    base: *mut u8,
    size_bytes: usize,
    page_size: usize,
    used: Vec<bool>,
    permanent: Vec<bool>,
    live_pages: usize,
}

// SAFETY: `Region` only exposes its raw pointer behind the manager's
// `Mutex`, and the pointer itself refers to OS-owned executable memory
// this process holds for its own lifetime — it is not thread-affine.
unsafe impl Send for Region {}

impl Region {
    fn new(size_bytes: usize, page_size: usize) -> Result<Self, AsmError> {
        let base = os_alloc(size_bytes)?;
        let pages = size_bytes / page_size;
        Ok(Region {
            base,
            size_bytes,
            page_size,
            used: vec![false; pages],
            permanent: vec![false; pages],
            live_pages: 0,
        })
    }

    fn pages_needed(&self, size: usize) -> usize {
        (size + self.page_size - 1) / self.page_size
    }

    /// Finds `count` consecutive free pages, first-fit.
    fn find_free_run(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.used.len() {
            return None;
        }
        let mut run = 0;
        for (i, &used) in self.used.iter().enumerate() {
            if used {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some(i + 1 - count);
            }
        }
        None
    }

    fn try_alloc(&mut self, size: usize, kind: AllocType) -> Option<*mut u8> {
        let pages = self.pages_needed(size);
        let start = self.find_free_run(pages)?;
        for p in start..start + pages {
            self.used[p] = true;
            self.permanent[p] = kind == AllocType::Permanent;
        }
        self.live_pages += pages;
        // SAFETY: `start * page_size` is within `[0, size_bytes)` by
        // construction of `find_free_run`.
        Some(unsafe { self.base.add(start * self.page_size) })
    }

    fn owns(&self, ptr: *mut u8) -> bool {
        let base = self.base as usize;
        let p = ptr as usize;
        p >= base && p < base + self.size_bytes
    }

    /// Frees the allocation starting at `ptr`, given its size in bytes.
    /// No-op if every page in the range is marked permanent.
    fn free(&mut self, ptr: *mut u8, size: usize) {
        let offset = ptr as usize - self.base as usize;
        let start = offset / self.page_size;
        let pages = self.pages_needed(size);
        if (start..start + pages).all(|p| self.permanent[p]) {
            return;
        }
        for p in start..start + pages {
            if !self.permanent[p] {
                self.used[p] = false;
                self.live_pages -= 1;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.live_pages == 0
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `base`/`size_bytes` describe exactly the mapping this
        // `Region` created in `Region::new` and nothing else references
        // it once the manager drops it.
        unsafe {
            os_free(self.base, self.size_bytes);
        }
    }
}

/// A suballocator over executable OS memory. See module docs.
pub struct VirtualMemory {
    inner: Mutex<Inner>,
}

struct Inner {
    regions: Vec<Region>,
    page_size: usize,
    granted_bytes: usize,
    freed_bytes: usize,
}

impl VirtualMemory {
    /// An empty manager; the first call to [`alloc`](Self::alloc)
    /// reserves its first OS region on demand.
    pub fn new() -> Self {
        VirtualMemory {
            inner: Mutex::new(Inner {
                regions: Vec::new(),
                page_size: region::page::size(),
                granted_bytes: 0,
                freed_bytes: 0,
            }),
        }
    }

    /// Returns an aligned, executable-permitted region of at least
    /// `size` bytes.
    pub fn alloc(&self, size: usize, kind: AllocType) -> Result<*mut u8, AsmError> {
        if size == 0 {
            return Err(AsmError::Allocation {
                reason: "cannot allocate zero bytes",
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let page_size = inner.page_size;
        for region in inner.regions.iter_mut() {
            if let Some(ptr) = region.try_alloc(size, kind) {
                inner.granted_bytes += round_up(size, page_size);
                return Ok(ptr);
            }
        }
        // No region had room; reserve a new one sized to comfortably
        // cover this request plus headroom for future small requests.
        let region_size = round_up(size.max(1 << 20), page_size);
        let mut region = Region::new(region_size, page_size)?;
        let ptr = region
            .try_alloc(size, kind)
            .expect("a freshly reserved region must fit its own triggering request");
        inner.granted_bytes += round_up(size, page_size);
        inner.regions.push(region);
        Ok(ptr)
    }

    /// Returns the allocation at `ptr` (of `size` bytes, as passed to
    /// `alloc`) to the pool. Permanent allocations are ignored. A region
    /// that becomes fully empty is returned to the OS as long as at
    /// least one other region remains non-empty.
    pub fn free(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() || size == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let page_size = inner.page_size;
        let idx = inner.regions.iter().position(|r| r.owns(ptr));
        let idx = match idx {
            Some(i) => i,
            None => return,
        };
        inner.regions[idx].free(ptr, size);
        inner.freed_bytes += round_up(size, page_size);
        let other_nonempty = inner
            .regions
            .iter()
            .enumerate()
            .any(|(i, r)| i != idx && !r.is_empty());
        if inner.regions[idx].is_empty() && other_nonempty {
            inner.regions.remove(idx);
        }
    }

    /// Releases every OS reservation this manager holds. Every pointer
    /// previously returned by `alloc` is invalidated. Calling `reset`
    /// twice in a row is a no-op the second time (spec §8 "reset
    /// idempotence").
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.regions.clear();
        inner.granted_bytes = 0;
        inner.freed_bytes = 0;
    }

    /// Bytes granted minus bytes freed, rounded to page granularity
    /// (spec §8 "Memory manager conservation" — this should equal the
    /// sum of currently-live allocation sizes, also page-rounded).
    pub fn outstanding_bytes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.granted_bytes - inner.freed_bytes
    }
}

impl Default for VirtualMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(n: usize, to: usize) -> usize {
    (n + to - 1) / to * to
}

lazy_static! {
    static ref GLOBAL: std::sync::Arc<VirtualMemory> = std::sync::Arc::new(VirtualMemory::new());
}

/// The process-wide default manager, lazily initialized on first use
/// (spec §4.5 "Global memory manager"). Callers needing an isolated
/// sandbox (e.g. cross-process patching) should build their own
/// [`VirtualMemory`] instead.
pub fn global() -> std::sync::Arc<VirtualMemory> {
    GLOBAL.clone()
}

#[cfg(unix)]
fn os_alloc(size: usize) -> Result<*mut u8, AsmError> {
    use libc::{c_void, mmap, MAP_ANON, MAP_PRIVATE, PROT_EXEC, PROT_READ, PROT_WRITE};
    // SAFETY: standard anonymous RWX mapping request; failure is
    // reported via MAP_FAILED, checked below.
    let ptr = unsafe {
        mmap(
            core::ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE | PROT_EXEC,
            MAP_PRIVATE | MAP_ANON,
            -1,
            0,
        )
    };
    if ptr as isize == -1 {
        return Err(AsmError::Allocation { reason: "mmap failed" });
    }
    Ok(ptr as *mut u8)
}

#[cfg(unix)]
unsafe fn os_free(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

#[cfg(windows)]
fn os_alloc(size: usize) -> Result<*mut u8, AsmError> {
    use winapi::um::memoryapi::VirtualAlloc;
    use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE};
    // SAFETY: standard reserve+commit request for a process-local
    // mapping; failure is reported via a null return, checked below.
    let ptr = unsafe {
        VirtualAlloc(
            core::ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        )
    };
    if ptr.is_null() {
        return Err(AsmError::Allocation {
            reason: "VirtualAlloc failed",
        });
    }
    Ok(ptr as *mut u8)
}

#[cfg(windows)]
unsafe fn os_free(ptr: *mut u8, _size: usize) {
    use winapi::um::memoryapi::VirtualFree;
    use winapi::um::winnt::MEM_RELEASE;
    VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trip() {
        let vm = VirtualMemory::new();
        let a = vm.alloc(64, AllocType::Freeable).unwrap();
        assert!(!a.is_null());
        vm.free(a, 64);
    }

    #[test]
    fn permanent_allocations_ignore_free() {
        let vm = VirtualMemory::new();
        let a = vm.alloc(64, AllocType::Permanent).unwrap();
        vm.free(a, 64);
        // A second allocation should not be able to reuse `a`'s page
        // while the permanent allocation still lives there; we can't
        // observe addresses directly, but outstanding_bytes must not
        // have dropped back below what the permanent alloc reserved.
        assert!(vm.outstanding_bytes() > 0);
    }

    #[test]
    fn reset_is_idempotent() {
        let vm = VirtualMemory::new();
        let _ = vm.alloc(64, AllocType::Freeable).unwrap();
        vm.reset();
        vm.reset();
        assert_eq!(vm.outstanding_bytes(), 0);
    }

    #[test]
    fn conservation_after_alloc_and_free() {
        let vm = VirtualMemory::new();
        let a = vm.alloc(4096, AllocType::Freeable).unwrap();
        let before = vm.outstanding_bytes();
        assert!(before >= 4096);
        vm.free(a, 4096);
        assert_eq!(vm.outstanding_bytes(), 0);
    }
}

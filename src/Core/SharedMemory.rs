// Shared memory backends for ring regions.
// The in-process backend is a zeroed heap allocation; the Linux backend maps
// a file under /dev/shm so a second process can attach by name.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::ptr;
use std::ptr::NonNull;
#[cfg(unix)]
use std::os::fd::{AsRawFd, IntoRawFd};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Alignment every region start is guaranteed to have.
pub const REGION_ALIGN: usize = 128;

/// Prefix of the /dev/shm files backing shared ring sets.
pub const SHM_PREFIX: &str = "kring.";

/// A mapped region holding one ring set (control words + slot arenas).
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Process-local address of the first byte of the region.
    fn as_ptr(&self) -> *mut u8;

    /// Size of the mapped region in bytes
    fn size(&self) -> usize;

    fn raw_handle(&self) -> RawHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor (Linux)
    Fd(i32),
    /// Anonymous heap memory, only reachable from this process.
    Heap,
}

/// Region allocated from the process heap, for readers and writers that are
/// threads of the same process.
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn new(size: usize) -> io::Result<Self> {
        let size = (size.max(1) + REGION_ALIGN - 1) & !(REGION_ALIGN - 1);
        let layout = Layout::from_size_align(size, REGION_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // Safety: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {size} byte heap region"),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl SharedMemoryBackend for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}

pub fn shm_path(name: &str) -> String {
    format!("/dev/shm/{SHM_PREFIX}{name}")
}

/// Create (or truncate) a named shared memory region of `size` bytes.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(size, name)?))
}

/// Attach to a region created by another process.
///
/// The whole file is mapped; `min_size` only guards against a truncated file.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(name, min_size)?))
}

/// Remove the backing file. Existing mappings stay valid until dropped.
#[cfg(target_os = "linux")]
pub fn remove_shared_memory(name: &str) -> io::Result<()> {
    match std::fs::remove_file(shm_path(name)) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn remove_shared_memory(_name: &str) -> io::Result<()> {
    Ok(())
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    pub fn create(size: usize, name: &str) -> io::Result<Self> {
        let path = shm_path(name);

        // Create or truncate; truncating to zero first guarantees a zeroed region.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create shared memory file at {}: {}", path, e),
                )
            })?;

        if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Self::map(file.into_raw_fd(), size)
    }

    pub fn attach(name: &str, min_size: usize) -> io::Result<Self> {
        let path = shm_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to open shared memory at {}: {}", path, e),
                )
            })?;

        let file_size = file.metadata()?.len() as usize;
        if file_size < min_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory size too small: expected at least {} bytes, got {}",
                    min_size, file_size
                ),
            ));
        }

        Self::map(file.into_raw_fd(), file_size)
    }

    fn map(fd: i32, size: usize) -> io::Result<Self> {
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        // mmap is page aligned, which covers REGION_ALIGN.
        match NonNull::new(raw as *mut u8) {
            Some(ptr) => Ok(Self { ptr, size, fd }),
            None => {
                unsafe { libc::close(fd) };
                Err(io::Error::new(io::ErrorKind::Other, "mmap returned null"))
            }
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

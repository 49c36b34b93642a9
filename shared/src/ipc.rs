//! Named POSIX semaphores and shared-memory segments
//!
//! Both kinds of kernel object are addressed by a name derived from a numeric
//! key inside a [`Namespace`], so two processes that agree on the namespace
//! and the key open the same object without exchanging anything else.

use log::warn;
use std::ffi::CString;
use std::io;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};

/// Access bits for every segment and semaphore (owner read/write).
pub const PERMISSION: libc::mode_t = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Allocating, opening or mapping a kernel object failed.
    #[error("{what} {name} failed: {source}")]
    Resource {
        what: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
    /// A semaphore operation failed instead of blocking.
    #[error("semaphore {op} on {name} failed: {source}")]
    Protocol {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("unknown game status code {0} in shared segment")]
    CorruptStatus(u32),
    #[error("unknown command code {0} in shared segment")]
    CorruptCommand(u32),
    #[error("invalid namespace {0:?}: must be non-empty and contain no '/'")]
    InvalidNamespace(String),
}

impl IpcError {
    fn resource(what: &'static str, name: &str) -> Self {
        IpcError::Resource {
            what,
            name: name.to_string(),
            source: io::Error::last_os_error(),
        }
    }

    fn protocol(op: &'static str, name: &str, source: io::Error) -> Self {
        IpcError::Protocol {
            op,
            name: name.to_string(),
            source,
        }
    }

    /// True when the object being opened does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IpcError::Resource { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}

/// Prefix under which all kernel object names of one server live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub const DEFAULT: &'static str = "tiles2048";

    pub fn new(prefix: impl Into<String>) -> Result<Self, IpcError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains('/') || prefix.contains('\0') {
            return Err(IpcError::InvalidNamespace(prefix));
        }
        Ok(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segment_name(&self, key: u32) -> String {
        format!("/{}.shm.{}", self.0, key)
    }

    pub fn semaphore_name(&self, key: u32) -> String {
        format!("/{}.sem.{}", self.0, key)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

fn c_name(name: &str) -> Result<CString, IpcError> {
    CString::new(name).map_err(|_| IpcError::InvalidNamespace(name.to_string()))
}

/// A named counting semaphore shared between processes.
pub struct Semaphore {
    name: String,
    raw: NonNull<libc::sem_t>,
}

// The sem_t lives in a kernel-backed mapping and is designed for concurrent use.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Creates the semaphore with an initial count. A leftover object with
    /// the same name (from a crashed earlier run) is unlinked and replaced.
    pub fn create(name: &str, initial: u32) -> Result<Self, IpcError> {
        let c = c_name(name)?;
        let mut raw = Self::open_exclusive(&c, initial);
        if raw.is_none() && io::Error::last_os_error().kind() == io::ErrorKind::AlreadyExists {
            warn!("Removing stale semaphore {}", name);
            unsafe { libc::sem_unlink(c.as_ptr()) };
            raw = Self::open_exclusive(&c, initial);
        }
        match raw {
            Some(raw) => Ok(Self {
                name: name.to_string(),
                raw,
            }),
            None => Err(IpcError::resource("sem_open (create)", name)),
        }
    }

    fn open_exclusive(c: &CString, initial: u32) -> Option<NonNull<libc::sem_t>> {
        let raw = unsafe {
            libc::sem_open(
                c.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                PERMISSION as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if raw == libc::SEM_FAILED {
            None
        } else {
            NonNull::new(raw)
        }
    }

    /// Opens a semaphore some other process created.
    pub fn open(name: &str) -> Result<Self, IpcError> {
        let c = c_name(name)?;
        let raw = unsafe { libc::sem_open(c.as_ptr(), 0) };
        if raw == libc::SEM_FAILED {
            return Err(IpcError::resource("sem_open", name));
        }
        NonNull::new(raw)
            .map(|raw| Self {
                name: name.to_string(),
                raw,
            })
            .ok_or_else(|| IpcError::resource("sem_open", name))
    }

    /// P: blocks while the count is zero, then decrements it. No timeout.
    pub fn wait(&self) -> Result<(), IpcError> {
        loop {
            if unsafe { libc::sem_wait(self.raw.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            // A signal landed on this thread; the signal task decides what happens next.
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(IpcError::protocol("P", &self.name, err));
            }
        }
    }

    /// V: increments the count, waking one waiter.
    pub fn post(&self) -> Result<(), IpcError> {
        if unsafe { libc::sem_post(self.raw.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(IpcError::protocol(
                "V",
                &self.name,
                io::Error::last_os_error(),
            ))
        }
    }

    /// Current count.
    pub fn value(&self) -> Result<i32, IpcError> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.raw.as_ptr(), &mut value) } == 0 {
            Ok(value)
        } else {
            Err(IpcError::protocol(
                "getvalue",
                &self.name,
                io::Error::last_os_error(),
            ))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the name; processes that still hold the semaphore keep using it.
    pub fn unlink(name: &str) -> Result<(), IpcError> {
        let c = c_name(name)?;
        if unsafe { libc::sem_unlink(c.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(IpcError::resource("sem_unlink", name))
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.raw.as_ptr()) };
    }
}

/// Marker for plain `#[repr(C)]` data that may be placed in a shared segment.
///
/// # Safety
/// Implementors must be `#[repr(C)]`, contain no pointers, and be valid when
/// every byte is zero.
pub unsafe trait SharedLayout: Copy {}

/// A shared-memory object mapped into this process and viewed as one `T`.
///
/// Reads and writes go through volatile copies; cross-process ordering comes
/// from the semaphore protocol around each access.
pub struct SharedSegment<T: SharedLayout> {
    name: String,
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

unsafe impl<T: SharedLayout + Send> Send for SharedSegment<T> {}
unsafe impl<T: SharedLayout + Send> Sync for SharedSegment<T> {}

impl<T: SharedLayout> SharedSegment<T> {
    /// Creates, sizes and maps the segment, then stores `initial` in it.
    pub fn create(name: &str, initial: T) -> Result<Self, IpcError> {
        let c = c_name(name)?;
        let flags = libc::O_CREAT | libc::O_EXCL | libc::O_RDWR;
        let mut fd = unsafe { libc::shm_open(c.as_ptr(), flags, PERMISSION) };
        if fd < 0 && io::Error::last_os_error().kind() == io::ErrorKind::AlreadyExists {
            warn!("Removing stale shared memory {}", name);
            unsafe { libc::shm_unlink(c.as_ptr()) };
            fd = unsafe { libc::shm_open(c.as_ptr(), flags, PERMISSION) };
        }
        if fd < 0 {
            return Err(IpcError::resource("shm_open (create)", name));
        }

        if unsafe { libc::ftruncate(fd, size_of::<T>() as libc::off_t) } < 0 {
            let err = IpcError::resource("ftruncate", name);
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c.as_ptr());
            }
            return Err(err);
        }

        let segment = match Self::map(fd, name) {
            Ok(segment) => segment,
            Err(err) => {
                unsafe { libc::shm_unlink(c.as_ptr()) };
                return Err(err);
            }
        };
        segment.write(initial);
        Ok(segment)
    }

    /// Maps an existing segment created by another process.
    pub fn attach(name: &str) -> Result<Self, IpcError> {
        let c = c_name(name)?;
        let fd = unsafe { libc::shm_open(c.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(IpcError::resource("shm_open", name));
        }

        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } < 0 {
            let err = IpcError::resource("fstat", name);
            unsafe { libc::close(fd) };
            return Err(err);
        }
        if (stat.st_size as usize) < size_of::<T>() {
            unsafe { libc::close(fd) };
            return Err(IpcError::Resource {
                what: "shm_open (size check)",
                name: name.to_string(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "segment holds {} bytes, need {}",
                        stat.st_size,
                        size_of::<T>()
                    ),
                ),
            });
        }

        Self::map(fd, name)
    }

    /// Maps `fd` and closes it; the mapping keeps the object alive.
    fn map(fd: libc::c_int, name: &str) -> Result<Self, IpcError> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size_of::<T>(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        let result = if addr == libc::MAP_FAILED {
            Err(IpcError::resource("mmap", name))
        } else {
            NonNull::new(addr.cast::<T>())
                .map(|ptr| Self {
                    name: name.to_string(),
                    ptr,
                    _marker: PhantomData,
                })
                .ok_or_else(|| IpcError::resource("mmap", name))
        };
        unsafe { libc::close(fd) };
        result
    }

    pub fn read(&self) -> T {
        unsafe { ptr::read_volatile(self.ptr.as_ptr()) }
    }

    pub fn write(&self, value: T) {
        unsafe { ptr::write_volatile(self.ptr.as_ptr(), value) }
    }

    /// Read-modify-write of the whole segment.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        let mut value = self.read();
        f(&mut value);
        self.write(value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Removes a segment name; existing mappings stay valid until unmapped.
pub fn unlink_segment(name: &str) -> Result<(), IpcError> {
    let c = c_name(name)?;
    if unsafe { libc::shm_unlink(c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(IpcError::resource("shm_unlink", name))
    }
}

impl<T: SharedLayout> Drop for SharedSegment<T> {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr.as_ptr().cast(), size_of::<T>()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Counter {
        hits: u32,
        misses: u32,
    }

    unsafe impl SharedLayout for Counter {}

    fn test_namespace(tag: &str) -> Namespace {
        Namespace::new(format!("ipc-test-{}-{}", std::process::id(), tag)).unwrap()
    }

    #[test]
    fn test_namespace_names() {
        let ns = Namespace::new("games").unwrap();
        assert_eq!(ns.segment_name(112233), "/games.shm.112233");
        assert_eq!(ns.semaphore_name(4660), "/games.sem.4660");
        assert_eq!(Namespace::default().as_str(), "tiles2048");
    }

    #[test]
    fn test_namespace_rejects_slashes() {
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("a/b").is_err());
    }

    #[test]
    fn test_semaphore_counts() {
        let ns = test_namespace("sem");
        let name = ns.semaphore_name(1);
        let sem = Semaphore::create(&name, 1).unwrap();
        assert_eq!(sem.value().unwrap(), 1);

        let other = Semaphore::open(&name).unwrap();
        other.wait().unwrap();
        assert_eq!(sem.value().unwrap(), 0);
        sem.post().unwrap();
        sem.post().unwrap();
        assert_eq!(other.value().unwrap(), 2);

        Semaphore::unlink(&name).unwrap();
        assert!(Semaphore::open(&name).is_err());
    }

    #[test]
    fn test_segment_shared_between_mappings() {
        let ns = test_namespace("shm");
        let name = ns.segment_name(7);
        let owner = SharedSegment::create(&name, Counter { hits: 3, misses: 0 }).unwrap();
        let peer: SharedSegment<Counter> = SharedSegment::attach(&name).unwrap();

        assert_eq!(peer.read(), Counter { hits: 3, misses: 0 });
        peer.update(|c| c.misses += 1);
        assert_eq!(owner.read().misses, 1);

        unlink_segment(&name).unwrap();
        let err = SharedSegment::<Counter>::attach(&name).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_replaces_stale_objects() {
        let ns = test_namespace("stale");
        let name = ns.semaphore_name(9);
        let first = Semaphore::create(&name, 5).unwrap();
        drop(first);

        let second = Semaphore::create(&name, 0).unwrap();
        assert_eq!(second.value().unwrap(), 0);
        Semaphore::unlink(&name).unwrap();
    }
}

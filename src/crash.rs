//! The crash marker: a POSIX signal handler that records fatal signals to a
//! well-known file, and the start-up replay that turns a found marker into a
//! fatal event.
//!
//! The handler runs inside a signal context where every lock in the process
//! is indeterminate. It therefore touches only a statically prepared path
//! buffer and raw syscalls; the marker is picked up and reported on the next
//! start-up instead.

use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::{Event, Exception, Level, Mechanism, MechanismMeta, PosixSignal};

/// The file name of the crash marker inside the cache directory.
pub(crate) const CRASH_MARKER_FILE: &str = ".sentry-zig-crash";

/// Returns the path of the crash marker for the given cache directory.
pub fn marker_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(CRASH_MARKER_FILE)
}

fn signal_name(signum: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        match signum {
            libc::SIGILL => Some("SIGILL"),
            libc::SIGABRT => Some("SIGABRT"),
            libc::SIGBUS => Some("SIGBUS"),
            libc::SIGFPE => Some("SIGFPE"),
            libc::SIGSEGV => Some("SIGSEGV"),
            _ => None,
        }
    }
    #[cfg(not(unix))]
    {
        match signum {
            4 => Some("SIGILL"),
            6 => Some("SIGABRT"),
            7 => Some("SIGBUS"),
            8 => Some("SIGFPE"),
            11 => Some("SIGSEGV"),
            _ => None,
        }
    }
}

/// Formats `signal:<N>\n` into `buf` without allocating, returning the
/// number of bytes written.
fn format_marker(signum: i32, buf: &mut [u8; 32]) -> usize {
    const PREFIX: &[u8] = b"signal:";
    buf[..PREFIX.len()].copy_from_slice(PREFIX);
    let mut pos = PREFIX.len();

    let mut value = if signum < 0 { 0u32 } else { signum as u32 };
    let mut digits = [0u8; 10];
    let mut count = 0;
    loop {
        digits[count] = b'0' + (value % 10) as u8;
        count += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    while count > 0 {
        count -= 1;
        buf[pos] = digits[count];
        pos += 1;
    }
    buf[pos] = b'\n';
    pos + 1
}

/// Reads, deletes and replays the crash marker.
///
/// Returns a synthesized fatal event when a marker from a previous run was
/// found.
pub fn replay(cache_dir: &Path) -> Option<Event<'static>> {
    let path = marker_path(cache_dir);
    let contents = fs::read_to_string(&path).ok()?;
    let _ = fs::remove_file(&path);

    let signum: i32 = contents.strip_prefix("signal:")?.trim().parse().ok()?;
    let name = signal_name(signum).unwrap_or("UNKNOWN");

    Some(Event {
        level: Level::Fatal,
        exception: vec![Exception {
            ty: "NativeCrash".into(),
            value: Some(format!("Crash: {name} (signal {signum})")),
            mechanism: Some(Mechanism {
                ty: "signalhandler".into(),
                handled: Some(false),
                meta: MechanismMeta {
                    signal: Some(PosixSignal {
                        number: signum,
                        name: Some(name.into()),
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }]
        .into(),
        ..Default::default()
    })
}

#[cfg(unix)]
mod handler {
    use std::cell::UnsafeCell;
    use std::mem;
    use std::path::Path;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use super::format_marker;

    const SIGNALS: [libc::c_int; 5] = [
        libc::SIGSEGV,
        libc::SIGABRT,
        libc::SIGBUS,
        libc::SIGILL,
        libc::SIGFPE,
    ];

    const MARKER_PATH_MAX: usize = 1024;

    /// The marker path, NUL-terminated, prepared before the handlers are
    /// installed. The handler only ever reads it.
    struct MarkerPath {
        buf: UnsafeCell<[u8; MARKER_PATH_MAX]>,
        len: AtomicUsize,
    }

    // Writes happen only under the install mutex while no handler is
    // installed; the signal context only reads.
    unsafe impl Sync for MarkerPath {}

    static MARKER_PATH: MarkerPath = MarkerPath {
        buf: UnsafeCell::new([0; MARKER_PATH_MAX]),
        len: AtomicUsize::new(0),
    };

    struct InstallState {
        refs: usize,
        saved: Vec<(libc::c_int, libc::sigaction)>,
    }

    static INSTALL: Mutex<InstallState> = Mutex::new(InstallState {
        refs: 0,
        saved: Vec::new(),
    });

    /// The actual signal handler.
    ///
    /// Async-signal-safe: no allocation, no locks, no formatting machinery;
    /// only `open`/`write`/`close` on the prepared path, then the default
    /// action is restored and the signal re-raised.
    extern "C" fn crash_signal_handler(signum: libc::c_int) {
        unsafe {
            if MARKER_PATH.len.load(Ordering::Acquire) > 0 {
                let path = MARKER_PATH.buf.get() as *const libc::c_char;
                let fd = libc::open(
                    path,
                    libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                    0o600,
                );
                if fd >= 0 {
                    let mut buf = [0u8; 32];
                    let len = format_marker(signum, &mut buf);
                    libc::write(fd, buf.as_ptr() as *const libc::c_void, len);
                    libc::close(fd);
                }
            }

            libc::signal(signum, libc::SIG_DFL);
            libc::raise(signum);
        }
    }

    /// Installs the crash handlers for the well-known fatal signals.
    ///
    /// Reference-counted and idempotent; returns `false` when the marker
    /// path does not fit the static buffer.
    pub(crate) fn install(cache_dir: &Path) -> bool {
        use std::os::unix::ffi::OsStrExt;

        let mut state = INSTALL.lock().unwrap_or_else(PoisonError::into_inner);
        if state.refs == 0 {
            let path = super::marker_path(cache_dir);
            let bytes = path.as_os_str().as_bytes();
            if bytes.len() + 1 > MARKER_PATH_MAX || bytes.contains(&0) {
                return false;
            }
            unsafe {
                let buf = &mut *MARKER_PATH.buf.get();
                buf[..bytes.len()].copy_from_slice(bytes);
                buf[bytes.len()] = 0;
            }
            MARKER_PATH.len.store(bytes.len(), Ordering::Release);

            for signum in SIGNALS {
                unsafe {
                    let mut new_action: libc::sigaction = mem::zeroed();
                    new_action.sa_sigaction = crash_signal_handler as usize;
                    libc::sigemptyset(&mut new_action.sa_mask);
                    new_action.sa_flags = 0;
                    let mut old_action: libc::sigaction = mem::zeroed();
                    if libc::sigaction(signum, &new_action, &mut old_action) == 0 {
                        state.saved.push((signum, old_action));
                    }
                }
            }
        }
        state.refs += 1;
        true
    }

    /// Drops one install reference, restoring the saved signal actions when
    /// the last reference goes away.
    pub(crate) fn uninstall() {
        let mut state = INSTALL.lock().unwrap_or_else(PoisonError::into_inner);
        if state.refs == 0 {
            return;
        }
        state.refs -= 1;
        if state.refs == 0 {
            for (signum, old_action) in state.saved.drain(..) {
                unsafe {
                    libc::sigaction(signum, &old_action, ptr::null_mut());
                }
            }
            MARKER_PATH.len.store(0, Ordering::Release);
        }
    }
}

#[cfg(unix)]
pub(crate) use handler::{install, uninstall};

#[cfg(not(unix))]
pub(crate) fn install(_cache_dir: &Path) -> bool {
    false
}

#[cfg(not(unix))]
pub(crate) fn uninstall() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crash-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_format_marker() {
        let mut buf = [0u8; 32];
        let len = format_marker(11, &mut buf);
        assert_eq!(&buf[..len], b"signal:11\n");

        let len = format_marker(6, &mut buf);
        assert_eq!(&buf[..len], b"signal:6\n");
    }

    #[test]
    fn test_replay_sigsegv_marker() {
        let dir = temp_cache_dir();
        fs::write(marker_path(&dir), "signal:11\n").unwrap();

        let event = replay(&dir).unwrap();
        assert_eq!(event.level, Level::Fatal);
        let exception = &event.exception[0];
        assert_eq!(exception.ty, "NativeCrash");
        let value = exception.value.as_deref().unwrap();
        assert!(value.contains("SIGSEGV"));
        assert!(value.contains("signal 11"));

        // the marker is gone after the replay
        assert!(!marker_path(&dir).exists());
        assert!(replay(&dir).is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_replay_rejects_garbage() {
        let dir = temp_cache_dir();
        fs::write(marker_path(&dir), "not a marker").unwrap();
        assert!(replay(&dir).is_none());
        // garbage is consumed as well
        assert!(!marker_path(&dir).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_install_refcounting_is_idempotent() {
        let dir = temp_cache_dir();
        assert!(install(&dir));
        assert!(install(&dir));
        uninstall();
        uninstall();
        // a stray uninstall must not underflow
        uninstall();
        assert!(install(&dir));
        uninstall();
        fs::remove_dir_all(&dir).ok();
    }
}

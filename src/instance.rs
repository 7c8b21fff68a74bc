//! Single-instance coordination.
//!
//! The first process to take the system-wide lock becomes the owner and
//! serves the command endpoint. Every later process is a relay: it may
//! forward one command to the owner, then exits.

use crate::{
    error::Result,
    info,
    ipc_connector::Endpoint,
    ipc_server::CommandListener,
    scheduler::Trigger,
    warn, DEBUG_NAME,
};

pub enum Role {
    Owner(Ownership),
    Relay,
}

/// Held for the owner's whole lifetime; dropping it releases the lock.
pub struct Ownership {
    _lock: InstanceLock,
    listener: Option<CommandListener>,
}

impl Ownership {
    /// Starts forwarding relay commands into the owner's queue.
    pub fn listen(&mut self, trigger: Trigger) -> bool {
        let Some(listener) = self.listener.take() else {
            return false;
        };

        match listener.spawn(trigger) {
            Ok(_) => true,
            Err(e) => {
                warn!("[{}][IPC] Failed to start command listener: {}", DEBUG_NAME, e);
                false
            }
        }
    }
}

/// Decides owner vs relay. Never blocks.
pub fn acquire(endpoint: &Endpoint) -> Result<Role> {
    let role = platform::acquire(endpoint)?;
    match &role {
        Role::Owner(_) => info!("[{}] Acquired instance lock for {}", DEBUG_NAME, endpoint.address().display()),
        Role::Relay => info!("[{}] Another instance owns {}", DEBUG_NAME, endpoint.address().display()),
    }
    Ok(role)
}

use platform::InstanceLock;

#[cfg(unix)]
mod platform {
    use std::{
        fs::{self, File, OpenOptions},
        io::ErrorKind,
        os::unix::net::UnixListener,
        path::{Path, PathBuf},
    };

    use fs2::FileExt;

    use super::{Ownership, Role};
    use crate::{error::Result, ipc_connector::Endpoint, ipc_server::CommandListener, warn, DEBUG_NAME};

    /// An exclusive `flock` on `<socket>.lock` is the ownership token. The
    /// socket is only touched while it is held and is unlinked before release.
    pub struct InstanceLock {
        socket: PathBuf,
        _file: File,
    }

    impl Drop for InstanceLock {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.socket);
        }
    }

    fn lock_path(socket: &Path) -> PathBuf {
        socket.with_extension("lock")
    }

    pub fn acquire(endpoint: &Endpoint) -> Result<Role> {
        let socket = endpoint.address();
        if let Some(parent) = socket.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(socket))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Role::Relay),
            Err(e) => return Err(e.into()),
        }

        // The lock is ours, so any socket file left behind is a dead owner's.
        match fs::remove_file(socket) {
            Ok(()) => warn!("[{}][IPC] Removed stale socket {}", DEBUG_NAME, socket.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(socket)?;

        Ok(Role::Owner(Ownership {
            _lock: InstanceLock {
                socket: socket.to_path_buf(),
                _file: file,
            },
            listener: Some(CommandListener::from_bound(listener)),
        }))
    }
}

#[cfg(windows)]
mod platform {
    use windows::{
        core::PCWSTR,
        Win32::{
            Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE},
            System::Threading::CreateMutexW,
        },
    };

    use super::{Ownership, Role};
    use crate::{
        error::{Error, Result},
        ipc_connector::Endpoint,
        ipc_server::CommandListener,
        utility::to_wstring,
    };

    /// Named mutex handle; the OS releases it when the process exits.
    pub struct InstanceLock {
        handle: HANDLE,
    }

    impl Drop for InstanceLock {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    pub fn acquire(endpoint: &Endpoint) -> Result<Role> {
        let name = to_wstring(endpoint.lock_name());
        let handle = unsafe { CreateMutexW(None, false, PCWSTR(name.as_ptr())) }
            .map_err(|e| Error::Platform(format!("CreateMutexW: {e}")))?;

        // Opening an existing mutex succeeds but flags ERROR_ALREADY_EXISTS.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Ok(Role::Relay);
        }

        Ok(Role::Owner(Ownership {
            _lock: InstanceLock { handle },
            listener: Some(CommandListener::for_endpoint(endpoint)),
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        ipc_connector::{self, Command},
        scheduler::{Event, Scheduler},
    };
    use std::{
        os::unix::net::UnixListener,
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    const PATIENCE: Duration = Duration::from_secs(5);

    fn endpoint_in(dir: &std::path::Path) -> Endpoint {
        Endpoint::at(dir.join("wallchanger.sock"))
    }

    #[test]
    fn exactly_one_of_two_launches_owns() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());

        let first = acquire(&endpoint).unwrap();
        let second = acquire(&endpoint).unwrap();

        assert!(matches!(first, Role::Owner(_)));
        assert!(matches!(second, Role::Relay));
    }

    #[test]
    fn lock_is_released_when_the_owner_goes_away() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());

        let owner = acquire(&endpoint).unwrap();
        drop(owner);

        assert!(!endpoint.address().exists());
        assert!(matches!(acquire(&endpoint).unwrap(), Role::Owner(_)));
    }

    #[test]
    fn stale_socket_from_a_crashed_owner_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());
        drop(UnixListener::bind(endpoint.address()).unwrap());
        assert!(endpoint.address().exists());

        assert!(matches!(acquire(&endpoint).unwrap(), Role::Owner(_)));
    }

    #[test]
    fn concurrent_launches_over_a_stale_socket_elect_one_owner() {
        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let endpoint = endpoint_in(dir.path());
            drop(UnixListener::bind(endpoint.address()).unwrap());

            let start = Arc::new(Barrier::new(2));
            let launches: Vec<_> = (0..2)
                .map(|_| {
                    let endpoint = endpoint.clone();
                    let start = Arc::clone(&start);
                    thread::spawn(move || {
                        start.wait();
                        acquire(&endpoint).unwrap()
                    })
                })
                .collect();
            let roles: Vec<Role> = launches.into_iter().map(|h| h.join().unwrap()).collect();

            let owners = roles.iter().filter(|r| matches!(r, Role::Owner(_))).count();
            assert_eq!(owners, 1);
            assert!(endpoint.address().exists());
        }
    }

    #[test]
    fn a_relay_leaves_the_owner_socket_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());

        let _owner = acquire(&endpoint).unwrap();
        drop(acquire(&endpoint).unwrap());

        assert!(endpoint.address().exists());
        assert!(matches!(acquire(&endpoint).unwrap(), Role::Relay));
    }

    #[test]
    fn relayed_advance_reaches_the_owner_queue_once() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());

        let Role::Owner(mut ownership) = acquire(&endpoint).unwrap() else {
            panic!("first launch must own");
        };
        let (scheduler, events) = Scheduler::start(Duration::from_secs(3600));
        assert!(ownership.listen(scheduler.trigger()));
        assert!(!ownership.listen(scheduler.trigger()));

        assert!(matches!(acquire(&endpoint).unwrap(), Role::Relay));
        assert!(ipc_connector::relay(&endpoint, &Command::Advance));

        assert_eq!(events.recv_timeout(PATIENCE), Ok(Event::Command(Command::Advance)));
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn relay_fails_quietly_when_the_owner_is_not_listening_yet() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(dir.path());

        let _owner = acquire(&endpoint).unwrap();
        let (scheduler, events) = Scheduler::start(Duration::from_secs(3600));

        // Bound but nobody serving: the relay's read times out and it gives up.
        assert!(!ipc_connector::relay(&endpoint, &Command::Advance));
        drop(scheduler);
        assert!(events.try_recv().is_err());
    }
}

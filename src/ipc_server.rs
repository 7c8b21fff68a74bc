// ~/src/ipc_server.rs
//
// Owner side of the command channel. The listener thread only decodes
// requests and hands them to the owner's event queue; it never rotates.

use std::{
    io::{self, Read, Write},
    thread::{self, JoinHandle},
};

use crate::{
    error::Result,
    info,
    ipc_connector::{encode_line, read_line, Command, IpcResponse},
    scheduler::Trigger,
    warn, DEBUG_NAME,
};

/// Outcome of serving one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Forwarded,
    Ignored,
    /// The owner's queue is gone; stop accepting.
    OwnerGone,
}

/// Reads one request from `stream`, forwards it and acknowledges it.
///
/// The acknowledgement is sent once the command is queued, not after it
/// has run, so a relay never waits on a rotation.
pub fn serve_client<S: Read + Write>(stream: &mut S, trigger: &Trigger) -> Served {
    let line = match read_line(&mut *stream) {
        Ok(line) => line,
        Err(e) => {
            warn!("[{}][IPC] Failed to read request: {}", DEBUG_NAME, e);
            return Served::Ignored;
        }
    };

    // A client may connect and hang up without sending anything.
    if line.trim().is_empty() {
        return Served::Ignored;
    }

    let (response, outcome) = match serde_json::from_str::<Command>(&line) {
        Ok(command) => {
            info!("[{}][IPC] Received {:?}", DEBUG_NAME, command);
            if trigger.send(command) {
                (IpcResponse::ok(), Served::Forwarded)
            } else {
                (IpcResponse::rejected("owner is shutting down"), Served::OwnerGone)
            }
        }
        Err(e) => {
            warn!("[{}][IPC] Rejected malformed request: {}", DEBUG_NAME, e);
            (IpcResponse::rejected(format!("invalid command: {e}")), Served::Ignored)
        }
    };

    if let Err(e) = write_response(stream, &response) {
        warn!("[{}][IPC] Failed to answer client: {}", DEBUG_NAME, e);
    }

    outcome
}

fn write_response<S: Write>(stream: &mut S, response: &IpcResponse) -> Result<()> {
    stream.write_all(&encode_line(response)?)?;
    stream.flush()?;
    Ok(())
}

/// The bound, not yet serving, command endpoint.
pub struct CommandListener {
    #[cfg(unix)]
    listener: std::os::unix::net::UnixListener,
    #[cfg(windows)]
    pipe_name: String,
}

impl CommandListener {
    #[cfg(unix)]
    pub fn from_bound(listener: std::os::unix::net::UnixListener) -> Self {
        Self { listener }
    }

    #[cfg(windows)]
    pub fn for_endpoint(endpoint: &crate::ipc_connector::Endpoint) -> Self {
        Self {
            pipe_name: endpoint.address().to_string_lossy().into_owned(),
        }
    }

    /// Serves requests on a background thread until the owner goes away.
    pub fn spawn(self, trigger: Trigger) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("command-listener".to_string())
            .spawn(move || self.serve(&trigger))
    }

    #[cfg(unix)]
    fn serve(self, trigger: &Trigger) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(mut stream) => {
                    let _ = stream.set_read_timeout(Some(crate::ipc_connector::RELAY_TIMEOUT));
                    let _ = stream.set_write_timeout(Some(crate::ipc_connector::RELAY_TIMEOUT));
                    if serve_client(&mut stream, trigger) == Served::OwnerGone {
                        break;
                    }
                }
                Err(e) => warn!("[{}][IPC] Accept failed: {}", DEBUG_NAME, e),
            }
        }
    }

    #[cfg(windows)]
    fn serve(self, trigger: &Trigger) {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };

        // Each client gets its own thread so a silent one cannot hold up the next relay.
        let owner_gone = Arc::new(AtomicBool::new(false));
        while !owner_gone.load(Ordering::Relaxed) {
            let mut pipe = match pipe::accept(&self.pipe_name) {
                Ok(pipe) => pipe,
                Err(e) => {
                    crate::error!("[{}][IPC] Command pipe unavailable: {}", DEBUG_NAME, e);
                    return;
                }
            };

            let trigger = trigger.clone();
            let owner_gone = Arc::clone(&owner_gone);
            let spawned = thread::Builder::new()
                .name("command-client".to_string())
                .spawn(move || {
                    if serve_client(&mut pipe.file, &trigger) == Served::OwnerGone {
                        owner_gone.store(true, Ordering::Relaxed);
                    }
                });
            if let Err(e) = spawned {
                warn!("[{}][IPC] Failed to start client thread: {}", DEBUG_NAME, e);
            }
        }
    }
}

#[cfg(windows)]
mod pipe {
    use std::{
        fs::File,
        os::windows::io::{AsRawHandle, FromRawHandle, RawHandle},
    };

    use windows::{
        core::{HRESULT, PCWSTR},
        Win32::{
            Foundation::{ERROR_PIPE_CONNECTED, HANDLE},
            Storage::FileSystem::{FlushFileBuffers, PIPE_ACCESS_DUPLEX},
            System::Pipes::{
                ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_BYTE,
                PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
            },
        },
    };

    use crate::{
        error::{Error, Result},
        utility::to_wstring,
    };

    const BUFFER_SIZE: u32 = 4096;

    /// A connected server end of the pipe. Dropping it flushes and disconnects.
    pub struct ConnectedPipe {
        pub file: File,
    }

    impl Drop for ConnectedPipe {
        fn drop(&mut self) {
            let handle = HANDLE(self.file.as_raw_handle());
            unsafe {
                let _ = FlushFileBuffers(handle);
                let _ = DisconnectNamedPipe(handle);
            }
            // `file` owns the handle and closes it after this.
        }
    }

    fn is_win32_error(err: &windows::core::Error, win32_code: u32) -> bool {
        err.code() == HRESULT::from_win32(win32_code)
    }

    /// Creates a fresh pipe instance and blocks until a client connects.
    pub fn accept(pipe_name: &str) -> Result<ConnectedPipe> {
        let name = to_wstring(pipe_name);

        let handle = unsafe {
            CreateNamedPipeW(
                PCWSTR(name.as_ptr()),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
                PIPE_UNLIMITED_INSTANCES,
                BUFFER_SIZE,
                BUFFER_SIZE,
                0,
                None,
            )
        };
        if handle.is_invalid() {
            return Err(Error::Platform(format!(
                "CreateNamedPipeW: {}",
                std::io::Error::last_os_error()
            )));
        }

        // Take ownership first so every early return closes the handle.
        let file = unsafe { File::from_raw_handle(handle.0 as RawHandle) };

        if let Err(e) = unsafe { ConnectNamedPipe(handle, None) } {
            // A client that connected between create and connect is fine.
            if !is_win32_error(&e, ERROR_PIPE_CONNECTED.0) {
                return Err(Error::Platform(format!("ConnectNamedPipe: {e}")));
            }
        }

        Ok(ConnectedPipe { file })
    }
}

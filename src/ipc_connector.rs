// ~/src/ipc_connector.rs
//
// Relay side of the command channel: one newline-terminated JSON request,
// one JSON line back. A relay tries exactly once and never blocks for long.

use std::{
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    data_loaders::config::SettingsPatch,
    error::{Error, Result},
    info, warn, DEBUG_NAME,
};

/// Upper bound on a single request line.
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

/// How long a relay waits on the owner before giving up.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Rotate now, outside the timer cadence.
    Advance,
    /// Merge and persist new settings, then rotate.
    Configure { patch: SettingsPatch },
    /// Shut the owner down.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Well-known address of the owner's command endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: PathBuf,
    #[cfg(windows)]
    lock_name: String,
}

impl Endpoint {
    pub fn for_current_user() -> Self {
        #[cfg(windows)]
        {
            Self::named(crate::APP_NAME)
        }
        #[cfg(unix)]
        {
            Self::at(crate::paths::runtime_dir().join(crate::paths::SOCKET_NAME))
        }
    }

    /// `\\.\pipe\<name>` guarded by the session mutex `Local\<name>.instance`.
    #[cfg(windows)]
    pub fn named(name: &str) -> Self {
        Self {
            address: PathBuf::from(format!(r"\\.\pipe\{name}")),
            lock_name: format!(r"Local\{name}.instance"),
        }
    }

    /// A Unix socket at `path`; binding it is the ownership lock.
    #[cfg(unix)]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            address: path.into(),
        }
    }

    pub fn address(&self) -> &Path {
        &self.address
    }

    #[cfg(windows)]
    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }
}

pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

/// Reads one newline-terminated line, capped at [`MAX_MESSAGE_BYTES`].
pub fn read_line<R: Read>(stream: R) -> Result<String> {
    let mut reader = BufReader::new(stream.take(MAX_MESSAGE_BYTES));
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Delivers `command` to the owner and waits for its acknowledgement.
#[cfg(unix)]
pub fn send(endpoint: &Endpoint, command: &Command) -> Result<()> {
    exchange(endpoint, command)
}

/// Delivers `command` to the owner and waits for its acknowledgement.
///
/// Synchronous pipe I/O has no timeout, so the exchange runs on a helper
/// thread that is abandoned if the owner does not answer in time.
#[cfg(windows)]
pub fn send(endpoint: &Endpoint, command: &Command) -> Result<()> {
    use std::{sync::mpsc, thread};

    let (done, outcome) = mpsc::channel();
    let (endpoint, command) = (endpoint.clone(), command.clone());
    thread::Builder::new()
        .name("relay".to_string())
        .spawn(move || {
            let _ = done.send(exchange(&endpoint, &command));
        })?;

    outcome.recv_timeout(RELAY_TIMEOUT).unwrap_or_else(|_| {
        Err(Error::OwnerUnreachable(format!(
            "no answer within {}s",
            RELAY_TIMEOUT.as_secs()
        )))
    })
}

fn exchange(endpoint: &Endpoint, command: &Command) -> Result<()> {
    let mut stream = connect(endpoint)?;

    stream.write_all(&encode_line(command)?)?;
    stream.flush()?;

    let line = read_line(&mut stream)?;
    if line.is_empty() {
        return Err(Error::Protocol("empty response from owner".to_string()));
    }

    let response: IpcResponse = serde_json::from_str(&line)?;
    if response.ok {
        Ok(())
    } else {
        Err(Error::Protocol(
            response.error.unwrap_or_else(|| "command rejected".to_string()),
        ))
    }
}

/// Relay entry point: one attempt, failures are logged and swallowed.
pub fn relay(endpoint: &Endpoint, command: &Command) -> bool {
    info!("[{}][IPC] Relaying {:?} to {}", DEBUG_NAME, command, endpoint.address().display());
    match send(endpoint, command) {
        Ok(()) => true,
        Err(e) => {
            warn!("[{}][IPC] Relay failed: {}", DEBUG_NAME, e);
            false
        }
    }
}

#[cfg(unix)]
fn connect(endpoint: &Endpoint) -> Result<std::os::unix::net::UnixStream> {
    use std::{io::ErrorKind, os::unix::net::UnixStream};

    let stream = UnixStream::connect(endpoint.address()).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
            Error::OwnerUnreachable(format!("{}: {e}", endpoint.address().display()))
        }
        _ => Error::Io(e),
    })?;

    stream.set_read_timeout(Some(RELAY_TIMEOUT))?;
    stream.set_write_timeout(Some(RELAY_TIMEOUT))?;
    Ok(stream)
}

#[cfg(windows)]
fn connect(endpoint: &Endpoint) -> Result<std::fs::File> {
    // A busy or missing pipe fails immediately; relays do not wait for a free instance.
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(endpoint.address())
        .map_err(|e| Error::OwnerUnreachable(format!("{}: {e}", endpoint.address().display())))
}

//! Daemon control protocol.
//!
//! Length-prefixed bincode frames over a unix socket. The client side is
//! used by the status/mode/reload subcommands; the daemon serves requests
//! from its management loop.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::RuntimeMode;
use crate::pressure::PressureSupport;
use crate::report::Side;
use crate::runtime::CounterView;

/// IPC message from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcRequest {
    /// Check if the daemon is alive.
    Ping,
    /// Full runtime status.
    Status,
    /// Switch the runtime mode.
    SetMode(RuntimeMode),
    /// Re-read config and keymap from disk.
    Reload,
    /// Stop the daemon.
    Shutdown,
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcResponse {
    Pong,
    Status(StatusReport),
    Ok,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub side: Side,
    pub path: String,
    pub pressure: PressureSupport,
    pub open_touches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub mode: RuntimeMode,
    pub layers: Vec<u8>,
    pub devices: Vec<DeviceReport>,
    pub counters: CounterView,
}

/// Socket path: system location for root, runtime dir otherwise.
#[must_use]
pub fn socket_path() -> PathBuf {
    if unsafe { libc::getuid() } == 0 {
        return Path::new("/run").join("glasstokey.sock");
    }
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    Path::new(&runtime_dir).join("glasstokey.sock")
}

/// Send one request and wait for the response.
pub fn send_request(request: &IpcRequest) -> Result<IpcResponse> {
    let path = socket_path();
    let mut stream = UnixStream::connect(&path)
        .with_context(|| format!("failed to connect to daemon at {}", path.display()))?;
    write_frame(&mut stream, request)?;
    read_frame(&mut stream)
}

/// Write a length-prefixed bincode frame.
pub fn write_frame<T: Serialize>(stream: &mut UnixStream, value: &T) -> Result<()> {
    let encoded = bincode::serialize(value)?;
    stream.write_all(&(encoded.len() as u32).to_le_bytes())?;
    stream.write_all(&encoded)?;
    stream.flush()?;
    Ok(())
}

/// Read a length-prefixed bincode frame.
pub fn read_frame<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn frames_round_trip_over_a_socket() {
        let dir = std::env::temp_dir().join("g2k-ipc-test");
        std::fs::create_dir_all(&dir).unwrap();
        let sock = dir.join("test.sock");
        let _ = std::fs::remove_file(&sock);
        let listener = UnixListener::bind(&sock).unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let req: IpcRequest = read_frame(&mut conn).unwrap();
            assert!(matches!(req, IpcRequest::SetMode(RuntimeMode::KeyboardOnly)));
            write_frame(&mut conn, &IpcResponse::Ok).unwrap();
        });

        let mut client = UnixStream::connect(&sock).unwrap();
        write_frame(&mut client, &IpcRequest::SetMode(RuntimeMode::KeyboardOnly)).unwrap();
        let resp: IpcResponse = read_frame(&mut client).unwrap();
        assert!(matches!(resp, IpcResponse::Ok));
        server.join().unwrap();
    }
}

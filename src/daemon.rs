//! Daemon shell.
//!
//! The pipeline itself runs on plain threads (see [`crate::runtime`]); this
//! module is the async management layer around it: IPC requests, config
//! file watching, and signal handling, multiplexed with `tokio::select`.

use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ConfigManager;
use crate::ipc::{self, DeviceReport, IpcRequest, IpcResponse, StatusReport};
use crate::runtime::Runtime;
use crate::sink::{DispatchSink, LogSink, UinputSink};

type IpcMessage = (IpcRequest, std::sync::mpsc::Sender<IpcResponse>);

pub struct Daemon {
    manager: Arc<ConfigManager>,
    runtime: Runtime,
    socket_path: PathBuf,
}

impl Daemon {
    /// Load config, create the sink, start the pipeline.
    pub fn new(config_path: Option<&Path>, dry_run: bool) -> Result<Self> {
        let manager = Arc::new(ConfigManager::load(config_path)?);

        let sink: Box<dyn DispatchSink> = if dry_run {
            info!("dry run: dispatch events will be logged, not synthesized");
            Box::new(LogSink)
        } else {
            Box::new(UinputSink::new().context("failed to create uinput device")?)
        };

        let runtime = Runtime::start(manager.clone(), sink)?;
        Ok(Self {
            manager,
            runtime,
            socket_path: ipc::socket_path(),
        })
    }

    /// Management loop. Returns when asked to shut down.
    pub async fn run(&mut self) -> Result<()> {
        let mut ipc_rx = self.start_ipc_server()?;
        let mut watch_rx = self.start_config_watcher();

        info!("daemon running; control socket at {}", self.socket_path.display());

        // Config-change debounce: editors write several events per save.
        let mut reload_pending = false;
        let mut debounce = tokio::time::interval(Duration::from_millis(500));

        loop {
            tokio::select! {
                Some((request, resp_tx)) = ipc_rx.recv() => {
                    debug!("ipc request: {:?}", request);
                    let shutdown = matches!(request, IpcRequest::Shutdown);
                    let response = self.handle_request(request);
                    let _ = resp_tx.send(response);
                    if shutdown {
                        break;
                    }
                }
                Some(()) = watch_rx.recv() => {
                    reload_pending = true;
                }
                _ = debounce.tick() => {
                    if reload_pending {
                        reload_pending = false;
                        if self.manager.config().hot_reload {
                            info!("config changed on disk, reloading");
                            if let Err(e) = self.manager.reload() {
                                error!("config reload failed: {e:#}");
                            }
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.runtime.shutdown();
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    fn handle_request(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Ping => IpcResponse::Pong,
            IpcRequest::Status => IpcResponse::Status(self.status_report()),
            IpcRequest::SetMode(mode) => {
                self.runtime.set_mode(mode);
                IpcResponse::Ok
            }
            IpcRequest::Reload => match self.manager.reload() {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error(format!("{e:#}")),
            },
            IpcRequest::Shutdown => IpcResponse::Ok,
        }
    }

    fn status_report(&self) -> StatusReport {
        let snapshot = self.runtime.snapshot();
        let config = self.manager.config();
        let devices = snapshot
            .sides
            .iter()
            .map(|side| DeviceReport {
                side: side.side,
                path: config
                    .devices
                    .iter()
                    .find(|d| d.side == side.side)
                    .map(|d| d.path.display().to_string())
                    .unwrap_or_default(),
                pressure: side.pressure,
                open_touches: side.touches.len(),
            })
            .collect();
        StatusReport {
            mode: snapshot.mode,
            layers: snapshot.layers.clone(),
            devices,
            counters: snapshot.counters,
        }
    }

    /// Accept IPC connections on a blocking thread, forwarding requests
    /// into the async loop.
    fn start_ipc_server(&self) -> Result<mpsc::UnboundedReceiver<IpcMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.socket_path.clone();

        let _ = std::fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind {}", path.display()))?;

        std::thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(mut conn) = conn else { continue };
                let tx = tx.clone();
                std::thread::spawn(move || {
                    let request: IpcRequest = match ipc::read_frame(&mut conn) {
                        Ok(req) => req,
                        Err(e) => {
                            warn!("bad ipc frame: {e}");
                            return;
                        }
                    };
                    let (resp_tx, resp_rx) = std::sync::mpsc::channel();
                    if tx.send((request, resp_tx)).is_err() {
                        return;
                    }
                    let response = resp_rx
                        .recv_timeout(Duration::from_secs(5))
                        .unwrap_or_else(|_| IpcResponse::Error("daemon busy".into()));
                    let _ = ipc::write_frame(&mut conn, &response);
                });
            }
        });

        Ok(rx)
    }

    /// Watch the config directory; any event nudges the debounced reload.
    fn start_config_watcher(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let dir = self
            .manager
            .config_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        std::thread::spawn(move || {
            let (event_tx, event_rx) = std::sync::mpsc::channel();
            let mut watcher = match notify::recommended_watcher(event_tx) {
                Ok(w) => w,
                Err(e) => {
                    warn!("config watcher unavailable: {e}");
                    return;
                }
            };
            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!("cannot watch {}: {e}", dir.display());
                return;
            }
            for event in event_rx {
                match event {
                    Ok(_) => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("watch error: {e}"),
                }
            }
        });

        rx
    }
}

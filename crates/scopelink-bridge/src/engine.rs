//! Lifecycle shared by the transmit and receive engines.
//!
//! An engine owns one run flag and at most one worker thread. The worker
//! accepts the single peer, runs its direction's loop body, then closes the
//! channel on its way out. `stop` clears the flag, wakes anything blocked in
//! the transport, and joins.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use scopelink_transport::{
    ChannelOptions, ChannelTransport, Endpoint, ShutdownHandle, TransportError,
};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};

/// Where an engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Stopped = 0,
    Binding = 1,
    /// Endpoint created; worker waiting for its peer.
    Listening = 2,
    /// Peer accepted; worker moving packets.
    Running = 3,
    Stopping = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Binding,
            2 => Self::Listening,
            3 => Self::Running,
            4 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Binding => "binding",
            Self::Listening => "listening",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The owner asked it to stop.
    Stopped,
    /// The peer went away.
    Disconnected,
    /// No peer could be accepted.
    AcceptFailed(String),
    /// An error the configured policy treats as terminal.
    Fatal(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// What a loop body can see of its engine.
pub(crate) struct WorkerCtx {
    run: Arc<AtomicBool>,
    state: StateCell,
}

impl WorkerCtx {
    /// Checked at the top of every loop iteration.
    pub(crate) fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }

    /// Exit reason for a peer that vanished: a cleared flag means the owner
    /// caused it.
    pub(crate) fn disconnect_exit(&self) -> WorkerExit {
        if self.is_running() {
            WorkerExit::Disconnected
        } else {
            WorkerExit::Stopped
        }
    }
}

struct Worker {
    handle: JoinHandle<WorkerExit>,
    shutdown: ShutdownHandle,
}

pub(crate) struct EngineCore<T> {
    role: &'static str,
    endpoint: Endpoint,
    options: ChannelOptions,
    run: Arc<AtomicBool>,
    state: StateCell,
    worker: Option<Worker>,
    last_exit: Option<WorkerExit>,
    _transport: PhantomData<fn() -> T>,
}

impl<T: ChannelTransport> EngineCore<T> {
    pub(crate) fn new(role: &'static str, endpoint: Endpoint, options: ChannelOptions) -> Self {
        Self {
            role,
            endpoint,
            options,
            run: Arc::new(AtomicBool::new(false)),
            state: StateCell::default(),
            worker: None,
            last_exit: None,
            _transport: PhantomData,
        }
    }

    /// Bind the endpoint and spawn a worker that runs `body` once a peer is
    /// accepted. A running engine is stopped first; a panic in the old worker
    /// is logged and kept in `last_exit` but does not block the rebind.
    pub(crate) fn start<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut T, &WorkerCtx) -> WorkerExit + Send + 'static,
    {
        if self.worker.is_some() {
            info!(role = self.role, address = %self.endpoint, "restarting engine");
            if let Err(err) = self.stop() {
                warn!(
                    role = self.role,
                    address = %self.endpoint,
                    error = %err,
                    "previous worker failed"
                );
            }
        }

        self.state.set(EngineState::Binding);
        let mut channel = match T::bind(&self.endpoint, &self.options) {
            Ok(channel) => channel,
            Err(err) => {
                self.state.set(EngineState::Stopped);
                warn!(role = self.role, address = %self.endpoint, error = %err, "bind failed");
                return Err(err.into());
            }
        };
        let shutdown = channel.shutdown_handle();

        self.run.store(true, Ordering::SeqCst);
        self.state.set(EngineState::Listening);

        let ctx = WorkerCtx {
            run: Arc::clone(&self.run),
            state: self.state.clone(),
        };
        let role = self.role;
        let spawned = thread::Builder::new()
            .name(format!("scopelink-{role}-{}", self.endpoint.name()))
            .spawn(move || {
                let exit = match channel.accept_one() {
                    Ok(_) => {
                        debug!(
                            role,
                            address = %channel.endpoint(),
                            transport = channel.transport_name(),
                            "peer accepted"
                        );
                        ctx.state.set(EngineState::Running);
                        body(&mut channel, &ctx)
                    }
                    Err(TransportError::Shutdown) => WorkerExit::Stopped,
                    Err(_) if !ctx.is_running() => WorkerExit::Stopped,
                    Err(err) => {
                        error!(role, address = %channel.endpoint(), error = %err, "accept failed");
                        WorkerExit::AcceptFailed(err.to_string())
                    }
                };
                ctx.run.store(false, Ordering::SeqCst);
                channel.close();
                if ctx.state.get() != EngineState::Stopping {
                    ctx.state.set(EngineState::Stopped);
                }
                info!(role, address = %channel.endpoint(), ?exit, "worker exited");
                exit
            });

        match spawned {
            Ok(handle) => {
                info!(role, address = %self.endpoint, "engine started");
                self.worker = Some(Worker { handle, shutdown });
                Ok(())
            }
            Err(err) => {
                // The closure (and with it the channel) was dropped, which
                // released the endpoint.
                self.run.store(false, Ordering::SeqCst);
                self.state.set(EngineState::Stopped);
                Err(BridgeError::Spawn(err))
            }
        }
    }

    /// Stop the worker and release the endpoint. No-op when nothing runs.
    pub(crate) fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        debug!(role = self.role, address = %self.endpoint, "stopping engine");
        self.state.set(EngineState::Stopping);
        self.run.store(false, Ordering::SeqCst);
        worker.shutdown.request();

        let joined = worker.handle.join();
        self.state.set(EngineState::Stopped);
        match joined {
            Ok(exit) => {
                info!(role = self.role, address = %self.endpoint, "engine stopped");
                self.last_exit = Some(exit);
                Ok(())
            }
            Err(_) => {
                error!(role = self.role, address = %self.endpoint, "worker panicked");
                self.last_exit = Some(WorkerExit::Fatal("worker panicked".to_string()));
                Err(BridgeError::WorkerPanicked(self.role))
            }
        }
    }

    pub(crate) fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Exit reason of the most recently joined worker.
    pub(crate) fn last_exit(&self) -> Option<WorkerExit> {
        self.last_exit.clone()
    }

    /// Whether a worker thread exists and has not finished.
    pub(crate) fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl<T> Drop for EngineCore<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.run.store(false, Ordering::SeqCst);
            worker.shutdown.request();
            let _ = worker.handle.join();
            self.state.set(EngineState::Stopped);
        }
    }
}

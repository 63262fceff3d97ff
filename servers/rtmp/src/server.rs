//! The listening socket, connection registry, and the monitor task that
//! enforces recv-timeout. This is the only piece of the crate that owns a
//! `TcpListener`; everything downstream of accept is [`crate::connection`].

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    callbacks::{ServerCallbacks, ServerState, StreamMetadata},
    config::RtmpServerConfig,
    connection::{self, ActivityTracker, ConnectionParams, SharedCounters},
    errors::ServerResult,
};

struct ConnectionHandle {
    remote_addr: SocketAddr,
    activity: Arc<ActivityTracker>,
    cancel: CancellationToken,
}

struct SharedState {
    registry: Mutex<HashMap<u64, ConnectionHandle>>,
    metadata: Arc<Mutex<HashMap<String, StreamMetadata>>>,
    counters: Arc<SharedCounters>,
    next_connection_id: AtomicU64,
}

/// The RTMP core: owns a listening socket and drives every accepted
/// connection, but otherwise knows nothing about what happens with the
/// streams it carries - that's entirely up to the registered callbacks.
pub struct RtmpServer {
    config: RtmpServerConfig,
    callbacks: Arc<ServerCallbacks>,
    state: Arc<SharedState>,
}

impl RtmpServer {
    pub fn new(config: RtmpServerConfig, callbacks: ServerCallbacks) -> Self {
        Self {
            config,
            callbacks: Arc::new(callbacks),
            state: Arc::new(SharedState {
                registry: Mutex::new(HashMap::new()),
                metadata: Arc::new(Mutex::new(HashMap::new())),
                counters: Arc::new(SharedCounters::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn total_bytes_in(&self) -> u64 {
        self.state.counters.bytes_in.load(Ordering::Relaxed)
    }

    pub fn total_bytes_out(&self) -> u64 {
        self.state.counters.bytes_out.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.state.counters.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn stream_metadata(&self, stream_name: &str) -> Option<StreamMetadata> {
        self.state.metadata.lock().unwrap().get(stream_name).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.state.registry.lock().unwrap().len()
    }

    /// Binds the listening socket and runs until `shutdown` is cancelled,
    /// then drains every in-flight connection before returning.
    pub async fn serve(&self, shutdown: CancellationToken) -> ServerResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!(port = self.config.port, "rtmp server listening");
        self.callbacks.fire_server_state(ServerState::Starting);

        let monitor = tokio::spawn(monitor_loop(
            self.state.clone(),
            Duration::from_secs(self.config.recv_timeout_seconds as u64),
            shutdown.clone(),
        ));

        self.callbacks.fire_server_state(ServerState::Running);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => self.accept_connection(stream, remote_addr, &shutdown),
                        Err(err) => warn!(%err, "accept failed"),
                    }
                }
            }
        }

        self.callbacks.fire_server_state(ServerState::Stopping);
        let _ = monitor.await;
        self.close_all_connections();
        self.callbacks.fire_server_state(ServerState::Stopped);
        info!("rtmp server stopped");
        Ok(())
    }

    fn accept_connection(&self, stream: TcpStream, remote_addr: SocketAddr, shutdown: &CancellationToken) {
        if self.connection_count() >= self.config.max_connections as usize {
            warn!(%remote_addr, "connection rejected: max_connections reached");
            return;
        }

        let id = self.state.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let activity = ActivityTracker::new();
        let cancel = shutdown.child_token();

        self.state.registry.lock().unwrap().insert(
            id,
            ConnectionHandle {
                remote_addr,
                activity: activity.clone(),
                cancel: cancel.clone(),
            },
        );

        let params = ConnectionParams {
            id,
            remote_addr,
            config: Arc::new(self.config.clone()),
            callbacks: self.callbacks.clone(),
            counters: self.state.counters.clone(),
            stream_metadata: self.state.metadata.clone(),
            cancel,
            activity,
        };
        let state = self.state.clone();
        tokio::spawn(async move {
            connection::run(stream, params).await;
            state.registry.lock().unwrap().remove(&id);
        });
    }

    fn close_all_connections(&self) {
        let handles: Vec<CancellationToken> = self
            .state
            .registry
            .lock()
            .unwrap()
            .values()
            .map(|h| h.cancel.clone())
            .collect();
        for cancel in handles {
            cancel.cancel();
        }
    }
}

async fn monitor_loop(state: Arc<SharedState>, recv_timeout: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        let expired: Vec<(u64, SocketAddr, CancellationToken)> = state
            .registry
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, handle)| handle.activity.idle_for() >= recv_timeout)
            .map(|(id, handle)| (*id, handle.remote_addr, handle.cancel.clone()))
            .collect();
        for (id, remote_addr, cancel) in expired {
            warn!(connection_id = id, %remote_addr, "recv timeout exceeded, closing connection");
            cancel.cancel();
        }
    }
}

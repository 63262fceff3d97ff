//! The only "API" the server exposes upward: four callback registration
//! points, invoked from whichever connection task the event originates on.
//! Implementations must be reentrant - nothing here is called under a lock
//! held across connections.

use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};

use amf::Value;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Unknown,
    Publisher,
    Subscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    New,
    HandshakeWaitC0C1,
    HandshakeWaitC2,
    ConnectWait,
    Connected,
    CreatedStream,
    Publishing,
    Playing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub remote_addr: SocketAddr,
    pub role: ConnectionRole,
    pub phase: ConnectionPhase,
    /// Set only on the `Closed` event, when the connection ended because of
    /// an error rather than a clean `deleteStream`/EOF.
    pub close_cause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub stream_name: String,
    pub properties: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub struct FrameEvent {
    pub stream_name: String,
    pub timestamp: u32,
    pub payload: Vec<u8>,
    pub is_keyframe: bool,
}

pub type ConnectionLifecycleCallback =
    Arc<dyn Fn(ConnectionInfo, ConnectionEventKind) + Send + Sync>;
pub type ServerStateCallback = Arc<dyn Fn(ServerState) + Send + Sync>;
pub type MetadataCallback = Arc<dyn Fn(StreamMetadata) + Send + Sync>;
/// Returning `true` asks the connection that produced the frame to
/// disconnect; any other outcome (including the callback panicking, which is
/// caught at the call site) is non-fatal.
pub type FrameCallback = Arc<dyn Fn(FrameEvent) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ServerCallbacks {
    pub connection_lifecycle: Option<ConnectionLifecycleCallback>,
    pub server_state: Option<ServerStateCallback>,
    pub metadata: Option<MetadataCallback>,
    pub frame: Option<FrameCallback>,
}

impl ServerCallbacks {
    pub fn with_connection_lifecycle(mut self, callback: ConnectionLifecycleCallback) -> Self {
        self.connection_lifecycle = Some(callback);
        self
    }

    pub fn with_server_state(mut self, callback: ServerStateCallback) -> Self {
        self.server_state = Some(callback);
        self
    }

    pub fn with_metadata(mut self, callback: MetadataCallback) -> Self {
        self.metadata = Some(callback);
        self
    }

    pub fn with_frame(mut self, callback: FrameCallback) -> Self {
        self.frame = Some(callback);
        self
    }

    pub(crate) fn fire_lifecycle(&self, info: ConnectionInfo, kind: ConnectionEventKind) {
        if let Some(callback) = &self.connection_lifecycle {
            let connection_id = info.id;
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(info, kind))).is_err() {
                error!(connection_id, "connection-lifecycle callback panicked");
            }
        }
    }

    pub(crate) fn fire_server_state(&self, state: ServerState) {
        if let Some(callback) = &self.server_state {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                error!("server-state callback panicked");
            }
        }
    }

    pub(crate) fn fire_metadata(&self, metadata: StreamMetadata) {
        if let Some(callback) = &self.metadata {
            let stream_name = metadata.stream_name.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(metadata))).is_err() {
                error!(stream_name, "metadata callback panicked");
            }
        }
    }

    /// Returns `true` if the frame callback asked for the connection to
    /// close. A callback that panics is treated the same as one that asked
    /// to keep going - the panic itself is the non-fatal `CallbackError`.
    pub(crate) fn fire_frame(&self, event: FrameEvent) -> bool {
        match &self.frame {
            Some(callback) => {
                let stream_name = event.stream_name.clone();
                match std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                    Ok(disconnect) => disconnect,
                    Err(_) => {
                        error!(stream_name, "frame callback panicked");
                        false
                    }
                }
            }
            None => false,
        }
    }
}

//! Drives a single accepted socket from handshake through to close: owns the
//! chunk-stream table, the high-level phase, and the command dispatch that
//! turns decoded messages into protocol responses and callback invocations.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use amf::Value;
use rtmp_formats::{
    chunk::{self, consts as chunk_consts, decoder::ChunkDecoder, encoder::ChunkEncoder},
    commands::{self, Command},
    handshake::server::HandshakeServer,
    message::{self, RtmpMessage, RtmpMessageBody},
    protocol_control::{self, LimitType, ProtocolControlMessage},
    user_control::{self, UserControlEvent},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::{bytes::BytesMut, codec::Decoder, sync::CancellationToken};
use tracing::{debug, info, warn};

use crate::{
    callbacks::{
        ConnectionEventKind, ConnectionInfo, ConnectionPhase, ConnectionRole, FrameEvent,
        ServerCallbacks, StreamMetadata,
    },
    config::RtmpServerConfig,
    errors::{ConnectionError, ConnectionResult},
};

const SERVER_FMS_VERSION: &str = "FMS/3,0,1,123";
const SERVER_CAPABILITIES: f64 = 31.0;
const FIRST_STREAM_ID: u32 = 1;
const MIN_SET_CHUNK_SIZE: u32 = 128;

/// Shared with the dispatcher's monitor task: when it's too long since this
/// connection last saw a byte, the monitor cancels it rather than reaching
/// into the task to close the socket itself.
pub(crate) struct ActivityTracker {
    last_seen: Mutex<Instant>,
}

impl ActivityTracker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            last_seen: Mutex::new(Instant::now()),
        })
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap() = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_seen.lock().unwrap().elapsed()
    }
}

pub(crate) struct SharedCounters {
    pub(crate) bytes_in: AtomicU64,
    pub(crate) bytes_out: AtomicU64,
    pub(crate) dropped_frames: AtomicU64,
}

impl SharedCounters {
    pub(crate) fn new() -> Self {
        Self {
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }
}

pub(crate) struct ConnectionParams {
    pub(crate) id: u64,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) config: Arc<RtmpServerConfig>,
    pub(crate) callbacks: Arc<ServerCallbacks>,
    pub(crate) counters: Arc<SharedCounters>,
    pub(crate) stream_metadata: Arc<Mutex<std::collections::HashMap<String, StreamMetadata>>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) activity: Arc<ActivityTracker>,
}

/// Runs a connection to completion. Never returns an `Err` to the caller:
/// every failure is logged and reported through the lifecycle callback, then
/// swallowed, because one connection's failure must not affect any other.
pub(crate) async fn run(stream: TcpStream, params: ConnectionParams) {
    let ConnectionParams {
        id,
        remote_addr,
        config,
        callbacks,
        counters,
        stream_metadata,
        cancel,
        activity,
    } = params;

    callbacks.fire_lifecycle(
        ConnectionInfo {
            id,
            remote_addr,
            role: ConnectionRole::Unknown,
            phase: ConnectionPhase::New,
            close_cause: None,
        },
        ConnectionEventKind::Opened,
    );

    let (role, cause) = match serve(
        stream,
        id,
        remote_addr,
        &config,
        &callbacks,
        &counters,
        &stream_metadata,
        &cancel,
        &activity,
    )
    .await
    {
        Ok(role) => (role, None),
        Err((role, err)) => {
            warn!(connection_id = id, %remote_addr, error = %err, "connection closed with error");
            (role, Some(err.to_string()))
        }
    };

    callbacks.fire_lifecycle(
        ConnectionInfo {
            id,
            remote_addr,
            role,
            phase: ConnectionPhase::Closed,
            close_cause: cause,
        },
        ConnectionEventKind::Closed,
    );
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    stream: TcpStream,
    id: u64,
    remote_addr: SocketAddr,
    config: &RtmpServerConfig,
    callbacks: &ServerCallbacks,
    counters: &SharedCounters,
    stream_metadata: &Mutex<std::collections::HashMap<String, StreamMetadata>>,
    cancel: &CancellationToken,
    activity: &ActivityTracker,
) -> Result<ConnectionRole, (ConnectionRole, ConnectionError)> {
    let stream = HandshakeServer::new(stream)
        .handshake(false)
        .await
        .map_err(|e| (ConnectionRole::Unknown, ConnectionError::from(e)))?;
    activity.touch();
    debug!(connection_id = id, "handshake complete");

    let mut conn = Connection {
        id,
        remote_addr,
        stream,
        read_buf: BytesMut::with_capacity(4096),
        decoder: ChunkDecoder::new(config.max_message_size),
        encoder: ChunkEncoder::new(chunk_consts::DEFAULT_CHUNK_SIZE),
        config,
        callbacks,
        counters,
        stream_metadata,
        cancel,
        activity,
        phase: ConnectionPhase::ConnectWait,
        role: ConnectionRole::Unknown,
        app: String::new(),
        stream_name: String::new(),
        next_stream_id: FIRST_STREAM_ID,
        active_stream_id: 0,
        bytes_received_total: 0,
        acked_windows: 0,
        inbound_window_ack_size: 0,
        outbound_window_ack_size: config.default_window_ack_size,
    };

    let result = conn.drive().await;
    match result {
        Ok(()) => Ok(conn.role),
        Err(err) => Err((conn.role, err)),
    }
}

struct Connection<'a> {
    id: u64,
    remote_addr: SocketAddr,
    stream: TcpStream,
    read_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    config: &'a RtmpServerConfig,
    callbacks: &'a ServerCallbacks,
    counters: &'a SharedCounters,
    stream_metadata: &'a Mutex<std::collections::HashMap<String, StreamMetadata>>,
    cancel: &'a CancellationToken,
    activity: &'a ActivityTracker,

    phase: ConnectionPhase,
    role: ConnectionRole,
    app: String,
    stream_name: String,
    next_stream_id: u32,
    active_stream_id: u32,
    bytes_received_total: u64,
    acked_windows: u64,
    inbound_window_ack_size: u32,
    outbound_window_ack_size: u32,
}

impl<'a> Connection<'a> {
    async fn drive(&mut self) -> ConnectionResult<()> {
        loop {
            let raw = match self.read_message().await? {
                Some(raw) => raw,
                None => return Ok(()),
            };
            let message = RtmpMessage::decode(raw)?;
            self.dispatch(message).await?;
            if self.phase == ConnectionPhase::Closed {
                return Ok(());
            }
        }
    }

    /// Reads one fully reassembled message, or `None` on a clean peer close.
    /// Cancellation (recv-timeout, expired from the dispatcher's monitor
    /// task) surfaces as a `Timeout` error.
    async fn read_message(&mut self) -> ConnectionResult<Option<chunk::Message>> {
        loop {
            if let Some(message) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(Some(message));
            }

            let mut read_tmp = [0u8; 4096];
            let n = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ConnectionError::Timeout),
                result = self.stream.read(&mut read_tmp) => result?,
            };
            if n == 0 {
                return Ok(None);
            }
            self.activity.touch();
            self.read_buf.extend_from_slice(&read_tmp[..n]);
            self.bytes_received_total += n as u64;
            self.counters.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
            self.maybe_send_ack().await?;
        }
    }

    async fn maybe_send_ack(&mut self) -> ConnectionResult<()> {
        if self.inbound_window_ack_size == 0 {
            return Ok(());
        }
        let target_windows = self.bytes_received_total / self.inbound_window_ack_size as u64;
        while self.acked_windows < target_windows {
            self.acked_windows += 1;
            self.send_protocol_control(ProtocolControlMessage::Acknowledgement {
                sequence_number: self.bytes_received_total as u32,
            })
            .await?;
        }
        Ok(())
    }

    async fn send_message(&mut self, csid: u32, message: chunk::Message) -> ConnectionResult<()> {
        let mut buf = BytesMut::new();
        self.encoder.encode_message(csid, &message, &mut buf)?;
        self.stream.write_all(&buf).await?;
        self.counters
            .bytes_out
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn send_protocol_control(&mut self, msg: ProtocolControlMessage) -> ConnectionResult<()> {
        let chunk_message = message::encode_protocol_control(msg)?;
        self.send_message(protocol_control::CSID, chunk_message).await
    }

    async fn send_user_control(&mut self, event: UserControlEvent) -> ConnectionResult<()> {
        let chunk_message = message::encode_user_control(event)?;
        self.send_message(user_control::CSID, chunk_message).await
    }

    async fn send_command(&mut self, message_stream_id: u32, values: Vec<Value>) -> ConnectionResult<()> {
        let chunk_message = message::encode_command(message_stream_id, 0, &values)?;
        self.send_message(commands::CONNECT_CSID, chunk_message).await
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote_addr: self.remote_addr,
            role: self.role,
            phase: self.phase,
            close_cause: None,
        }
    }

    async fn dispatch(&mut self, message: RtmpMessage) -> ConnectionResult<()> {
        match message.body {
            RtmpMessageBody::ProtocolControl(pc) => self.handle_protocol_control(pc).await,
            RtmpMessageBody::UserControl(event) => self.handle_user_control(event).await,
            RtmpMessageBody::Command(command) => {
                self.handle_command(command, message.message_stream_id).await
            }
            RtmpMessageBody::Data(values) => {
                self.handle_data(values, message.timestamp);
                Ok(())
            }
            RtmpMessageBody::Audio(payload) => {
                self.handle_frame(false, message.timestamp, payload);
                Ok(())
            }
            RtmpMessageBody::Video(payload) => {
                let is_keyframe = payload.first().is_some_and(|b| (b >> 4) == 1);
                self.handle_frame(is_keyframe, message.timestamp, payload);
                Ok(())
            }
        }
    }

    async fn handle_protocol_control(&mut self, pc: ProtocolControlMessage) -> ConnectionResult<()> {
        match pc {
            ProtocolControlMessage::SetChunkSize { chunk_size } => {
                if !(MIN_SET_CHUNK_SIZE..=self.config.inbound_chunk_size_cap).contains(&chunk_size)
                {
                    return Err(ConnectionError::Protocol(format!(
                        "peer requested out-of-range chunk size {chunk_size}"
                    )));
                }
                self.decoder.set_chunk_size(chunk_size);
            }
            ProtocolControlMessage::Abort { chunk_stream_id } => {
                self.decoder.abort(chunk_stream_id);
            }
            ProtocolControlMessage::Acknowledgement { sequence_number } => {
                debug!(connection_id = self.id, sequence_number, "peer acknowledged");
            }
            ProtocolControlMessage::WindowAckSize { size } => {
                self.inbound_window_ack_size = size;
            }
            ProtocolControlMessage::SetPeerBandwidth { size, limit_type } => {
                if matches!(limit_type, LimitType::Hard | LimitType::Dynamic)
                    && size != self.outbound_window_ack_size
                {
                    self.outbound_window_ack_size = size;
                    self.send_protocol_control(ProtocolControlMessage::WindowAckSize { size })
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_user_control(&mut self, event: UserControlEvent) -> ConnectionResult<()> {
        if let UserControlEvent::PingRequest { timestamp } = event {
            self.send_user_control(UserControlEvent::PingResponse { timestamp })
                .await?;
        }
        Ok(())
    }

    fn handle_data(&mut self, values: Vec<Value>, timestamp: u32) {
        let Some(name) = values.first().and_then(|v| v.try_as_str()) else {
            return;
        };
        if name != "@setDataFrame" && name != "onMetaData" {
            return;
        }
        let Some(object) = values.iter().find(|v| matches!(v, Value::Object(_) | Value::ECMAArray(_)))
        else {
            return;
        };
        const METADATA_KEYS: &[&str] = &[
            "width",
            "height",
            "framerate",
            "videodatarate",
            "audiodatarate",
            "audiosamplerate",
            "audiochannels",
            "stereo",
        ];
        let properties: Vec<(String, Value)> = METADATA_KEYS
            .iter()
            .filter_map(|key| object.object_get(key).map(|v| (key.to_string(), v.clone())))
            .collect();

        let metadata = StreamMetadata {
            stream_name: self.stream_name.clone(),
            properties,
        };
        self.stream_metadata
            .lock()
            .unwrap()
            .insert(self.stream_name.clone(), metadata.clone());
        self.callbacks.fire_metadata(metadata);
        debug!(connection_id = self.id, timestamp, "metadata updated");
    }

    fn handle_frame(&mut self, is_keyframe: bool, timestamp: u32, payload: Vec<u8>) {
        if self.stream_name.is_empty() {
            self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let disconnect = self.callbacks.fire_frame(FrameEvent {
            stream_name: self.stream_name.clone(),
            timestamp,
            payload,
            is_keyframe,
        });
        if disconnect {
            self.phase = ConnectionPhase::Closed;
        }
    }

    async fn handle_command(&mut self, command: Command, message_stream_id: u32) -> ConnectionResult<()> {
        match command {
            Command::Connect {
                transaction_id,
                app,
                object_encoding,
                ..
            } => self.handle_connect(transaction_id, app, object_encoding).await,
            Command::CreateStream { transaction_id } => self.handle_create_stream(transaction_id).await,
            Command::Publish {
                transaction_id,
                publishing_name,
                ..
            } => self.handle_publish(transaction_id, publishing_name).await,
            Command::Play {
                transaction_id,
                stream_name,
                ..
            } => self.handle_play(transaction_id, stream_name).await,
            Command::Pause {
                transaction_id,
                pause_flag,
                ..
            } => self.handle_pause(transaction_id, pause_flag).await,
            Command::DeleteStream { stream_id, .. } => {
                self.handle_delete_stream(stream_id, message_stream_id).await
            }
            Command::CloseStream { .. } => {
                info!(connection_id = self.id, "closeStream received, closing connection");
                self.phase = ConnectionPhase::Closed;
                Ok(())
            }
            Command::Unknown {
                name,
                transaction_id,
                ..
            } => {
                debug!(connection_id = self.id, command = %name, "unknown command");
                if transaction_id != 0.0 {
                    self.send_command(
                        message_stream_id,
                        commands::error_response(
                            transaction_id,
                            "NetConnection.Call.Failed",
                            "method not implemented",
                        ),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    async fn handle_connect(
        &mut self,
        transaction_id: f64,
        app: String,
        object_encoding: Option<f64>,
    ) -> ConnectionResult<()> {
        if object_encoding == Some(3.0) {
            self.send_command(
                0,
                commands::error_response(
                    transaction_id,
                    "NetConnection.Connect.Failed",
                    "AMF3 object encoding is not supported",
                ),
            )
            .await?;
            return Err(ConnectionError::Protocol(
                "peer requested AMF3 object encoding".to_owned(),
            ));
        }

        self.app = app;

        self.send_protocol_control(ProtocolControlMessage::WindowAckSize {
            size: self.config.default_window_ack_size,
        })
        .await?;
        self.send_protocol_control(ProtocolControlMessage::SetPeerBandwidth {
            size: self.config.default_peer_bandwidth,
            limit_type: self.config.default_peer_bandwidth_limit_type,
        })
        .await?;
        self.encoder.set_chunk_size(self.config.outbound_chunk_size);
        self.send_protocol_control(ProtocolControlMessage::SetChunkSize {
            chunk_size: self.config.outbound_chunk_size,
        })
        .await?;
        self.send_user_control(UserControlEvent::StreamBegin { stream_id: 0 })
            .await?;
        self.send_command(
            0,
            commands::connect_result(transaction_id, SERVER_FMS_VERSION, SERVER_CAPABILITIES),
        )
        .await?;

        self.phase = ConnectionPhase::Connected;
        info!(connection_id = self.id, app = %self.app, "connected");
        Ok(())
    }

    async fn handle_create_stream(&mut self, transaction_id: f64) -> ConnectionResult<()> {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;
        self.active_stream_id = stream_id;

        self.send_command(
            0,
            commands::create_stream_result(transaction_id, stream_id as f64),
        )
        .await?;

        self.phase = ConnectionPhase::CreatedStream;
        Ok(())
    }

    async fn handle_publish(&mut self, _transaction_id: f64, publishing_name: String) -> ConnectionResult<()> {
        self.stream_name = publishing_name;
        self.role = ConnectionRole::Publisher;

        self.send_user_control(UserControlEvent::StreamBegin {
            stream_id: self.active_stream_id,
        })
        .await?;
        self.send_command(
            self.active_stream_id,
            commands::on_status("status", "NetStream.Publish.Start", "publish started"),
        )
        .await?;

        self.phase = ConnectionPhase::Publishing;
        info!(connection_id = self.id, stream = %self.stream_name, "publishing");
        Ok(())
    }

    async fn handle_play(&mut self, _transaction_id: f64, stream_name: String) -> ConnectionResult<()> {
        self.stream_name = stream_name;
        self.role = ConnectionRole::Subscriber;

        self.send_user_control(UserControlEvent::StreamBegin {
            stream_id: self.active_stream_id,
        })
        .await?;
        self.send_command(
            self.active_stream_id,
            commands::on_status("status", "NetStream.Play.Reset", "playback reset"),
        )
        .await?;
        self.send_command(
            self.active_stream_id,
            commands::on_status("status", "NetStream.Play.Start", "playback started"),
        )
        .await?;

        self.phase = ConnectionPhase::Playing;
        info!(connection_id = self.id, stream = %self.stream_name, "playing");
        Ok(())
    }

    async fn handle_pause(&mut self, _transaction_id: f64, pause_flag: bool) -> ConnectionResult<()> {
        let (code, description) = if pause_flag {
            ("NetStream.Pause.Notify", "paused")
        } else {
            ("NetStream.Unpause.Notify", "resumed")
        };
        self.send_command(
            self.active_stream_id,
            commands::on_status("status", code, description),
        )
        .await
    }

    async fn handle_delete_stream(&mut self, stream_id: f64, _message_stream_id: u32) -> ConnectionResult<()> {
        if stream_id as u32 == self.active_stream_id {
            self.active_stream_id = 0;
            self.stream_name.clear();
        }
        self.phase = ConnectionPhase::Connected;
        Ok(())
    }
}

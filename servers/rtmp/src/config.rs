use rtmp_formats::protocol_control::LimitType;

#[derive(Debug, Clone)]
pub struct RtmpServerConfig {
    pub port: u16,
    pub max_connections: u32,
    pub recv_timeout_seconds: u32,
    /// What we advertise to the peer via `Set Chunk Size` right after
    /// `connect`. The peer's own `Set Chunk Size` to us is independent and
    /// always clamped to the wire-mandated [128, 65536] regardless of this.
    pub outbound_chunk_size: u32,
    /// Upper bound on a peer's `Set Chunk Size`; requests above this are
    /// rejected rather than clamped.
    pub inbound_chunk_size_cap: u32,
    pub default_window_ack_size: u32,
    pub default_peer_bandwidth: u32,
    pub default_peer_bandwidth_limit_type: LimitType,
    pub max_message_size: u32,
}

impl Default for RtmpServerConfig {
    fn default() -> Self {
        Self {
            port: 1935,
            max_connections: 10,
            recv_timeout_seconds: 30,
            outbound_chunk_size: 4096,
            inbound_chunk_size_cap: 65536,
            default_window_ack_size: 2_500_000,
            default_peer_bandwidth: 2_500_000,
            default_peer_bandwidth_limit_type: LimitType::Dynamic,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

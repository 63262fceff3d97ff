use std::{env, path::PathBuf};

use config::{Config, Environment, File};
use rtmp_formats::protocol_control::LimitType;
use rtmp_server::config::RtmpServerConfig;
use serde::Deserialize;

use crate::{
    cli::AppCli,
    errors::AppResult,
    util::parse_log_level,
};

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub(crate) struct Logger {
    pub(crate) level: String,
    pub(crate) dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PeerBandwidthLimitType {
    Hard,
    Soft,
    Dynamic,
}

impl From<PeerBandwidthLimitType> for LimitType {
    fn from(value: PeerBandwidthLimitType) -> Self {
        match value {
            PeerBandwidthLimitType::Hard => LimitType::Hard,
            PeerBandwidthLimitType::Soft => LimitType::Soft,
            PeerBandwidthLimitType::Dynamic => LimitType::Dynamic,
        }
    }
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub(crate) struct RtmpServer {
    pub(crate) port: u16,
    pub(crate) max_connections: u32,
    pub(crate) recv_timeout_seconds: u32,
    pub(crate) outbound_chunk_size: u32,
    pub(crate) inbound_chunk_size_cap: u32,
    pub(crate) default_window_ack_size: u32,
    pub(crate) default_peer_bandwidth: u32,
    pub(crate) default_peer_bandwidth_limit_type: PeerBandwidthLimitType,
    pub(crate) max_message_size: u32,
}

impl From<&RtmpServer> for RtmpServerConfig {
    fn from(value: &RtmpServer) -> Self {
        Self {
            port: value.port,
            max_connections: value.max_connections,
            recv_timeout_seconds: value.recv_timeout_seconds,
            outbound_chunk_size: value.outbound_chunk_size,
            inbound_chunk_size_cap: value.inbound_chunk_size_cap,
            default_window_ack_size: value.default_window_ack_size,
            default_peer_bandwidth: value.default_peer_bandwidth,
            default_peer_bandwidth_limit_type: value.default_peer_bandwidth_limit_type.into(),
            max_message_size: value.max_message_size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub(crate) struct AppConfig {
    pub(crate) logger: Logger,
    pub(crate) rtmp_server: RtmpServer,
}

impl AppConfig {
    pub(crate) fn load(config_path: Option<String>) -> AppResult<Self> {
        let config_path_composed = config_path.or_else(|| env::var("RTMP_CONFIG").ok());
        let defaults = RtmpServerConfig::default();

        let mut builder = Config::builder()
            .set_default("logger.level", "info")?
            .set_default("logger.dir", ".")?
            .set_default("rtmp_server.port", defaults.port as i64)?
            .set_default("rtmp_server.max_connections", defaults.max_connections as i64)?
            .set_default(
                "rtmp_server.recv_timeout_seconds",
                defaults.recv_timeout_seconds as i64,
            )?
            .set_default(
                "rtmp_server.outbound_chunk_size",
                defaults.outbound_chunk_size as i64,
            )?
            .set_default(
                "rtmp_server.inbound_chunk_size_cap",
                defaults.inbound_chunk_size_cap as i64,
            )?
            .set_default(
                "rtmp_server.default_window_ack_size",
                defaults.default_window_ack_size as i64,
            )?
            .set_default(
                "rtmp_server.default_peer_bandwidth",
                defaults.default_peer_bandwidth as i64,
            )?
            .set_default("rtmp_server.default_peer_bandwidth_limit_type", "dynamic")?
            .set_default("rtmp_server.max_message_size", defaults.max_message_size as i64)?;

        if let Some(path) = &config_path_composed {
            builder = builder.add_source(File::with_name(path));
        }
        // Double-underscore nesting (`RTMP__rtmp_server__port`) so that field
        // names which are themselves snake_case (`rtmp_server`,
        // `recv_timeout_seconds`, ...) don't get mistaken for section
        // boundaries.
        let result = builder
            .add_source(
                Environment::with_prefix("rtmp")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let config = result.try_deserialize()?;
        Ok(config)
    }

    pub(crate) fn apply(&mut self, cli_args: AppCli) {
        if let Some(level) = cli_args.log_level {
            self.logger.level = level;
        }
        if let Some(port) = cli_args.rtmp_port {
            self.rtmp_server.port = port;
        }
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        let _ = parse_log_level(&self.logger.level)?;
        Ok(())
    }

    pub(crate) fn rtmp_server_config(&self) -> RtmpServerConfig {
        (&self.rtmp_server).into()
    }
}

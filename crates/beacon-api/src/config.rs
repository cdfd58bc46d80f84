//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use beacon_core::metadata::DEFAULT_BYTE_CEILING;
use beacon_core::observability::LogFormat;

/// Default stitch queue capacity.
pub const DEFAULT_STITCH_QUEUE_CAPACITY: usize = 1024;

/// API server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Socket address to bind.
    pub bind_addr: SocketAddr,
    /// Log output format.
    pub log_format: LogFormat,
    /// Serialized metadata byte ceiling per event.
    pub metadata_byte_ceiling: usize,
    /// Bounded stitch queue capacity.
    pub stitch_queue_capacity: usize,
    /// Local data directory; when unset, an in-memory backend is used
    /// (development only).
    pub data_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_format: LogFormat::Pretty,
            metadata_byte_ceiling: DEFAULT_BYTE_CEILING,
            stitch_queue_capacity: DEFAULT_STITCH_QUEUE_CAPACITY,
            data_dir: None,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `BEACON_BIND_ADDR`: bind address (default `127.0.0.1:8080`)
    /// - `BEACON_LOG_FORMAT`: `json` or `pretty`
    /// - `BEACON_METADATA_BYTE_CEILING`: metadata size bound in bytes
    /// - `BEACON_STITCH_QUEUE_CAPACITY`: stitch queue depth
    /// - `BEACON_DATA_DIR`: local storage root
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("BEACON_BIND_ADDR") {
            if let Ok(addr) = raw.parse() {
                config.bind_addr = addr;
            } else {
                tracing::warn!(raw, "ignoring unparsable BEACON_BIND_ADDR");
            }
        }
        if let Ok(raw) = std::env::var("BEACON_LOG_FORMAT") {
            config.log_format = match raw.as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(raw) = std::env::var("BEACON_METADATA_BYTE_CEILING") {
            if let Ok(ceiling) = raw.parse() {
                config.metadata_byte_ceiling = ceiling;
            }
        }
        if let Ok(raw) = std::env::var("BEACON_STITCH_QUEUE_CAPACITY") {
            if let Ok(capacity) = raw.parse() {
                config.stitch_queue_capacity = capacity;
            }
        }
        if let Ok(raw) = std::env::var("BEACON_DATA_DIR") {
            if !raw.is_empty() {
                config.data_dir = Some(PathBuf::from(raw));
            }
        }

        config
    }
}

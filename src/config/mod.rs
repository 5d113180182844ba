//! Configuration for the tierfs client.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TierFsError};

/// Default block size: unit of allocation at the metadata service.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;
/// Default native buffer size used for stream windows.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
/// Default size of one memory-mapped pool region.
pub const DEFAULT_REGION_SIZE: u64 = 1024 * 1024 * 1024;

/// Main configuration for a tierfs client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    /// Block allocation unit of the metadata service.
    pub block_size: u64,
    /// Buffer pool configuration.
    pub buffer: BufferConfig,
    /// Metadata RPC and data transfer timeouts.
    pub rpc: RpcConfig,
    /// Stream behavior configuration.
    pub stream: StreamConfig,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            buffer: BufferConfig::default(),
            rpc: RpcConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl FsConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierFsError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(TierFsError::InvalidConfig {
                field: "block_size".to_string(),
                reason: "Block size must be non-zero".to_string(),
            });
        }

        if self.buffer.buffer_size == 0 {
            return Err(TierFsError::InvalidConfig {
                field: "buffer.buffer_size".to_string(),
                reason: "Buffer size must be non-zero".to_string(),
            });
        }

        if self.buffer.pool_limit > 0 {
            if self.buffer.region_size % self.buffer.buffer_size as u64 != 0 {
                return Err(TierFsError::InvalidConfig {
                    field: "buffer.region_size".to_string(),
                    reason: "Region size must be a multiple of the buffer size".to_string(),
                });
            }
            if self.buffer.pool_limit % self.buffer.region_size != 0 {
                return Err(TierFsError::InvalidConfig {
                    field: "buffer.pool_limit".to_string(),
                    reason: "Pool limit must be a multiple of the region size".to_string(),
                });
            }
        }

        if self.rpc.rpc_timeout.is_zero() || self.rpc.data_timeout.is_zero() {
            return Err(TierFsError::InvalidConfig {
                field: "rpc".to_string(),
                reason: "Timeouts must be non-zero".to_string(),
            });
        }

        if self.stream.max_in_flight == 0 {
            return Err(TierFsError::InvalidConfig {
                field: "stream.max_in_flight".to_string(),
                reason: "At least one in-flight window is required".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration: small blocks and windows,
    /// heap-backed pool, suitable for tests.
    pub fn development() -> Self {
        Self {
            block_size: 64 * 1024,
            buffer: BufferConfig {
                buffer_size: 64 * 1024,
                region_size: 1024 * 1024,
                pool_limit: 0,
                cache_dir: PathBuf::from("/tmp/tierfs/dev-cache"),
            },
            rpc: RpcConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

/// Native buffer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Size of each pooled buffer; also the stream window size.
    pub buffer_size: usize,
    /// Size of one memory-mapped region, sliced into buffers.
    pub region_size: u64,
    /// Total bytes of mapped pool memory. Zero disables mapped regions;
    /// buffers then come from the heap on demand.
    pub pool_limit: u64,
    /// Directory holding the backing files for mapped regions.
    pub cache_dir: PathBuf,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            region_size: DEFAULT_REGION_SIZE,
            pool_limit: DEFAULT_REGION_SIZE,
            cache_dir: PathBuf::from("/tmp/tierfs/cache"),
        }
    }
}

/// Timeout configuration for metadata RPCs and block transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Bound on a single metadata RPC.
    #[serde(with = "duration_str")]
    pub rpc_timeout: Duration,
    /// Bound on waiting for one block transfer to complete.
    #[serde(with = "duration_str")]
    pub data_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_millis(1000),
            data_timeout: Duration::from_millis(1000),
        }
    }
}

/// Stream behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Maximum windows in flight per output stream before writes apply
    /// backpressure.
    pub max_in_flight: usize,
    /// Prefetch the next block's location during sequential access.
    pub read_ahead: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            read_ahead: true,
        }
    }
}

/// Serde adapter for durations written as suffixed strings: `"500ms"`,
/// `"2s"`, `"1m"`. A bare number counts as milliseconds.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let text = text.trim();
        let (digits, ms_per_unit) = if let Some(v) = text.strip_suffix("ms") {
            (v, 1)
        } else if let Some(v) = text.strip_suffix('s') {
            (v, 1000)
        } else if let Some(v) = text.strip_suffix('m') {
            (v, 60_000)
        } else {
            (text, 1)
        };
        digits
            .parse::<u64>()
            .map(|v| Duration::from_millis(v * ms_per_unit))
            .map_err(|e| serde::de::Error::custom(format!("bad duration {text:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FsConfig {
        FsConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            buffer: BufferConfig::default(),
            rpc: RpcConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
        assert!(FsConfig::development().validate().is_ok());
    }

    #[test]
    fn test_region_must_divide_into_buffers() {
        let mut config = valid();
        config.buffer.region_size = DEFAULT_REGION_SIZE + 17;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_limit_must_be_region_multiple() {
        let mut config = valid();
        config.buffer.pool_limit = DEFAULT_REGION_SIZE + DEFAULT_REGION_SIZE / 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heap_pool_skips_region_checks() {
        let mut config = valid();
        config.buffer.pool_limit = 0;
        config.buffer.region_size = 12345;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid();
        config.rpc.data_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_parsing() {
        let json = r#"{"rpc_timeout": "2s", "data_timeout": "500ms"}"#;
        let rpc: RpcConfig = serde_json::from_str(json).unwrap();
        assert_eq!(rpc.rpc_timeout, Duration::from_secs(2));
        assert_eq!(rpc.data_timeout, Duration::from_millis(500));

        let json = r#"{"rpc_timeout": "1m", "data_timeout": "250"}"#;
        let rpc: RpcConfig = serde_json::from_str(json).unwrap();
        assert_eq!(rpc.rpc_timeout, Duration::from_secs(60));
        assert_eq!(rpc.data_timeout, Duration::from_millis(250));

        let bad: std::result::Result<RpcConfig, _> =
            serde_json::from_str(r#"{"rpc_timeout": "soon", "data_timeout": "1s"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let config = valid();
        let json = serde_json::to_string(&config).unwrap();
        let back: FsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.block_size, config.block_size);
        assert_eq!(back.rpc.rpc_timeout, config.rpc.rpc_timeout);
    }
}

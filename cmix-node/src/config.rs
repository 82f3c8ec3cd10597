//! The configuration record a node is started from (spec §6's CLI
//! surface: `{configPath, logPath, batchSize, index, registrationCode}`).
//!
//! Parsing this from YAML/CLI flags is `cmix-node-cli`'s job; this type
//! is the neutral shape both that binary and this crate agree on.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything a node needs to start precomputing and executing rounds,
/// independent of how it was loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's position in its circuit(s). Topology itself arrives
    /// per-round via `RoundInfo`; this is the identity a node presents
    /// to the permissioning layer.
    pub index: u32,
    /// The registration code handed to the (out-of-scope)
    /// gateway/permissioning handshake.
    pub registration_code: String,
    /// Default batch size, used only until the first `RoundInfo`
    /// supplies one.
    pub batch_size: u32,
    /// Where to write structured logs.
    pub log_path: PathBuf,
    /// Where to persist (and recover) an [`crate::error_record::ErrorRecord`]
    /// on `Error`.
    pub error_record_path: PathBuf,
    /// Grace period the resource queue gets to shut down before a node
    /// in `Error` escalates to `Crash` (spec §5: "5s grace").
    #[serde(with = "humantime_serde")]
    pub resource_queue_kill_grace: Duration,
}

impl NodeConfig {
    /// A config with the spec's documented 5s kill grace and otherwise
    /// caller-supplied values.
    pub fn new(index: u32, registration_code: String, batch_size: u32, log_path: PathBuf, error_record_path: PathBuf) -> Self {
        Self {
            index,
            registration_code,
            batch_size,
            log_path,
            error_record_path,
            resource_queue_kill_grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = NodeConfig::new(2, "abc123".to_string(), 32, "/var/log/cmix.log".into(), "/var/lib/cmix/error.hex".into());
        let json = serde_json::to_string(&config).unwrap();
        let parsed: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.resource_queue_kill_grace, config.resource_queue_kill_grace);
    }
}

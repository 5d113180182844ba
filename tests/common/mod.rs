//! Common test utilities for integration tests.

pub mod fixtures;
pub mod sim;

// Re-export common types
pub use fixtures::*;
pub use sim::*;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tierfs::client::TierFs;
use tierfs::config::FsConfig;
use tierfs::rpc::MetadataClient;
use tierfs::storage::StorageTransport;
use tierfs::types::{LocationClass, NodeInfo, StorageClass, StorageTier};

/// A simulated cluster: one metadata partition and one DRAM-tier transport,
/// both surviving across client mounts so tests can close a client and
/// reopen the same namespace.
pub struct SimCluster {
    pub meta: Arc<SimMetadata>,
    pub transport: Arc<SimTransport>,
    pub config: FsConfig,
}

impl SimCluster {
    pub fn new() -> Self {
        init_tracing();
        let config = FsConfig::development();
        let nodes = vec![sim_node(50020), sim_node(50021)];
        Self {
            meta: Arc::new(SimMetadata::new(config.block_size, nodes)),
            transport: Arc::new(SimTransport::new()),
            config,
        }
    }

    /// Mount a fresh client over this cluster.
    pub fn mount(&self) -> TierFs {
        let partitions: Vec<Arc<dyn MetadataClient>> =
            vec![Arc::clone(&self.meta) as Arc<dyn MetadataClient>];
        TierFs::mount(self.config.clone(), partitions, self.transports())
            .expect("mount simulated cluster")
    }

    /// Mount a client over several independent metadata partitions sharing
    /// this cluster's transport.
    pub fn mount_partitioned(&self, metas: Vec<Arc<SimMetadata>>) -> TierFs {
        let partitions: Vec<Arc<dyn MetadataClient>> = metas
            .into_iter()
            .map(|m| m as Arc<dyn MetadataClient>)
            .collect();
        TierFs::mount(self.config.clone(), partitions, self.transports())
            .expect("mount partitioned cluster")
    }

    fn transports(&self) -> HashMap<StorageTier, Arc<dyn StorageTransport>> {
        let mut transports: HashMap<StorageTier, Arc<dyn StorageTransport>> = HashMap::new();
        transports.insert(
            StorageTier::Dram,
            Arc::clone(&self.transport) as Arc<dyn StorageTransport>,
        );
        transports
    }
}

impl Default for SimCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test log subscriber once per binary; `RUST_LOG` filters it.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A DRAM-tier node at 127.0.0.1 on the given port.
pub fn sim_node(port: u16) -> NodeInfo {
    NodeInfo {
        tier: StorageTier::Dram,
        storage_class: StorageClass::ANY,
        location_class: LocationClass::DEFAULT,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
    }
}

//! Partition-sharded routing of metadata operations.
//!
//! Namespace operations route by the leading path component's hash and
//! block operations by descriptor, so every operation on one file lands on
//! the partition that owns it. Rename exists only within a partition:
//! routing the source and destination to different partitions fails fast,
//! no distributed transaction is attempted. Operations with no file
//! affinity spread round-robin.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{CreateResponse, LookupResponse, MetadataClient};
use crate::error::{Result, TierFsError};
use crate::types::{BlockLocation, Fd, FileInfo, FileName, FileType, LocationClass, StorageClass, Token};

/// Deterministic router over the metadata partitions.
pub struct MetadataRouter {
    partitions: Vec<Arc<dyn MetadataClient>>,
    cursor: AtomicUsize,
}

impl MetadataRouter {
    pub fn new(partitions: Vec<Arc<dyn MetadataClient>>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(TierFsError::InvalidConfig {
                field: "metadata partitions".to_string(),
                reason: "at least one partition connection is required".to_string(),
            });
        }
        Ok(Self {
            partitions,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Reduce a signed hash into a partition index.
    fn index_for(&self, component: i64) -> usize {
        let n = self.partitions.len() as i64;
        (((component % n) + n) % n) as usize
    }

    fn by_name(&self, name: &FileName) -> &Arc<dyn MetadataClient> {
        &self.partitions[self.index_for(name.head())]
    }

    fn by_fd(&self, fd: Fd) -> &Arc<dyn MetadataClient> {
        &self.partitions[self.index_for(fd as i64)]
    }

    fn round_robin(&self) -> &Arc<dyn MetadataClient> {
        let next = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.partitions[next % self.partitions.len()]
    }
}

#[async_trait]
impl MetadataClient for MetadataRouter {
    async fn create_file(
        &self,
        name: &FileName,
        file_type: FileType,
        storage_class: StorageClass,
        location_class: LocationClass,
    ) -> Result<CreateResponse> {
        self.by_name(name)
            .create_file(name, file_type, storage_class, location_class)
            .await
    }

    async fn lookup_file(&self, name: &FileName, writeable: bool) -> Result<LookupResponse> {
        self.by_name(name).lookup_file(name, writeable).await
    }

    async fn remove_file(&self, name: &FileName) -> Result<FileInfo> {
        self.by_name(name).remove_file(name).await
    }

    async fn rename_file(&self, src: &FileName, dst: &FileName) -> Result<()> {
        let src_index = self.index_for(src.head());
        let dst_index = self.index_for(dst.head());
        if src_index != dst_index {
            debug!(src_index, dst_index, "rename spans partitions, refusing");
            return Err(TierFsError::CrossPartitionRename);
        }
        self.partitions[src_index].rename_file(src, dst).await
    }

    async fn set_file(&self, file: &FileInfo, close: bool) -> Result<()> {
        self.by_fd(file.fd).set_file(file, close).await
    }

    async fn get_block(
        &self,
        fd: Fd,
        token: Token,
        position: u64,
        capacity: u64,
    ) -> Result<BlockLocation> {
        self.by_fd(fd).get_block(fd, token, position, capacity).await
    }

    async fn get_location(&self, name: &FileName, position: u64) -> Result<BlockLocation> {
        self.by_name(name).get_location(name, position).await
    }

    async fn ping(&self) -> Result<()> {
        self.round_robin().ping().await
    }

    async fn close(&self) -> Result<()> {
        let mut first_err = None;
        for partition in &self.partitions {
            if let Err(e) = partition.close().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicU64;
    use std::time::SystemTime;

    use crate::types::{NodeInfo, StorageTier};

    /// Counts calls; every operation succeeds with canned data.
    #[derive(Default)]
    struct CountingClient {
        calls: AtomicU64,
    }

    impl CountingClient {
        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        fn canned_block() -> BlockLocation {
            BlockLocation {
                node: NodeInfo {
                    tier: StorageTier::Dram,
                    storage_class: Default::default(),
                    location_class: Default::default(),
                    addr: SocketAddr::from(([127, 0, 0, 1], 50020)),
                },
                lba: 0,
                addr: 0,
                length: 65536,
                rkey: 0,
            }
        }

        fn canned_file(fd: Fd) -> FileInfo {
            FileInfo {
                fd,
                file_type: FileType::RegularFile,
                capacity: 0,
                token: 1,
                modified: SystemTime::UNIX_EPOCH,
            }
        }
    }

    #[async_trait]
    impl MetadataClient for CountingClient {
        async fn create_file(
            &self,
            _name: &FileName,
            _file_type: FileType,
            _storage_class: StorageClass,
            _location_class: LocationClass,
        ) -> Result<CreateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CreateResponse {
                file: Self::canned_file(1),
                file_block: Self::canned_block(),
            })
        }

        async fn lookup_file(&self, _name: &FileName, _writeable: bool) -> Result<LookupResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LookupResponse {
                file: Self::canned_file(1),
                file_block: Self::canned_block(),
            })
        }

        async fn remove_file(&self, _name: &FileName) -> Result<FileInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::canned_file(1))
        }

        async fn rename_file(&self, _src: &FileName, _dst: &FileName) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_file(&self, _file: &FileInfo, _close: bool) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_block(
            &self,
            _fd: Fd,
            _token: Token,
            _position: u64,
            _capacity: u64,
        ) -> Result<BlockLocation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::canned_block())
        }

        async fn get_location(&self, _name: &FileName, _position: u64) -> Result<BlockLocation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::canned_block())
        }

        async fn ping(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn router(n: usize) -> (MetadataRouter, Vec<Arc<CountingClient>>) {
        let clients: Vec<Arc<CountingClient>> =
            (0..n).map(|_| Arc::new(CountingClient::default())).collect();
        let partitions: Vec<Arc<dyn MetadataClient>> = clients
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn MetadataClient>)
            .collect();
        (MetadataRouter::new(partitions).unwrap(), clients)
    }

    #[test]
    fn test_index_handles_negative_hashes() {
        let (router, _) = router(3);
        assert_eq!(router.index_for(-7), 2);
        assert_eq!(router.index_for(-3), 0);
        assert_eq!(router.index_for(5), 2);
    }

    #[tokio::test]
    async fn test_same_file_pins_one_partition() {
        let (router, clients) = router(4);
        let name = FileName::parse("/bucket/object").unwrap();

        router
            .create_file(
                &name,
                FileType::RegularFile,
                StorageClass::ANY,
                LocationClass::DEFAULT,
            )
            .await
            .unwrap();
        router.lookup_file(&name, false).await.unwrap();
        router.remove_file(&name).await.unwrap();

        let hit: Vec<u64> = clients.iter().map(|c| c.calls()).collect();
        assert_eq!(hit.iter().sum::<u64>(), 3);
        assert_eq!(hit.iter().filter(|&&n| n > 0).count(), 1, "spread: {hit:?}");
    }

    #[tokio::test]
    async fn test_block_ops_route_by_descriptor() {
        let (router, clients) = router(3);
        router.get_block(5, 1, 0, 0).await.unwrap();
        router.get_block(5, 1, 65536, 0).await.unwrap();
        assert_eq!(clients[2].calls(), 2);
        assert_eq!(clients[0].calls() + clients[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_ping_round_robins() {
        let (router, clients) = router(2);
        for _ in 0..4 {
            router.ping().await.unwrap();
        }
        assert_eq!(clients[0].calls(), 2);
        assert_eq!(clients[1].calls(), 2);
    }

    #[tokio::test]
    async fn test_cross_partition_rename_contacts_nobody() {
        let (router, clients) = router(2);

        // Pick two paths that land on different partitions.
        let candidates = ["alpha", "beta", "gamma", "delta", "epsilon"];
        let mut split = None;
        'outer: for a in candidates {
            for b in candidates {
                let src = FileName::parse(&format!("/{a}/f")).unwrap();
                let dst = FileName::parse(&format!("/{b}/f")).unwrap();
                if router.index_for(src.head()) != router.index_for(dst.head()) {
                    split = Some((src, dst));
                    break 'outer;
                }
            }
        }
        let (src, dst) = split.expect("some candidate pair must split");

        let err = router.rename_file(&src, &dst).await.unwrap_err();
        assert!(matches!(err, TierFsError::CrossPartitionRename));
        assert_eq!(clients[0].calls() + clients[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_same_partition_rename_goes_through() {
        let (router, clients) = router(2);
        let src = FileName::parse("/data/old").unwrap();
        let dst = FileName::parse("/data/new").unwrap();
        router.rename_file(&src, &dst).await.unwrap();
        assert_eq!(clients[0].calls() + clients[1].calls(), 1);
    }

    #[test]
    fn test_empty_partition_list_rejected() {
        assert!(MetadataRouter::new(Vec::new()).is_err());
    }
}

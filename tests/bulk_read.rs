// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! End-to-end coordinator scenarios over an in-memory data layer.

use async_trait::async_trait;
use cassandra_bulk_rs::prelude::*;
use maplit::hashmap;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

#[derive(Clone, Debug)]
struct MemorySSTable {
    name: String,
    status: RepairStatus,
    span: Option<TokenRange>,
}

fn table(name: impl Into<String>, status: RepairStatus) -> MemorySSTable {
    MemorySSTable {
        name: name.into(),
        status,
        span: None,
    }
}

impl SSTable for MemorySSTable {
    fn data_file_name(&self) -> &str {
        &self.name
    }

    fn repair_status(&self) -> RepairStatus {
        self.status
    }

    fn token_span(&self) -> Option<TokenRange> {
        self.span
    }
}

struct MemoryLayer {
    ring: CassandraRing,
    partitioner: TokenPartitioner,
    executor: BlockingExecutor,
    consistency: ConsistencyLevel,
    dc: Option<String>,
    availability: HashMap<String, AvailabilityHint>,
    tables: HashMap<String, Vec<MemorySSTable>>,
    failing: HashSet<String>,
    slow: HashSet<String>,
    timeout: Option<Duration>,
}

impl MemoryLayer {
    fn new(ring: CassandraRing, partitions: usize, consistency: ConsistencyLevel) -> Self {
        let partitioner = TokenPartitioner::new(&ring, partitions).unwrap();
        Self {
            ring,
            partitioner,
            executor: BlockingExecutor::new(4),
            consistency,
            dc: None,
            availability: HashMap::new(),
            tables: HashMap::new(),
            failing: HashSet::new(),
            slow: HashSet::new(),
            timeout: None,
        }
    }
}

#[async_trait]
impl PartitionedDataLayer for MemoryLayer {
    fn ring(&self) -> &CassandraRing {
        &self.ring
    }

    fn token_partitioner(&self) -> &TokenPartitioner {
        &self.partitioner
    }

    fn consistency_level(&self) -> ConsistencyLevel {
        self.consistency
    }

    fn datacenter(&self) -> Option<&str> {
        self.dc.as_deref()
    }

    fn executor(&self) -> &BlockingExecutor {
        &self.executor
    }

    fn availability(&self, instance: &CassandraInstance) -> AvailabilityHint {
        self.availability
            .get(instance.node_name())
            .copied()
            .unwrap_or_default()
    }

    fn list_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn list_instance(
        &self,
        _partition_id: usize,
        _range: &TokenRange,
        instance: &CassandraInstance,
    ) -> anyhow::Result<Vec<Arc<dyn SSTable>>> {
        if self.slow.contains(instance.node_name()) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.contains(instance.node_name()) {
            anyhow::bail!("disk failure on {}", instance);
        }
        let rows = self.tables.get(instance.node_name()).cloned().unwrap_or_default();
        self.executor
            .submit(move || {
                rows.into_iter()
                    .map(|sstable| Arc::new(sstable) as Arc<dyn SSTable>)
                    .collect()
            })
            .await
    }
}

fn simple_ring(names: &[(&str, i64)], rf: usize) -> CassandraRing {
    let instances = names
        .iter()
        .map(|(name, token)| CassandraInstance::new(*name, *token as Token, "DC1"))
        .collect();
    CassandraRing::new(Partitioner::Murmur3, ReplicationFactor::simple(rf), instances).unwrap()
}

fn table_names(outcome: FetchOutcome) -> HashSet<String> {
    match outcome {
        FetchOutcome::Complete(tables) => tables.iter().map(|t| t.data_file_name().to_string()).collect(),
        FetchOutcome::Cancelled => panic!("fetch was cancelled"),
    }
}

#[tokio::test]
async fn failover_promotes_a_backup_and_succeeds() {
    let _ = env_logger::builder().is_test(true).try_init();
    // rf=4 over four nodes: every sub-range lists all four, CL=THREE plans
    // three primaries and one backup
    let ring = simple_ring(&[("n1", -200), ("n2", -100), ("n3", 0), ("n4", 100)], 4);
    let mut layer = MemoryLayer::new(ring, 1, ConsistencyLevel::Three);
    layer.availability = hashmap! {
        "n1".to_string() => AvailabilityHint::Up,
        "n2".to_string() => AvailabilityHint::Up,
        "n3".to_string() => AvailabilityHint::Up,
        "n4".to_string() => AvailabilityHint::Down,
    };
    for name in ["n1", "n2", "n3", "n4"] {
        layer
            .tables
            .insert(name.to_string(), vec![table(format!("table-{}", name), RepairStatus::Unknown)]);
    }
    // primary #2 fails, the down node is the only backup
    layer.failing.insert("n2".to_string());
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    let names = table_names(coordinator.fetch().await.unwrap());
    assert!(names.contains("table-n1"));
    assert!(names.contains("table-n3"));
    assert!(names.contains("table-n4"));
    assert!(!names.contains("table-n2"));
}

#[tokio::test]
async fn repair_primary_keeps_repaired_tables_others_do_not() {
    // tokens sit far from the first engine partition of 1024, so partition 0
    // observes a single ring sub-range and repair segregation is on
    let ring = simple_ring(&[("n1", 0), ("n2", 1000), ("n3", 2000)], 3);
    let mut layer = MemoryLayer::new(ring, 1024, ConsistencyLevel::Quorum);
    layer.availability = hashmap! {
        "n1".to_string() => AvailabilityHint::Up,
        "n2".to_string() => AvailabilityHint::Up,
        "n3".to_string() => AvailabilityHint::Down,
    };
    for name in ["n1", "n2", "n3"] {
        layer.tables.insert(
            name.to_string(),
            vec![
                table(format!("rep-{}", name), RepairStatus::Repaired),
                table(format!("unrep-{}", name), RepairStatus::Unrepaired),
                table(format!("unk-{}", name), RepairStatus::Unknown),
            ],
        );
    }
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    let names = table_names(coordinator.fetch().await.unwrap());
    // repaired data is read once, from the repair primary only
    assert!(names.contains("rep-n1"));
    assert!(!names.contains("rep-n2"));
    assert!(names.contains("unrep-n1"));
    assert!(names.contains("unrep-n2"));
    assert!(names.contains("unk-n2"));
    assert!(!names.contains("unrep-n3"));
}

#[tokio::test]
async fn non_intersecting_tables_are_dropped() {
    let ring = simple_ring(&[("n1", 0), ("n2", 1000), ("n3", 2000)], 3);
    let mut layer = MemoryLayer::new(ring, 1024, ConsistencyLevel::Quorum);
    let partition_range = *layer.partitioner.range_of(0).unwrap();
    let inside = TokenRange::open_closed(partition_range.lower(), partition_range.lower() + 100);
    let outside = TokenRange::open_closed(partition_range.upper() + 100, partition_range.upper() + 200);
    for name in ["n1", "n2", "n3"] {
        layer.tables.insert(
            name.to_string(),
            vec![
                MemorySSTable {
                    name: format!("near-{}", name),
                    status: RepairStatus::Unknown,
                    span: Some(inside),
                },
                MemorySSTable {
                    name: format!("far-{}", name),
                    status: RepairStatus::Unknown,
                    span: Some(outside),
                },
            ],
        );
    }
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    let names = table_names(coordinator.fetch().await.unwrap());
    assert!(names.iter().any(|n| n.starts_with("near-")));
    assert!(!names.iter().any(|n| n.starts_with("far-")));
}

#[tokio::test]
async fn exhausted_backups_raise_read_failure() {
    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let mut layer = MemoryLayer::new(ring, 1, ConsistencyLevel::Quorum);
    for name in ["n1", "n2", "n3"] {
        layer.failing.insert(name.to_string());
    }
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    match coordinator.fetch().await {
        Err(BulkReadError::ReadFailure {
            partition_id,
            attempted,
            ..
        }) => {
            assert_eq!(partition_id, 0);
            assert_eq!(attempted.len(), 3);
        }
        other => panic!("expected ReadFailure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn cancellation_completes_quietly() {
    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let mut layer = MemoryLayer::new(ring, 1, ConsistencyLevel::Quorum);
    for name in ["n1", "n2", "n3"] {
        layer.slow.insert(name.to_string());
    }
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    let cancel = coordinator.cancellation_token();
    let handle = tokio::spawn(coordinator.fetch());
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    match handle.await.unwrap() {
        Ok(FetchOutcome::Cancelled) => {}
        other => panic!("expected Cancelled, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn listing_deadline_counts_as_failure_and_fails_over() {
    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let mut layer = MemoryLayer::new(ring, 1, ConsistencyLevel::Quorum);
    layer.timeout = Some(Duration::from_millis(100));
    layer.availability = hashmap! {
        "n1".to_string() => AvailabilityHint::Up,
        "n2".to_string() => AvailabilityHint::Up,
        "n3".to_string() => AvailabilityHint::Unknown,
    };
    layer.slow.insert("n1".to_string());
    for name in ["n1", "n2", "n3"] {
        layer
            .tables
            .insert(name.to_string(), vec![table(format!("table-{}", name), RepairStatus::Unknown)]);
    }
    let layer = Arc::new(layer);

    let coordinator = layer.clone().sstables(0, &[]).unwrap();
    let names = table_names(coordinator.fetch().await.unwrap());
    // the slow primary timed out and the standby replica replaced it
    assert!(names.contains("table-n2"));
    assert!(names.contains("table-n3"));
    assert!(!names.contains("table-n1"));
}

#[tokio::test]
async fn filters_in_range_appends_exactly_one_range_filter() {
    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let layer = Arc::new(MemoryLayer::new(ring, 8, ConsistencyLevel::Quorum));

    for partition_id in 0..layer.partition_count() {
        let filters = layer.filters_in_range(partition_id, &[]).unwrap();
        let ranges: Vec<_> = filters.iter().filter_map(|f| f.as_range_filter()).collect();
        assert_eq!(ranges.len(), 1);
        assert_eq!(
            ranges[0].range(),
            layer.token_partitioner().range_of(partition_id).unwrap()
        );
    }
}

#[tokio::test]
async fn disjoint_key_filters_raise_no_match() {
    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let layer = Arc::new(MemoryLayer::new(ring, 8, ConsistencyLevel::Quorum));

    let key = b"lookup key".to_vec();
    let filter: Arc<dyn PartitionFilter> = Arc::new(PartitionKeyFilter::new(key.clone(), &Partitioner::Murmur3));
    let token = Partitioner::Murmur3.hash(&key);
    let home = layer.token_partitioner().partition_for(token).unwrap();

    // the filter's own partition accepts it, every other partition misses
    assert!(layer.filters_in_range(home, &[filter.clone()]).is_ok());
    for partition_id in (0..layer.partition_count()).filter(|p| *p != home) {
        match layer.filters_in_range(partition_id, &[filter.clone()]) {
            Err(BulkReadError::NoMatchFound { partition_id: p }) => assert_eq!(p, partition_id),
            other => panic!("expected NoMatchFound, got {:?}", other.map(|_| ())),
        }
        assert!(!layer.is_in_partition(partition_id, token, &key));
    }
    assert!(layer.is_in_partition(home, token, &key));
}

#[tokio::test]
async fn schema_build_feeds_partitioned_reads() {
    // the schema built for the job binds the same partitioner the layer reads
    // with; a key filter derived from it prunes partitions
    let schema = SchemaBuilder::new(
        "CREATE TABLE readings (sensor text, at timestamp, value double, PRIMARY KEY (sensor, at))",
        "bulk_read_it",
        ReplicationFactor::simple(3),
    )
    .partitioner(Partitioner::Murmur3)
    .build()
    .unwrap();
    assert_eq!(schema.partition_keys().count(), 1);
    assert_eq!(schema.partitioner(), &Partitioner::Murmur3);

    let ring = simple_ring(&[("n1", -100), ("n2", 0), ("n3", 100)], 3);
    let layer = Arc::new(MemoryLayer::new(ring, 4, ConsistencyLevel::Quorum));
    let filter: Arc<dyn PartitionFilter> =
        Arc::new(PartitionKeyFilter::new(b"sensor-17".to_vec(), &Partitioner::Murmur3));
    let matching: Vec<_> = (0..layer.partition_count())
        .filter(|p| layer.filters_in_range(*p, &[filter.clone()]).is_ok())
        .collect();
    assert_eq!(matching.len(), 1);
}

use async_trait::async_trait;
use pitboss::{
    audit::{
        chain_hash, AuditChain, AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore,
        LinkOutcome, MemoryAuditStore, Page, GENESIS_HASH,
    },
    clock::ManualClock,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

const PARTITION: &str = "admin";

type Edit = Box<dyn Fn(&mut AuditRecord) + Send + Sync>;

/// Storage whose reads come back altered, as if rows were edited behind the
/// chain's back.
#[derive(Default)]
struct TamperedStore {
    inner: MemoryAuditStore,
    edits: Mutex<Vec<(i64, Edit)>>,
}

impl TamperedStore {
    fn tamper(&self, sequence_id: i64, edit: impl Fn(&mut AuditRecord) + Send + Sync + 'static) {
        if let Ok(mut edits) = self.edits.lock() {
            edits.push((sequence_id, Box::new(edit)));
        }
    }

    fn apply(&self, mut records: Vec<AuditRecord>) -> Vec<AuditRecord> {
        if let Ok(edits) = self.edits.lock() {
            for record in &mut records {
                for (sequence_id, edit) in edits.iter() {
                    if record.sequence_id == *sequence_id {
                        edit(record);
                    }
                }
            }
        }
        records
    }
}

#[async_trait]
impl AuditStore for TamperedStore {
    async fn head_hash(&self, partition: &str) -> Result<String, AuditError> {
        self.inner.head_hash(partition).await
    }

    async fn insert_linked(
        &self,
        partition: &str,
        record: AuditRecord,
    ) -> Result<LinkOutcome, AuditError> {
        self.inner.insert_linked(partition, record).await
    }

    async fn hash_before(&self, partition: &str, before: i64) -> Result<String, AuditError> {
        self.inner.hash_before(partition, before).await
    }

    async fn range(
        &self,
        partition: &str,
        from: i64,
        to: Option<i64>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.apply(self.inner.range(partition, from, to).await?))
    }

    async fn query(
        &self,
        partition: &str,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.apply(self.inner.query(partition, filter, page).await?))
    }
}

fn chain_over(store: Arc<MemoryAuditStore>, clock: Arc<ManualClock>) -> AuditChain {
    AuditChain::new(store, clock, PARTITION)
}

fn ban(target: &str) -> AuditEvent {
    AuditEvent::new("adm_support", "helpdesk", "USER_BAN", "user", target)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_never_fork() {
    let store = Arc::new(MemoryAuditStore::new());
    let chain = Arc::new(chain_over(
        store.clone(),
        Arc::new(ManualClock::at_unix(1_720_000_000)),
    ));

    let mut handles = Vec::new();
    for n in 0..64 {
        let chain = Arc::clone(&chain);
        handles.push(tokio::spawn(async move {
            chain.append(ban(&format!("player_{n}"))).await.is_ok()
        }));
    }
    for handle in handles {
        assert!(matches!(handle.await, Ok(true)));
    }

    let records = store.range(PARTITION, 1, None).await;
    assert!(records.is_ok());
    let Ok(records) = records else { return };
    assert_eq!(records.len(), 64);

    // One linear chain: every back-link is the hash of the record before it.
    let mut previous = GENESIS_HASH.to_string();
    for record in &records {
        assert_eq!(record.previous_hash, previous);
        previous.clone_from(&record.hash);
    }
    let distinct: HashSet<&str> = records.iter().map(|r| r.previous_hash.as_str()).collect();
    assert_eq!(distinct.len(), records.len());

    let report = chain.verify_integrity(1, None).await;
    assert!(matches!(report, Ok(ref r) if r.is_valid && r.records_checked == 64));
}

#[tokio::test]
async fn identical_events_get_distinct_hashes() {
    let store = Arc::new(MemoryAuditStore::new());
    let chain = chain_over(store, Arc::new(ManualClock::at_unix(1_720_000_000)));

    let mut hashes = HashSet::new();
    for _ in 0..3 {
        let record = chain.append(ban("player_7")).await;
        assert!(record.is_ok());
        if let Ok(record) = record {
            assert_eq!(record.hash.len(), 64);
            assert!(record.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            hashes.insert(record.hash);
        }
    }
    assert_eq!(hashes.len(), 3);
}

#[tokio::test]
async fn stored_hash_matches_canonical_hash() {
    let store = Arc::new(MemoryAuditStore::new());
    let chain = chain_over(store, Arc::new(ManualClock::at_unix(1_720_000_000)));

    let first = chain.append(ban("player_1")).await;
    assert!(first.is_ok());
    let Ok(first) = first else { return };
    assert_eq!(first.timestamp, 1_720_000_000_000);
    assert_eq!(
        first.hash,
        chain_hash("adm_support", "USER_BAN", "user", "player_1", 1_720_000_000_000, GENESIS_HASH)
    );
}

#[tokio::test]
async fn editing_unhashed_fields_keeps_the_chain_valid() {
    let store = Arc::new(TamperedStore::default());
    let chain = AuditChain::new(
        store.clone(),
        Arc::new(ManualClock::at_unix(1_720_000_000)),
        PARTITION,
    );
    for n in 1..=3 {
        let _ = chain.append(ban(&format!("player_{n}"))).await;
    }

    store.tamper(2, |record| {
        record.principal_name = "someone else".to_string();
        record.success = false;
    });
    let report = chain.verify_integrity(1, None).await;
    assert!(matches!(report, Ok(ref r) if r.is_valid && r.records_checked == 3));

    store.tamper(2, |record| record.resource_id = "player_99".to_string());
    let report = chain.verify_integrity(1, None).await;
    assert!(matches!(
        report,
        Ok(ref r) if !r.is_valid && r.first_invalid_sequence_id == Some(2) && r.records_checked == 2
    ));
}

#[tokio::test]
async fn every_hashed_field_is_tamper_evident() {
    let edits: Vec<(&str, Edit)> = vec![
        ("principal_id", Box::new(|r: &mut AuditRecord| r.principal_id = "adm_root".to_string())),
        ("action", Box::new(|r: &mut AuditRecord| r.action = "USER_UNBAN".to_string())),
        ("resource_type", Box::new(|r: &mut AuditRecord| r.resource_type = "room".to_string())),
        ("resource_id", Box::new(|r: &mut AuditRecord| r.resource_id = "player_99".to_string())),
        ("timestamp", Box::new(|r: &mut AuditRecord| r.timestamp -= 60_000)),
    ];

    for (field, edit) in edits {
        let store = Arc::new(TamperedStore::default());
        let clock = Arc::new(ManualClock::at_unix(1_720_000_000));
        let chain = AuditChain::new(store.clone(), clock.clone(), PARTITION);
        for n in 1..=5 {
            clock.advance_secs(1);
            let _ = chain.append(ban(&format!("player_{n}"))).await;
        }

        if let Ok(mut edits) = store.edits.lock() {
            edits.push((3, edit));
        }
        let report = chain.verify_integrity(1, None).await;
        assert!(
            matches!(report, Ok(ref r) if !r.is_valid && r.first_invalid_sequence_id == Some(3)),
            "{field}"
        );
    }
}

#[tokio::test]
async fn partitions_chain_independently() {
    let store = Arc::new(MemoryAuditStore::new());
    let clock = Arc::new(ManualClock::at_unix(1_720_000_000));
    let admin = AuditChain::new(store.clone(), clock.clone(), "admin");
    let finance = AuditChain::new(store.clone(), clock, "finance");

    let a = admin.append(ban("player_1")).await;
    let f = finance
        .append(AuditEvent::new("adm_finance", "cashier", "FINANCE_WITHDRAW", "order", "ord_1"))
        .await;
    assert!(matches!(a, Ok(ref r) if r.previous_hash == GENESIS_HASH));
    assert!(matches!(f, Ok(ref r) if r.previous_hash == GENESIS_HASH));

    let admin_page = admin.query(&AuditFilter::default(), Page::default()).await;
    assert!(matches!(admin_page, Ok(ref records) if records.len() == 1 && records[0].action == "USER_BAN"));
}

#[tokio::test]
async fn query_filters_by_action_and_time() {
    let store = Arc::new(MemoryAuditStore::new());
    let clock = Arc::new(ManualClock::at_unix(1_720_000_000));
    let chain = chain_over(store, clock.clone());

    for n in 0..6 {
        let event = if n % 2 == 0 {
            ban(&format!("player_{n}"))
        } else {
            AuditEvent::new("adm_ops", "nightshift", "OPS_PUBLISH", "release", format!("r{n}"))
        };
        let _ = chain.append(event).await;
        clock.advance_secs(10);
    }

    let filter = AuditFilter {
        action: Some("USER_BAN".to_string()),
        start_time: Some(1_720_000_010_000),
        ..AuditFilter::default()
    };
    let records = chain.query(&filter, Page::default()).await;
    assert!(records.is_ok());
    let Ok(records) = records else { return };
    let targets: Vec<&str> = records.iter().map(|r| r.resource_id.as_str()).collect();
    assert_eq!(targets, vec!["player_4", "player_2"]);

    let page = chain.query(&AuditFilter::default(), Page::new(2, 4)).await;
    assert!(matches!(page, Ok(ref records) if records.len() == 2 && records[0].sequence_id == 2));
}

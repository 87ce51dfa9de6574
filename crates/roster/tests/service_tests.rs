use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use roster::{
    ChangeNotifier, ConcurrencyToken, DenyReason, DocumentStore, ExpirationPolicy, FixedClock,
    InMemoryDocumentStore, ListDocument, NotifyError, PartitionKey, Record, RecordStatus,
    RosterService, ServiceError, Snapshot, StoreError, UpsertRequest, DAY_MILLIS,
};

const NOW: i64 = 1_700_000_000_000;

/// Lets another writer commit between each read and write, up to `races` times.
struct RacingStore {
    inner: InMemoryDocumentStore,
    races: AtomicU32,
}

impl RacingStore {
    fn new(inner: InMemoryDocumentStore, races: u32) -> Self {
        Self {
            inner,
            races: AtomicU32::new(races),
        }
    }
}

#[async_trait]
impl DocumentStore for RacingStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        self.inner.read().await
    }

    async fn write(
        &self,
        document: &ListDocument,
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let remaining = self.races.load(Ordering::SeqCst);
        if remaining > 0 {
            self.races.store(remaining - 1, Ordering::SeqCst);
            let snapshot = self.inner.read().await?;
            let mut theirs = snapshot.document;
            theirs.records_mut().push(Record::new(
                PartitionKey::new("other"),
                format!("intruder-{remaining}"),
                0,
            ));
            self.inner
                .write(&theirs, snapshot.token.as_ref(), "concurrent writer")
                .await?;
        }
        self.inner.write(document, token, message).await
    }
}

struct FailingNotifier;

#[async_trait]
impl ChangeNotifier for FailingNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("webhook down".to_string()))
    }
}

fn service(store: Arc<dyn DocumentStore>, clock: Arc<FixedClock>) -> RosterService {
    RosterService::new(store).with_clock(clock)
}

fn key(value: &str) -> PartitionKey {
    PartitionKey::new(value)
}

fn upsert_request(partition: &str, name: &str) -> UpsertRequest {
    UpsertRequest {
        partition: key(partition),
        name: name.to_string(),
        ..UpsertRequest::default()
    }
}

#[tokio::test]
async fn whitelist_then_blacklist_scenario() {
    let store = InMemoryDocumentStore::shared();
    let clock = FixedClock::shared(NOW);
    let service = service(store.clone(), clock.clone());

    let upserted = service
        .upsert(UpsertRequest {
            no_expiration: true,
            ..upsert_request("g1", "alice")
        })
        .await
        .expect("upsert");
    assert!(upserted.created);
    assert_eq!(upserted.record.expires_at, None);

    let membership = service.query_membership(&key("g1"), "alice").await.expect("query");
    assert!(membership.verdict.whitelisted);
    assert_eq!(membership.record.expect("record").expires_at, None);

    clock.advance(1_000);
    let patched = service
        .patch_status(&key("g1"), "alice", RecordStatus::Blacklisted, false)
        .await
        .expect("patch");
    assert_eq!(patched.expires_at, Some(NOW + 1_000));

    let membership = service.query_membership(&key("g1"), "alice").await.expect("query");
    assert!(!membership.verdict.whitelisted);
    assert_eq!(membership.verdict.reason, Some(DenyReason::Blacklisted));
}

#[tokio::test]
async fn default_window_applies_and_expires() {
    let clock = FixedClock::shared(NOW);
    let service = service(InMemoryDocumentStore::shared(), clock.clone())
        .with_policy(ExpirationPolicy::new(7));

    let upserted = service.upsert(upsert_request("g1", "bob")).await.expect("upsert");
    assert_eq!(upserted.record.expires_at, Some(NOW + 7 * DAY_MILLIS));

    clock.advance(7 * DAY_MILLIS);
    let membership = service.query_membership(&key("g1"), "bob").await.expect("query");
    assert!(!membership.verdict.whitelisted);
    assert_eq!(membership.verdict.reason, Some(DenyReason::Expired));
}

#[tokio::test]
async fn partitions_are_isolated() {
    let service = service(InMemoryDocumentStore::shared(), FixedClock::shared(NOW));
    service
        .upsert(UpsertRequest {
            external_id: Some("1".to_string()),
            ..upsert_request("g1", "sam")
        })
        .await
        .expect("g1");
    service
        .upsert(UpsertRequest {
            external_id: Some("2".to_string()),
            ..upsert_request("g2", "sam")
        })
        .await
        .expect("g2");

    let g1 = service.list_partition(&key("g1")).await.expect("list");
    assert_eq!(g1.len(), 1);
    assert_eq!(g1[0].external_id.as_deref(), Some("1"));

    service
        .patch_status(&key("g2"), "sam", RecordStatus::Left, false)
        .await
        .expect("patch");
    let membership = service.query_membership(&key("g1"), "sam").await.expect("query");
    assert!(membership.verdict.whitelisted);
}

#[tokio::test]
async fn upserts_differing_only_in_case_share_one_record() {
    let store = InMemoryDocumentStore::shared();
    let service = service(store.clone(), FixedClock::shared(NOW));
    service
        .upsert(UpsertRequest {
            external_tag: Some("bob#0001".to_string()),
            ..upsert_request("g1", "Bob")
        })
        .await
        .expect("first");
    let second = service
        .upsert(UpsertRequest {
            external_id: Some("99".to_string()),
            ..upsert_request("g1", "BOB")
        })
        .await
        .expect("second");
    assert!(!second.created);

    let records = service.list_partition(&key("g1")).await.expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].external_id.as_deref(), Some("99"));
    assert_eq!(records[0].external_tag.as_deref(), Some("bob#0001"));
    assert_eq!(
        store.messages().last().map(String::as_str),
        Some("[g1] Bob updated")
    );
}

#[tokio::test]
async fn upsert_without_status_keeps_existing_status() {
    let service = service(InMemoryDocumentStore::shared(), FixedClock::shared(NOW));
    service
        .upsert(UpsertRequest {
            status: Some(RecordStatus::Blacklisted),
            ..upsert_request("g1", "mallory")
        })
        .await
        .expect("blacklist");
    let updated = service
        .upsert(UpsertRequest {
            external_tag: Some("m#1".to_string()),
            ..upsert_request("g1", "mallory")
        })
        .await
        .expect("update");
    assert_eq!(updated.record.status, RecordStatus::Blacklisted);
    assert_eq!(updated.record.expires_at, Some(NOW));
}

#[tokio::test]
async fn staying_blacklisted_keeps_the_blacklist_instant() {
    let clock = FixedClock::shared(NOW);
    let service = service(InMemoryDocumentStore::shared(), clock.clone());
    service.upsert(upsert_request("g1", "bob")).await.expect("add");
    let blacklisted = service
        .patch_status(&key("g1"), "bob", RecordStatus::Blacklisted, false)
        .await
        .expect("blacklist");
    assert_eq!(blacklisted.expires_at, Some(NOW));

    clock.advance(DAY_MILLIS);
    let retagged = service
        .upsert(UpsertRequest {
            external_tag: Some("bob#2".to_string()),
            ..upsert_request("g1", "bob")
        })
        .await
        .expect("retag");
    assert_eq!(retagged.record.status, RecordStatus::Blacklisted);
    assert_eq!(retagged.record.expires_at, Some(NOW));

    clock.advance(DAY_MILLIS);
    let repatched = service
        .patch_status(&key("g1"), "bob", RecordStatus::Blacklisted, false)
        .await
        .expect("re-blacklist");
    assert_eq!(repatched.expires_at, Some(NOW));
}

#[tokio::test]
async fn unreadable_entry_in_one_partition_leaves_others_usable() {
    let doc = ListDocument::from_slice(
        br#"[{"partitionKey": "g2", "name": "old", "status": "Active", "expiresAt": "2025-01-01"}]"#,
    )
    .expect("document");
    let store = Arc::new(InMemoryDocumentStore::with_document(&doc).expect("store"));
    let service = service(store.clone(), FixedClock::shared(NOW));

    service.upsert(upsert_request("g1", "alice")).await.expect("upsert");
    let membership = service.query_membership(&key("g1"), "alice").await.expect("query");
    assert!(membership.verdict.whitelisted);
    assert!(service.list_partition(&key("g2")).await.expect("list").is_empty());

    let stored = String::from_utf8(store.contents().expect("contents")).expect("utf8");
    assert!(stored.contains("\"2025-01-01\""));
}

#[tokio::test]
async fn missing_records_are_not_found_and_leave_document_unchanged() {
    let store = InMemoryDocumentStore::shared();
    let service = service(store.clone(), FixedClock::shared(NOW));
    service.upsert(upsert_request("g1", "alice")).await.expect("upsert");
    let before = store.contents().expect("contents");

    let err = service.remove(&key("g2"), "alice").await.expect_err("not found");
    assert!(matches!(err, ServiceError::NotFound(_)));
    let err = service
        .patch_status(&key("g1"), "nobody", RecordStatus::Active, false)
        .await
        .expect_err("not found");
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(store.contents().expect("contents"), before);

    let membership = service.query_membership(&key("g1"), "nobody").await.expect("query");
    assert_eq!(membership.verdict.reason, Some(DenyReason::NotFound));
    assert!(membership.record.is_none());

    service.remove(&key("g1"), "ALICE").await.expect("remove");
    assert!(service.list_partition(&key("g1")).await.expect("list").is_empty());
}

#[tokio::test]
async fn conflicting_writes_are_retried_from_a_fresh_read() {
    let inner = InMemoryDocumentStore::new();
    let store = Arc::new(RacingStore::new(inner.clone(), 2));
    let service = service(store, FixedClock::shared(NOW)).with_max_write_attempts(3);

    service.upsert(upsert_request("g1", "alice")).await.expect("upsert");

    let snapshot = inner.read().await.expect("read");
    let names: Vec<_> = snapshot
        .document
        .records()
        .iter()
        .map(|record| record.name.as_str())
        .collect();
    assert_eq!(names, vec!["intruder-2", "intruder-1", "alice"]);
}

#[tokio::test]
async fn exhausting_write_attempts_fails_the_request() {
    let inner = InMemoryDocumentStore::new();
    let store = Arc::new(RacingStore::new(inner.clone(), 5));
    let service = service(store, FixedClock::shared(NOW)).with_max_write_attempts(2);

    let err = service
        .upsert(upsert_request("g1", "alice"))
        .await
        .expect_err("conflict");
    assert!(matches!(err, ServiceError::ConflictExhausted(2)));
    let snapshot = inner.read().await.expect("read");
    assert!(snapshot
        .document
        .records()
        .iter()
        .all(|record| record.name != "alice"));
}

#[tokio::test]
async fn blank_names_are_rejected_before_storage() {
    let store = InMemoryDocumentStore::shared();
    let service = service(store.clone(), FixedClock::shared(NOW));
    let err = service
        .upsert(upsert_request("g1", "   "))
        .await
        .expect_err("validation");
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(store.contents().is_none());
}

#[tokio::test]
async fn notification_failures_do_not_fail_mutations() {
    let store = InMemoryDocumentStore::shared();
    let service = service(store.clone(), FixedClock::shared(NOW))
        .with_notifier(Arc::new(FailingNotifier));
    service.upsert(upsert_request("g1", "alice")).await.expect("upsert");
    assert_eq!(service.list_partition(&key("g1")).await.expect("list").len(), 1);
}

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::document::ListDocument;
use crate::notify::{ChangeNotifier, NoopNotifier};
use crate::policy::{DenyReason, ExpirationPolicy, Verdict};
use crate::record::{PartitionKey, Record, RecordStatus};
use crate::repository::{self, RecordFields, RecordNotFound, Upserted};
use crate::store::{DocumentStore, Snapshot, StoreError};

pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    NotFound(#[from] RecordNotFound),
    #[error("document write conflicted on {0} consecutive attempts")]
    ConflictExhausted(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpsertRequest {
    pub partition: PartitionKey,
    pub name: String,
    pub partition_name: Option<String>,
    pub external_id: Option<String>,
    pub external_tag: Option<String>,
    pub status: Option<RecordStatus>,
    pub expires_at: Option<i64>,
    pub no_expiration: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Membership {
    pub partition: PartitionKey,
    pub name: String,
    pub verdict: Verdict,
    pub record: Option<Record>,
}

/// Runs one read-modify-write cycle against `store`, restarting from a fresh
/// read whenever the write loses a token race. The mutator returns the value
/// to hand back plus the change message recorded with the write; an error
/// from the mutator aborts without writing.
pub async fn update_document<F, R>(
    store: &dyn DocumentStore,
    max_attempts: u32,
    mut mutator: F,
) -> Result<(R, String), ServiceError>
where
    F: FnMut(&mut ListDocument) -> Result<(R, String), ServiceError>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let Snapshot {
            mut document,
            token,
        } = store.read().await?;
        let (value, message) = mutator(&mut document)?;
        match store.write(&document, token.as_ref(), &message).await {
            Ok(_) => return Ok((value, message)),
            Err(StoreError::Conflict(detail)) => {
                warn!(attempt, max_attempts, %detail, "document write conflicted, re-reading");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(ServiceError::ConflictExhausted(max_attempts))
}

#[derive(Clone)]
pub struct RosterService {
    store: Arc<dyn DocumentStore>,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ChangeNotifier>,
    max_write_attempts: u32,
}

impl RosterService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            policy: ExpirationPolicy::default(),
            clock: SystemClock::shared(),
            notifier: NoopNotifier::shared(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    pub fn with_policy(mut self, policy: ExpirationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    pub async fn query_membership(
        &self,
        partition: &PartitionKey,
        name: &str,
    ) -> Result<Membership, ServiceError> {
        validate_partition(partition)?;
        let name = validate_name(name)?;
        info!(%partition, name, "query membership");

        let snapshot = self.store.read().await?;
        let now = self.clock.now_millis();
        let membership = match repository::find_in_partition(&snapshot.document, partition, name) {
            Some(record) => Membership {
                partition: partition.clone(),
                name: record.name.clone(),
                verdict: ExpirationPolicy::evaluate(record, now),
                record: Some(record.clone()),
            },
            None => Membership {
                partition: partition.clone(),
                name: name.to_string(),
                verdict: Verdict::deny(DenyReason::NotFound),
                record: None,
            },
        };
        Ok(membership)
    }

    pub async fn list_partition(&self, partition: &PartitionKey) -> Result<Vec<Record>, ServiceError> {
        validate_partition(partition)?;
        let snapshot = self.store.read().await?;
        let records = repository::list_partition(&snapshot.document, partition);
        info!(%partition, records = records.len(), "list partition");
        Ok(records)
    }

    pub async fn upsert(&self, request: UpsertRequest) -> Result<Upserted, ServiceError> {
        validate_partition(&request.partition)?;
        let name = validate_name(&request.name)?;
        info!(partition = %request.partition, name, "upsert record");

        let (upserted, message) =
            update_document(self.store.as_ref(), self.max_write_attempts, |doc| {
                let now = self.clock.now_millis();
                let previous = repository::find_in_partition(doc, &request.partition, name)
                    .map(|record| record.status);
                let status = request.status.or(previous).unwrap_or_default();
                let expiry = self.policy.transition_expiry(
                    previous,
                    status,
                    request.no_expiration,
                    request.expires_at,
                    now,
                );
                let fields = RecordFields {
                    partition_name: request.partition_name.clone(),
                    external_id: request.external_id.clone(),
                    external_tag: request.external_tag.clone(),
                    status: Some(status),
                    expiry,
                };
                let upserted = repository::upsert(doc, &request.partition, name, fields, now);
                let verb = if upserted.created { "added" } else { "updated" };
                let message =
                    format!("[{}] {} {verb}", request.partition, upserted.record.name);
                Ok((upserted, message))
            })
            .await?;

        self.notify(&message).await;
        Ok(upserted)
    }

    pub async fn patch_status(
        &self,
        partition: &PartitionKey,
        name: &str,
        status: RecordStatus,
        no_expiration: bool,
    ) -> Result<Record, ServiceError> {
        validate_partition(partition)?;
        let name = validate_name(name)?;
        info!(%partition, name, %status, "patch status");

        let (record, message) =
            update_document(self.store.as_ref(), self.max_write_attempts, |doc| {
                let now = self.clock.now_millis();
                let record = repository::patch_status(
                    doc,
                    partition,
                    name,
                    status,
                    no_expiration,
                    &self.policy,
                    now,
                )?;
                let message = format!("[{partition}] {} -> {status}", record.name);
                Ok((record, message))
            })
            .await?;

        self.notify(&message).await;
        Ok(record)
    }

    pub async fn remove(&self, partition: &PartitionKey, name: &str) -> Result<(), ServiceError> {
        validate_partition(partition)?;
        let name = validate_name(name)?;
        info!(%partition, name, "remove record");

        let ((), message) = update_document(self.store.as_ref(), self.max_write_attempts, |doc| {
            if !repository::remove(doc, partition, name) {
                return Err(RecordNotFound::new(partition, name).into());
            }
            Ok(((), format!("[{partition}] removed {name}")))
        })
        .await?;

        self.notify(&message).await;
        Ok(())
    }

    async fn notify(&self, message: &str) {
        if let Err(err) = self.notifier.notify(message).await {
            warn!(error = %err, message, "change notification failed");
        }
    }
}

fn validate_partition(partition: &PartitionKey) -> Result<(), ServiceError> {
    if partition.is_empty() {
        return Err(ServiceError::Validation("partition must not be empty".to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<&str, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation("name must not be empty".to_string()));
    }
    Ok(trimmed)
}

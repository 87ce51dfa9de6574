use thiserror::Error;

use crate::document::ListDocument;
use crate::policy::{ExpirationPolicy, Expiry};
use crate::record::{PartitionKey, Record, RecordStatus};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {name:?} not found in partition {partition}")]
pub struct RecordNotFound {
    pub partition: PartitionKey,
    pub name: String,
}

impl RecordNotFound {
    pub fn new(partition: &PartitionKey, name: &str) -> Self {
        Self {
            partition: partition.clone(),
            name: name.to_string(),
        }
    }
}

/// Fields merged into a record on upsert. `None` keeps the stored value;
/// on creation `None` falls back to the record defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFields {
    pub partition_name: Option<String>,
    pub external_id: Option<String>,
    pub external_tag: Option<String>,
    pub status: Option<RecordStatus>,
    pub expiry: Option<Expiry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Upserted {
    pub created: bool,
    pub record: Record,
}

pub fn find_in_partition<'a>(
    doc: &'a ListDocument,
    partition: &PartitionKey,
    name: &str,
) -> Option<&'a Record> {
    position(doc, partition, name).and_then(|index| doc.records().get(index))
}

pub fn list_partition(doc: &ListDocument, partition: &PartitionKey) -> Vec<Record> {
    doc.records()
        .iter()
        .filter(|record| record.partition_key == *partition)
        .cloned()
        .collect()
}

pub fn upsert(
    doc: &mut ListDocument,
    partition: &PartitionKey,
    name: &str,
    fields: RecordFields,
    now: i64,
) -> Upserted {
    if let Some(index) = position(doc, partition, name) {
        if let Some(record) = doc.records_mut().get_mut(index) {
            merge(record, fields, now);
            return Upserted {
                created: false,
                record: record.clone(),
            };
        }
    }

    let mut record = Record::new(partition.clone(), name, now);
    merge(&mut record, fields, now);
    doc.records_mut().push(record.clone());
    Upserted {
        created: true,
        record,
    }
}

pub fn patch_status(
    doc: &mut ListDocument,
    partition: &PartitionKey,
    name: &str,
    status: RecordStatus,
    no_expiration: bool,
    policy: &ExpirationPolicy,
    now: i64,
) -> Result<Record, RecordNotFound> {
    let index = position(doc, partition, name).ok_or_else(|| RecordNotFound::new(partition, name))?;
    let record = doc
        .records_mut()
        .get_mut(index)
        .ok_or_else(|| RecordNotFound::new(partition, name))?;

    let expiry = policy.transition_expiry(Some(record.status), status, no_expiration, None, now);
    if let Some(expiry) = expiry {
        record.expires_at = expiry.as_millis();
    }
    record.status = status;
    record.updated_at = now;
    Ok(record.clone())
}

pub fn remove(doc: &mut ListDocument, partition: &PartitionKey, name: &str) -> bool {
    let before = doc.len();
    doc.records_mut()
        .retain(|record| !record.matches(partition, name));
    doc.len() != before
}

fn position(doc: &ListDocument, partition: &PartitionKey, name: &str) -> Option<usize> {
    doc.records()
        .iter()
        .position(|record| record.matches(partition, name))
}

fn merge(record: &mut Record, fields: RecordFields, now: i64) {
    if let Some(value) = fields.partition_name {
        record.partition_name = Some(value);
    }
    if let Some(value) = fields.external_id {
        record.external_id = Some(value);
    }
    if let Some(value) = fields.external_tag {
        record.external_tag = Some(value);
    }
    if let Some(status) = fields.status {
        record.status = status;
    }
    if let Some(expiry) = fields.expiry {
        record.expires_at = expiry.as_millis();
    }
    record.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: &str) -> PartitionKey {
        PartitionKey::new(value)
    }

    fn doc_with(records: &[(&str, &str)]) -> ListDocument {
        ListDocument::new(
            records
                .iter()
                .map(|(partition, name)| Record::new(key(partition), *name, 1))
                .collect(),
        )
    }

    #[test]
    fn lookups_never_cross_partitions() {
        let doc = doc_with(&[("g1", "bob"), ("g2", "bob")]);
        let found = find_in_partition(&doc, &key("g2"), "BOB").expect("record");
        assert_eq!(found.partition_key, key("g2"));
        assert!(find_in_partition(&doc, &key("g3"), "bob").is_none());
    }

    #[test]
    fn list_partition_keeps_insertion_order() {
        let doc = doc_with(&[("g1", "c"), ("g2", "x"), ("g1", "a"), ("g1", "b")]);
        let names: Vec<_> = list_partition(&doc, &key("g1"))
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert!(list_partition(&doc, &key("g9")).is_empty());
    }

    #[test]
    fn upsert_merges_case_insensitively() {
        let mut doc = ListDocument::default();
        let first = upsert(
            &mut doc,
            &key("g1"),
            "Bob",
            RecordFields {
                external_id: Some("1".to_string()),
                external_tag: Some("bob#1".to_string()),
                ..RecordFields::default()
            },
            10,
        );
        assert!(first.created);

        let second = upsert(
            &mut doc,
            &key("g1"),
            "BOB",
            RecordFields {
                external_id: Some("2".to_string()),
                expiry: Some(Expiry::Never),
                ..RecordFields::default()
            },
            20,
        );
        assert!(!second.created);
        assert_eq!(doc.len(), 1);

        let record = &doc.records()[0];
        assert_eq!(record.name, "Bob");
        assert_eq!(record.external_id.as_deref(), Some("2"));
        assert_eq!(record.external_tag.as_deref(), Some("bob#1"));
        assert_eq!(record.created_at, 10);
        assert_eq!(record.updated_at, 20);
    }

    #[test]
    fn patch_status_blacklists_with_immediate_expiry() {
        let mut doc = doc_with(&[("g1", "alice")]);
        let policy = ExpirationPolicy::default();
        let record =
            patch_status(&mut doc, &key("g1"), "Alice", RecordStatus::Blacklisted, false, &policy, 77)
                .expect("patched");
        assert_eq!(record.status, RecordStatus::Blacklisted);
        assert_eq!(record.expires_at, Some(77));
        assert_eq!(record.updated_at, 77);
    }

    #[test]
    fn patch_status_to_left_keeps_expiry() {
        let mut doc = doc_with(&[("g1", "alice")]);
        doc.records_mut()[0].expires_at = Some(5_000);
        let policy = ExpirationPolicy::default();
        let record = patch_status(&mut doc, &key("g1"), "alice", RecordStatus::Left, false, &policy, 10)
            .expect("patched");
        assert_eq!(record.expires_at, Some(5_000));
    }

    #[test]
    fn patch_status_reports_missing_records() {
        let mut doc = doc_with(&[("g2", "alice")]);
        let err = patch_status(
            &mut doc,
            &key("g1"),
            "alice",
            RecordStatus::Active,
            false,
            &ExpirationPolicy::default(),
            0,
        )
        .expect_err("missing");
        assert_eq!(err.partition, key("g1"));
    }

    #[test]
    fn remove_only_touches_the_matching_partition() {
        let mut doc = doc_with(&[("g1", "bob"), ("g2", "bob")]);
        assert!(remove(&mut doc, &key("g1"), "Bob"));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.records()[0].partition_key, key("g2"));

        let before = doc.clone();
        assert!(!remove(&mut doc, &key("g1"), "bob"));
        assert_eq!(doc, before);
    }
}

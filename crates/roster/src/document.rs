use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::record::Record;

/// The whole list as stored remotely: one JSON array of records.
///
/// Entries that do not read as a [`Record`] are held verbatim, never match a
/// lookup, and are written back where they were found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListDocument {
    records: Vec<Record>,
    // (number of records preceding the entry, raw entry)
    unreadable: Vec<(usize, Value)>,
}

impl ListDocument {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            unreadable: Vec::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unreadable_len(&self) -> usize {
        self.unreadable.len()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

impl Serialize for ListDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len() + self.unreadable.len()))?;
        let mut held = self.unreadable.iter().peekable();
        for (index, record) in self.records.iter().enumerate() {
            while let Some((_, raw)) = held.next_if(|(anchor, _)| *anchor <= index) {
                seq.serialize_element(raw)?;
            }
            seq.serialize_element(record)?;
        }
        for (_, raw) in held {
            seq.serialize_element(raw)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ListDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<Value>::deserialize(deserializer)?;
        let mut document = ListDocument::default();
        for (position, entry) in entries.into_iter().enumerate() {
            match Record::deserialize(&entry) {
                Ok(record) => document.records.push(record),
                Err(err) => {
                    if !entry.is_object() {
                        return Err(de::Error::custom(format!(
                            "entry {position} is not a record object"
                        )));
                    }
                    warn!(position, error = %err, "keeping unreadable record as-is");
                    document.unreadable.push((document.records.len(), entry));
                }
            }
        }
        Ok(document)
    }
}

impl From<Vec<Record>> for ListDocument {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PartitionKey;

    #[test]
    fn blank_content_is_an_empty_document() {
        let doc = ListDocument::from_slice(b" \n").expect("document");
        assert!(doc.is_empty());
    }

    #[test]
    fn one_unreadable_record_does_not_hide_the_rest() {
        let input = br#"[
  {
    "partitionKey": "g2",
    "name": "mallory",
    "expiresAt": "2025-01-01"
  },
  {
    "partitionKey": "g1",
    "name": "alice",
    "status": "active",
    "expiresAt": null,
    "createdAt": 1,
    "updatedAt": 1
  },
  {
    "partitionKey": "g2",
    "name": "trent",
    "status": "banned"
  }
]"#;
        let mut doc = ListDocument::from_slice(input).expect("document");
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.unreadable_len(), 2);
        assert_eq!(doc.records()[0].name, "alice");

        let rewritten: Value = serde_json::from_slice(&doc.to_bytes().expect("bytes")).expect("json");
        assert_eq!(rewritten[0]["expiresAt"], "2025-01-01");
        assert_eq!(rewritten[1]["name"], "alice");
        assert_eq!(rewritten[2]["status"], "banned");

        doc.records_mut().clear();
        let rewritten: Value = serde_json::from_slice(&doc.to_bytes().expect("bytes")).expect("json");
        assert_eq!(rewritten.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn non_object_entries_are_rejected() {
        assert!(ListDocument::from_slice(b"[1, 2]").is_err());
    }

    #[test]
    fn serialized_bytes_parse_back_to_the_same_document() {
        let doc = ListDocument::new(vec![Record::new(PartitionKey::new("g1"), "alice", 1)]);
        let bytes = doc.to_bytes().expect("bytes");
        assert!(bytes.starts_with(b"[\n  {"));
        let parsed = ListDocument::from_slice(&bytes).expect("document");
        assert_eq!(parsed, doc);
        assert_eq!(parsed.to_bytes().expect("bytes"), bytes);
    }
}

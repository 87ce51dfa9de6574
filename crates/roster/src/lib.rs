pub mod clock;
pub mod config;
pub mod document;
pub mod github;
pub mod notify;
pub mod policy;
pub mod record;
pub mod repository;
pub mod service;
pub mod static_config;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, SystemConfig, SystemConfigLoader};
pub use document::ListDocument;
pub use github::{GithubDocumentStore, GithubStoreConfig};
pub use notify::{notifier_from_config, ChangeNotifier, NoopNotifier, NotifyError, WebhookNotifier};
pub use policy::{DenyReason, ExpirationPolicy, Expiry, Verdict, DAY_MILLIS};
pub use record::{InvalidStatus, PartitionKey, Record, RecordStatus};
pub use repository::{RecordFields, RecordNotFound, Upserted};
pub use service::{
    update_document, Membership, RosterService, ServiceError, UpsertRequest,
    DEFAULT_MAX_WRITE_ATTEMPTS,
};
pub use store::{
    content_token, ConcurrencyToken, DocumentStore, InMemoryDocumentStore, Snapshot, StoreError,
};

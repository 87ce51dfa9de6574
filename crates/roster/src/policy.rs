use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordStatus};

pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(i64),
}

impl Expiry {
    pub fn as_millis(self) -> Option<i64> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(at),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyReason {
    #[serde(rename = "not found")]
    NotFound,
    Blacklisted,
    Left,
    Expired,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotFound => "not found",
            DenyReason::Blacklisted => "blacklisted",
            DenyReason::Left => "left",
            DenyReason::Expired => "expired",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub whitelisted: bool,
    pub reason: Option<DenyReason>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            whitelisted: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            whitelisted: false,
            reason: Some(reason),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub default_window_days: i64,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            default_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl ExpirationPolicy {
    pub fn new(default_window_days: i64) -> Self {
        Self {
            default_window_days: default_window_days.max(0),
        }
    }

    pub fn default_window_millis(&self) -> i64 {
        self.default_window_days.saturating_mul(DAY_MILLIS)
    }

    /// Expiry for a record entering `status`. `None` is returned only for
    /// `Left`, whose expiry the caller decides (see [`ExpirationPolicy::left_expiry`]).
    pub fn compute_expiry(
        &self,
        status: RecordStatus,
        no_expiration: bool,
        explicit: Option<i64>,
        now: i64,
    ) -> Option<Expiry> {
        match status {
            RecordStatus::Blacklisted => Some(Expiry::At(now)),
            RecordStatus::Active if no_expiration => Some(Expiry::Never),
            RecordStatus::Active => Some(Expiry::At(
                explicit.unwrap_or_else(|| now.saturating_add(self.default_window_millis())),
            )),
            RecordStatus::Left => None,
        }
    }

    /// Caller-supplied expiry for a `Left` record; `None` keeps whatever the
    /// record already has.
    pub fn left_expiry(no_expiration: bool, explicit: Option<i64>) -> Option<Expiry> {
        if no_expiration {
            Some(Expiry::Never)
        } else {
            explicit.map(Expiry::At)
        }
    }

    /// Expiry for a record moving from `previous` (`None` for a new record) to
    /// `status`. A record that stays blacklisted keeps the instant it was
    /// blacklisted; `None` means the stored expiry is left untouched.
    pub fn transition_expiry(
        &self,
        previous: Option<RecordStatus>,
        status: RecordStatus,
        no_expiration: bool,
        explicit: Option<i64>,
        now: i64,
    ) -> Option<Expiry> {
        if status == RecordStatus::Blacklisted && previous == Some(RecordStatus::Blacklisted) {
            return None;
        }
        self.compute_expiry(status, no_expiration, explicit, now)
            .or_else(|| Self::left_expiry(no_expiration, explicit))
    }

    pub fn evaluate(record: &Record, now: i64) -> Verdict {
        match record.status {
            RecordStatus::Blacklisted => Verdict::deny(DenyReason::Blacklisted),
            RecordStatus::Left => Verdict::deny(DenyReason::Left),
            RecordStatus::Active => match record.expires_at {
                Some(at) if at <= now => Verdict::deny(DenyReason::Expired),
                _ => Verdict::allow(),
            },
        }
    }

    pub fn is_effectively_whitelisted(record: &Record, now: i64) -> bool {
        Self::evaluate(record, now).whitelisted
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use roster::{
    notifier_from_config, ConfigError, DocumentStore, ExpirationPolicy, GithubDocumentStore,
    GithubStoreConfig, InMemoryDocumentStore, RosterService, SystemConfig, SystemConfigLoader,
    DEFAULT_MAX_WRITE_ATTEMPTS,
};
use tracing::{info, warn};

use crate::error::AppError;

pub struct AppState {
    pub config: SystemConfig,
    pub service: RosterService,
}

impl AppState {
    pub fn new(config: SystemConfig, service: RosterService) -> Self {
        Self { config, service }
    }

    pub fn from_config(config: SystemConfig) -> Result<Self, AppError> {
        let service = build_service(&config)?;
        Ok(Self::new(config, service))
    }
}

pub fn load_config(path: &Path) -> Result<SystemConfig, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(SystemConfigLoader::from_str(&raw)?)
}

pub fn create_default_config(path: &Path) -> Result<String, AppError> {
    let content = default_config_template();
    std::fs::write(path, content.as_bytes())?;
    Ok(content)
}

pub fn default_config_template() -> String {
    let mut sections: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for item in SystemConfigLoader::items() {
        let Some((section, leaf)) = item.key.split_once('.') else {
            continue;
        };
        let value = match item.value_type {
            "string" => format!("{:?}", item.default_value),
            _ => item.default_value.to_string(),
        };
        let lines = sections.entry(section).or_default();
        lines.push(format!("# {}", item.description));
        lines.push(format!("{leaf} = {value}"));
    }

    let mut out = String::new();
    for (section, lines) in sections {
        out.push_str(&format!("[{section}]\n"));
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Applies values that deployments pass through the environment instead of
/// the config file. `None` leaves the file value in place.
pub fn apply_overrides(
    config: &mut SystemConfig,
    overrides: &[(&str, Option<String>)],
) -> Result<(), AppError> {
    for (key, value) in overrides {
        if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
            config.set(key, value)?;
        }
    }
    Ok(())
}

pub fn build_service(config: &SystemConfig) -> Result<RosterService, AppError> {
    let store = build_store(config)?;
    let attempts = u32::try_from(config.get_number("store.max_write_attempts"))
        .ok()
        .filter(|attempts| *attempts > 0)
        .unwrap_or(DEFAULT_MAX_WRITE_ATTEMPTS);
    let policy = ExpirationPolicy::new(config.get_number("policy.default_window_days"));

    Ok(RosterService::new(store)
        .with_policy(policy)
        .with_notifier(notifier_from_config(config))
        .with_max_write_attempts(attempts))
}

fn build_store(config: &SystemConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    let backend = config.get_string("store.backend");
    match backend.trim() {
        "memory" => {
            warn!("using in-memory document store, records are lost on restart");
            Ok(InMemoryDocumentStore::shared())
        }
        "github" => {
            let github = GithubStoreConfig::from_system_config(config)?;
            if github.token.trim().is_empty() {
                warn!("github.token is empty, writes will be rejected by GitHub");
            }
            info!(
                repo = %format!("{}/{}", github.owner, github.repo),
                path = %github.path,
                branch = %github.branch,
                "using GitHub document store"
            );
            Ok(Arc::new(GithubDocumentStore::new(github)))
        }
        other => Err(ConfigError::Invalid(format!("unknown store.backend {other:?}")).into()),
    }
}

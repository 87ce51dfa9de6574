#[derive(Clone, Debug)]
pub struct StaticConfigItem {
    pub key: &'static str,
    pub description: &'static str,
    pub value_type: &'static str,
    pub default_value: &'static str,
}

pub static STATIC_CONFIG_TABLE: &[StaticConfigItem] = &[
    StaticConfigItem {
        key: "store.backend",
        description: "Document store backend: github or memory",
        value_type: "string",
        default_value: "github",
    },
    StaticConfigItem {
        key: "store.max_write_attempts",
        description: "Read-modify-write attempts before a conflicting write fails",
        value_type: "number",
        default_value: "3",
    },
    StaticConfigItem {
        key: "github.api_url",
        description: "GitHub REST API base URL",
        value_type: "string",
        default_value: "https://api.github.com",
    },
    StaticConfigItem {
        key: "github.repo",
        description: "Repository holding the list document, as owner/name",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "github.path",
        description: "Path of the list document inside the repository",
        value_type: "string",
        default_value: "data/whitelist.json",
    },
    StaticConfigItem {
        key: "github.branch",
        description: "Branch the list document is read from and committed to",
        value_type: "string",
        default_value: "main",
    },
    StaticConfigItem {
        key: "github.token",
        description: "Token with contents read/write permission",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "github.timeout_ms",
        description: "GitHub request timeout in milliseconds",
        value_type: "number",
        default_value: "10000",
    },
    StaticConfigItem {
        key: "github.user_agent",
        description: "User-Agent sent to the GitHub API",
        value_type: "string",
        default_value: "roster",
    },
    StaticConfigItem {
        key: "policy.default_window_days",
        description: "Days an active record stays whitelisted when no expiry is given",
        value_type: "number",
        default_value: "7",
    },
    StaticConfigItem {
        key: "notify.webhook_url",
        description: "Webhook receiving change notifications (empty disables)",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "notify.username",
        description: "Display name used for webhook notifications",
        value_type: "string",
        default_value: "Whitelist Monitor",
    },
];

//! Demo configuration loaded from environment variables.
//!
//! All settings have defaults so the demo runs with zero configuration
//! against an in-memory cache.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// SQLite cache to open. `default` uses the platform data directory.
    /// Env: `CHATLINE_DB_PATH`
    /// Default: in-memory.
    pub db_path: Option<PathBuf>,

    /// Chatroom the session opens.
    /// Env: `CHATLINE_DEMO_CHATROOM`
    /// Default: `general`
    pub chatroom_id: String,

    /// Display name of the local member.
    /// Env: `CHATLINE_DEMO_MEMBER`
    /// Default: `Demo User`
    pub member_name: String,

    /// Conversations seeded into an empty chatroom.
    /// Env: `CHATLINE_DEMO_SEED`
    /// Default: `24`
    pub seed_count: usize,

    /// Simulated attachment upload time.
    /// Env: `CHATLINE_DEMO_UPLOAD_MS`
    /// Default: `300`
    pub upload_delay: Duration,

    /// Print presentation events as JSON instead of a one-line summary.
    /// Env: `CHATLINE_DEMO_JSON` (true/false)
    /// Default: `false`
    pub json_events: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            chatroom_id: "general".to_string(),
            member_name: "Demo User".to_string(),
            seed_count: 24,
            upload_delay: Duration::from_millis(300),
            json_events: false,
        }
    }
}

impl DemoConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("CHATLINE_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(id) = lookup("CHATLINE_DEMO_CHATROOM") {
            if !id.trim().is_empty() {
                config.chatroom_id = id;
            }
        }

        if let Some(name) = lookup("CHATLINE_DEMO_MEMBER") {
            config.member_name = name;
        }

        if let Some(val) = lookup("CHATLINE_DEMO_SEED") {
            match val.parse::<usize>() {
                Ok(n) => config.seed_count = n,
                Err(_) => tracing::warn!(value = %val, "Invalid CHATLINE_DEMO_SEED, using default"),
            }
        }

        if let Some(val) = lookup("CHATLINE_DEMO_UPLOAD_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.upload_delay = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid CHATLINE_DEMO_UPLOAD_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("CHATLINE_DEMO_JSON") {
            config.json_events = val != "false" && val != "0";
        }

        config
    }
}

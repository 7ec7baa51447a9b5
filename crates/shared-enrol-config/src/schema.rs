//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Daemon settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Enrolment method defaults
    #[serde(default)]
    pub plugin: RawPluginConfig,

    /// Host integration settings
    #[serde(default)]
    pub host: RawHostConfig,

    /// Expiry sweep schedule
    #[serde(default)]
    pub task: RawTaskConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Data directory for the database
    pub data_dir: Option<PathBuf>,

    /// Default log filter (overridden by RUST_LOG)
    pub log_level: Option<String>,
}

/// Method-wide settings and defaults for new instances
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPluginConfig {
    /// Method enabled site-wide. When false the sweep does nothing.
    pub enabled: Option<bool>,

    /// Status of new instances: "enabled" or "disabled"
    pub status: Option<String>,

    /// Default role for new instances
    pub role_id: Option<i64>,

    /// Default enrolment period in seconds, 0 = unlimited
    pub enrol_period_seconds: Option<u64>,

    /// Default start: "course_start", "today" or "now"
    pub enrol_start: Option<String>,

    /// Action on expiry. Only "unenrol" exists.
    pub expired_action: Option<String>,

    /// Add an instance to every new course
    pub default_enrol: Option<bool>,
}

/// Host integration settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostConfig {
    /// The site's front page course
    pub site_course_id: Option<i64>,

    /// Tag enrolment role assignments with the owning instance
    pub roles_protected: Option<bool>,

    /// Recover archived grades on re-enrolment by default
    pub recover_grades_default: Option<bool>,
}

/// Scheduled task definition (cron-like fields)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTaskConfig {
    pub minute: Option<String>,
    pub hour: Option<String>,
    pub day: Option<String>,
    pub month: Option<String>,
    pub day_of_week: Option<String>,

    /// Other jobs may not run alongside this one
    #[serde(default)]
    pub blocking: bool,

    #[serde(default)]
    pub disabled: bool,
}

//! Validated settings

use crate::schedule::Schedule;
use crate::schema::{RawConfig, RawDaemonConfig, RawHostConfig, RawPluginConfig, RawTaskConfig};
use crate::validation::{
    parse_enrol_start, parse_expired_action, parse_instance_status, parse_schedule,
};
use shared_enrol_api::{EnrolStartPolicy, ExpiredAction, InstanceStatus};
use shared_enrol_util::{CourseId, RoleId, default_data_dir};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the expiry sweep task
pub const SYNC_TASK_NAME: &str = "shared_enrol_sync";

/// Role given by default to shared enrolments (the stock student role)
pub const DEFAULT_STUDENT_ROLE: RoleId = RoleId::new(5);

/// Validated settings ready for use by the engine and daemon
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonConfig,
    pub plugin: PluginSettings,
    pub host: HostSettings,
    pub task: TaskSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            plugin: PluginSettings::from_raw(raw.plugin),
            host: HostSettings::from_raw(raw.host),
            task: TaskSettings::from_raw(&raw.task),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_level: raw.log_level.unwrap_or_else(|| "info".into()),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}

/// Method-wide switches and defaults for new instances
#[derive(Debug, Clone)]
pub struct PluginSettings {
    /// Method enabled site-wide
    pub enabled: bool,
    pub status: InstanceStatus,
    pub role_id: Option<RoleId>,
    /// Default grant length. None means unlimited.
    pub enrol_period: Option<Duration>,
    pub enrol_start: EnrolStartPolicy,
    pub expired_action: ExpiredAction,
    /// Add an instance to every new course
    pub default_enrol: bool,
}

impl PluginSettings {
    fn from_raw(raw: RawPluginConfig) -> Self {
        Self {
            enabled: raw.enabled.unwrap_or(true),
            status: raw
                .status
                .as_deref()
                .and_then(|s| parse_instance_status(s).ok())
                .unwrap_or(InstanceStatus::Enabled),
            role_id: match raw.role_id {
                // 0 explicitly means "no role"
                Some(0) => None,
                Some(id) => Some(RoleId::new(id)),
                None => Some(DEFAULT_STUDENT_ROLE),
            },
            enrol_period: raw
                .enrol_period_seconds
                .and_then(seconds_to_duration_or_unlimited),
            enrol_start: raw
                .enrol_start
                .as_deref()
                .and_then(|s| parse_enrol_start(s).ok())
                .unwrap_or_default(),
            expired_action: raw
                .expired_action
                .as_deref()
                .and_then(|s| parse_expired_action(s).ok())
                .unwrap_or_default(),
            default_enrol: raw.default_enrol.unwrap_or(true),
        }
    }
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self::from_raw(RawPluginConfig::default())
    }
}

/// Host integration settings
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub site_course_id: CourseId,
    pub roles_protected: bool,
    pub recover_grades_default: bool,
}

impl HostSettings {
    fn from_raw(raw: RawHostConfig) -> Self {
        Self {
            site_course_id: CourseId::new(raw.site_course_id.unwrap_or(1)),
            roles_protected: raw.roles_protected.unwrap_or(true),
            recover_grades_default: raw.recover_grades_default.unwrap_or(false),
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self::from_raw(RawHostConfig::default())
    }
}

/// Expiry sweep task definition
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub name: &'static str,
    pub schedule: Schedule,
    pub blocking: bool,
    pub disabled: bool,
}

impl TaskSettings {
    fn from_raw(raw: &RawTaskConfig) -> Self {
        Self {
            name: SYNC_TASK_NAME,
            schedule: parse_schedule(raw).unwrap_or_default(),
            blocking: raw.blocking,
            disabled: raw.disabled,
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self::from_raw(&RawTaskConfig::default())
    }
}

/// Convert seconds to Duration, treating 0 as "unlimited" (None)
fn seconds_to_duration_or_unlimited(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

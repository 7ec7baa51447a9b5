//! Configuration validation

use crate::schedule::Schedule;
use crate::schema::{RawConfig, RawPluginConfig, RawTaskConfig};
use shared_enrol_api::{EnrolStartPolicy, ExpiredAction, InstanceStatus};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[plugin] {field}: {message}")]
    PluginError { field: &'static str, message: String },

    #[error("[host] {field}: {message}")]
    HostError { field: &'static str, message: String },

    #[error("[task] {field}: {message}")]
    ScheduleError { field: &'static str, message: String },

    #[error("[daemon] {0}")]
    DaemonError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_plugin(&config.plugin));
    errors.extend(validate_task(&config.task));

    if let Some(site) = config.host.site_course_id
        && site <= 0
    {
        errors.push(ValidationError::HostError {
            field: "site_course_id",
            message: format!("must be positive, got {}", site),
        });
    }

    if let Some(level) = &config.daemon.log_level
        && level.trim().is_empty()
    {
        errors.push(ValidationError::DaemonError("log_level cannot be empty".into()));
    }

    errors
}

fn validate_plugin(plugin: &RawPluginConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(status) = &plugin.status
        && let Err(message) = parse_instance_status(status)
    {
        errors.push(ValidationError::PluginError {
            field: "status",
            message,
        });
    }

    if let Some(start) = &plugin.enrol_start
        && let Err(message) = parse_enrol_start(start)
    {
        errors.push(ValidationError::PluginError {
            field: "enrol_start",
            message,
        });
    }

    if let Some(action) = &plugin.expired_action
        && let Err(message) = parse_expired_action(action)
    {
        errors.push(ValidationError::PluginError {
            field: "expired_action",
            message,
        });
    }

    if let Some(role) = plugin.role_id
        && role < 0
    {
        errors.push(ValidationError::PluginError {
            field: "role_id",
            message: format!("must not be negative, got {}", role),
        });
    }

    if let Some(period) = plugin.enrol_period_seconds
        && i64::try_from(period).is_err()
    {
        errors.push(ValidationError::PluginError {
            field: "enrol_period_seconds",
            message: "too large".into(),
        });
    }

    errors
}

fn validate_task(task: &RawTaskConfig) -> Vec<ValidationError> {
    match parse_schedule(task) {
        Ok(_) => Vec::new(),
        Err((field, message)) => vec![ValidationError::ScheduleError { field, message }],
    }
}

pub(crate) fn parse_schedule(task: &RawTaskConfig) -> Result<Schedule, (&'static str, String)> {
    Schedule::parse(
        task.minute.as_deref().unwrap_or("*/10"),
        task.hour.as_deref().unwrap_or("*"),
        task.day.as_deref().unwrap_or("*"),
        task.month.as_deref().unwrap_or("*"),
        task.day_of_week.as_deref().unwrap_or("*"),
    )
}

/// Parse an instance status name
pub fn parse_instance_status(s: &str) -> Result<InstanceStatus, String> {
    match s.to_lowercase().as_str() {
        "enabled" | "yes" => Ok(InstanceStatus::Enabled),
        "disabled" | "no" => Ok(InstanceStatus::Disabled),
        other => Err(format!("Unknown status: {}", other)),
    }
}

/// Parse an enrolment start policy name
pub fn parse_enrol_start(s: &str) -> Result<EnrolStartPolicy, String> {
    match s.to_lowercase().as_str() {
        "course_start" => Ok(EnrolStartPolicy::CourseStart),
        "today" => Ok(EnrolStartPolicy::Today),
        "now" => Ok(EnrolStartPolicy::Now),
        other => Err(format!("Unknown enrolment start: {}", other)),
    }
}

/// Parse the expiry action; only unenrolment is implemented
pub fn parse_expired_action(s: &str) -> Result<ExpiredAction, String> {
    match s.to_lowercase().as_str() {
        "unenrol" => Ok(ExpiredAction::Unenrol),
        other => Err(format!("Unsupported expiry action: {} (only \"unenrol\")", other)),
    }
}

//! Instance settings form contract
//!
//! The form is described as data; rendering belongs to the host UI.

use serde::Serialize;
use shared_enrol_api::{EnrolmentInstance, InstanceStatus};
use shared_enrol_host_api::RoleService;
use shared_enrol_util::{ContextId, Result, RoleId};
use std::collections::BTreeMap;

use crate::{RequestContext, SharedEnrolPlugin};

/// Default unit of the enrolment period field, in seconds (one day)
pub const PERIOD_DEFAULT_UNIT: u64 = 86_400;

pub const FIELD_STATUS: &str = "status";
pub const FIELD_ROLE: &str = "roleid";
pub const FIELD_PERIOD: &str = "enrolperiod";
pub const FIELD_SELF_WARNING: &str = "selfwarn";

const INVALID_DATA: &str = "Invalid data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormOption {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormField {
    Select {
        name: &'static str,
        label: String,
        options: Vec<FormOption>,
        default: Option<i64>,
    },
    /// Duration entered as a number of `default_unit`s; stored in seconds
    Duration {
        name: &'static str,
        label: String,
        optional: bool,
        default_unit: u64,
        default: u64,
    },
    /// Read-only notice
    Static {
        name: &'static str,
        label: String,
        text: String,
    },
}

impl FormField {
    pub fn name(&self) -> &'static str {
        match self {
            FormField::Select { name, .. }
            | FormField::Duration { name, .. }
            | FormField::Static { name, .. } => *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceForm {
    pub fields: Vec<FormField>,
}

impl InstanceForm {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn has_self_warning(&self) -> bool {
        self.field(FIELD_SELF_WARNING).is_some()
    }
}

fn status_options() -> Vec<FormOption> {
    InstanceStatus::ALL
        .iter()
        .map(|status| FormOption {
            value: status.code(),
            label: match status {
                InstanceStatus::Enabled => "Yes".to_string(),
                InstanceStatus::Disabled => "No".to_string(),
            },
        })
        .collect()
}

impl SharedEnrolPlugin {
    /// Roles offered for the instance: those assignable in the context, plus
    /// the currently configured role even when it no longer is.
    pub fn role_options(
        &self,
        instance: Option<&EnrolmentInstance>,
        context: ContextId,
    ) -> Result<Vec<FormOption>> {
        let current = match instance {
            Some(instance) => instance.role_id,
            None => self.settings.role_id,
        };

        let mut roles = self.host.assignable_roles(context)?;
        if let Some(current) = current
            && !roles.iter().any(|r| r.id == current)
            && let Some(role) = self.host.role(current)?
        {
            roles.push(role);
        }

        Ok(roles
            .into_iter()
            .map(|role| FormOption {
                value: role.id.get(),
                label: role.name,
            })
            .collect())
    }

    /// Field definitions for editing `instance`, or for a new instance when
    /// `None`. Defaults come from the instance being edited, else from the
    /// configured defaults.
    pub fn edit_instance_form(
        &self,
        ctx: &RequestContext,
        instance: Option<&EnrolmentInstance>,
        context: ContextId,
    ) -> Result<InstanceForm> {
        let (status, role, period) = match instance {
            Some(i) => (i.status, i.role_id, i.enrol_period),
            None => (
                self.settings.status,
                self.settings.role_id,
                self.settings.enrol_period,
            ),
        };

        let mut fields = vec![
            FormField::Select {
                name: FIELD_STATUS,
                label: "Enable shared enrolments".into(),
                options: status_options(),
                default: Some(status.code()),
            },
            FormField::Select {
                name: FIELD_ROLE,
                label: "Default role".into(),
                options: self.role_options(instance, context)?,
                default: role.map(RoleId::get),
            },
            FormField::Duration {
                name: FIELD_PERIOD,
                label: "Default enrolment duration".into(),
                optional: true,
                default_unit: PERIOD_DEFAULT_UNIT,
                default: period.map(|p| p.as_secs()).unwrap_or(0),
            },
        ];

        if let Some(instance) = instance
            && self.accessing_via_instance(ctx, instance)?
        {
            fields.push(FormField::Static {
                name: FIELD_SELF_WARNING,
                label: "Warning".into(),
                text: "You are enrolled in this course through this enrolment method. \
                       Changes may affect your access to this course."
                    .into(),
            });
        }

        Ok(InstanceForm { fields })
    }

    /// Check submitted form values. Returns field name to message for every
    /// bad field; an empty map means the data is acceptable. Absent fields
    /// are not checked.
    pub fn validate_instance_form(
        &self,
        data: &BTreeMap<String, String>,
        instance: Option<&EnrolmentInstance>,
        context: ContextId,
    ) -> Result<BTreeMap<&'static str, String>> {
        let mut errors = BTreeMap::new();

        if let Some(value) = data.get(FIELD_STATUS)
            && !is_option(value, &status_options())
        {
            errors.insert(FIELD_STATUS, INVALID_DATA.to_string());
        }

        if let Some(value) = data.get(FIELD_ROLE)
            && !is_option(value, &self.role_options(instance, context)?)
        {
            errors.insert(FIELD_ROLE, INVALID_DATA.to_string());
        }

        if let Some(value) = data.get(FIELD_PERIOD)
            && value.trim().parse::<u64>().is_err()
        {
            errors.insert(FIELD_PERIOD, INVALID_DATA.to_string());
        }

        Ok(errors)
    }

    /// The acting user holds an enrolment through this instance
    fn accessing_via_instance(
        &self,
        ctx: &RequestContext,
        instance: &EnrolmentInstance,
    ) -> Result<bool> {
        match ctx.acting_user() {
            Some(user) => Ok(self.store.get_user_enrolment(instance.id, user)?.is_some()),
            None => Ok(false),
        }
    }
}

fn is_option(value: &str, options: &[FormOption]) -> bool {
    value
        .trim()
        .parse::<i64>()
        .is_ok_and(|v| options.iter().any(|o| o.value == v))
}

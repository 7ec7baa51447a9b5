//! Permission capabilities checked by the instance manager

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capabilities the host is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// General "configure enrolment methods in this course"
    #[serde(rename = "moodle/course:enrolconfig")]
    CourseEnrolConfig,

    /// Configure the shared enrolment method specifically
    #[serde(rename = "enrol/shared:config")]
    SharedConfig,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::CourseEnrolConfig => "moodle/course:enrolconfig",
            Capability::SharedConfig => "enrol/shared:config",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moodle/course:enrolconfig" => Ok(Capability::CourseEnrolConfig),
            "enrol/shared:config" => Ok(Capability::SharedConfig),
            other => Err(format!("Unknown capability: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_round_trip() {
        for cap in [Capability::CourseEnrolConfig, Capability::SharedConfig] {
            assert_eq!(cap.name().parse::<Capability>().unwrap(), cap);
        }
        assert!("enrol/manual:config".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_serializes_as_name() {
        let json = serde_json::to_string(&Capability::SharedConfig).unwrap();
        assert_eq!(json, "\"enrol/shared:config\"");
    }
}

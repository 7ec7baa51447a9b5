//! Strongly-typed identifiers
//!
//! Host records are keyed by integer ids; each kind gets its own newtype so a
//! user id can never be passed where a course id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

int_id!(
    /// Course identifier
    CourseId
);
int_id!(
    /// User identifier
    UserId
);
int_id!(
    /// Enrolment instance identifier
    InstanceId
);
int_id!(
    /// User enrolment record identifier
    UserEnrolmentId
);
int_id!(
    /// Role identifier
    RoleId
);
int_id!(
    /// Permission context identifier (one per course)
    ContextId
);
int_id!(
    /// Course group identifier
    GroupId
);

/// Correlation id for one run of the expiry sweep
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_ids_compare_by_value() {
        assert_eq!(CourseId::new(4), CourseId::from(4));
        assert_ne!(UserId::new(1), UserId::new(2));
        assert!(InstanceId::new(1) < InstanceId::new(2));
    }

    #[test]
    fn int_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&UserId::new(42)).unwrap();
        assert_eq!(json, "42");

        let parsed: CourseId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, CourseId::new(7));
    }

    #[test]
    fn sync_run_id_uniqueness() {
        assert_ne!(SyncRunId::new(), SyncRunId::new());
    }
}

//! Local host adapter: connection, schema and directory administration

use rusqlite::{Connection, OptionalExtension, params};
use shared_enrol_config::HostSettings;
use shared_enrol_host_api::{Capability, HostError, HostResult, Ownership};
use shared_enrol_util::{ContextId, CourseId, GroupId, InstanceId, RoleId, Timestamp, UserId};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Host file kept next to the enrolment store
pub const HOST_DB_FILENAME: &str = "host.db";

pub(crate) fn db(e: rusqlite::Error) -> HostError {
    HostError::Database(e.to_string())
}

/// Owner columns as stored; untagged rows use an empty component and item 0
pub(crate) fn owner_columns(owner: Option<&Ownership>) -> (&str, i64) {
    match owner {
        Some(o) => (o.component.as_str(), o.item_id.get()),
        None => ("", 0),
    }
}

pub(crate) fn owner_from_columns(component: String, item_id: i64) -> Option<Ownership> {
    (!component.is_empty()).then(|| Ownership::new(component, InstanceId::new(item_id)))
}

/// Role assignment row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role_id: RoleId,
    pub user_id: UserId,
    pub context_id: ContextId,
    pub owner: Option<Ownership>,
}

/// Host services backed by a local SQLite database
pub struct LocalHost {
    pub(crate) settings: HostSettings,
    conn: Mutex<Connection>,
}

impl LocalHost {
    /// Open or create the host database at the given path
    pub fn open(path: impl AsRef<Path>, settings: HostSettings) -> HostResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db)?;
        let host = Self {
            settings,
            conn: Mutex::new(conn),
        };
        host.init_schema()?;
        info!(path = %path.display(), "Local host opened");
        Ok(host)
    }

    /// Create an in-memory host (for testing)
    pub fn in_memory(settings: HostSettings) -> HostResult<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        let host = Self {
            settings,
            conn: Mutex::new(conn),
        };
        host.init_schema()?;
        Ok(host)
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub(crate) fn conn(&self) -> HostResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HostError::Internal("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> HostResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                context_id INTEGER NOT NULL UNIQUE,
                start_date INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY,
                short_name TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                assignable INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS role_assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                context_id INTEGER NOT NULL,
                component TEXT NOT NULL DEFAULT '',
                item_id INTEGER NOT NULL DEFAULT 0,
                UNIQUE (role_id, user_id, context_id, component, item_id)
            );

            CREATE TABLE IF NOT EXISTS capability_grants (
                user_id INTEGER NOT NULL,
                capability TEXT NOT NULL,
                context_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, capability, context_id)
            );

            CREATE TABLE IF NOT EXISTS course_groups (
                id INTEGER PRIMARY KEY,
                course_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                component TEXT NOT NULL DEFAULT '',
                item_id INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, user_id)
            );

            -- archived = 1 once the user left the course
            CREATE TABLE IF NOT EXISTS grades (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, course_id)
            );

            CREATE TABLE IF NOT EXISTS last_access (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                time_access INTEGER NOT NULL,
                PRIMARY KEY (user_id, course_id)
            );

            CREATE TABLE IF NOT EXISTS dirty_users (
                user_id INTEGER PRIMARY KEY,
                marked_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS enrolment_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                status INTEGER NOT NULL,
                time_start INTEGER NOT NULL,
                time_end INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_role_assignments_user ON role_assignments(user_id, context_id);
            CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);
            "#,
        )
        .map_err(db)?;

        debug!("Local host schema initialized");
        Ok(())
    }

    // Directory administration

    pub fn add_course(
        &self,
        course_id: CourseId,
        context_id: ContextId,
        start: Timestamp,
    ) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO courses (id, context_id, start_date) VALUES (?, ?, ?)",
                params![course_id.get(), context_id.get(), start.secs()],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn add_role(
        &self,
        role_id: RoleId,
        short_name: &str,
        name: &str,
        assignable: bool,
    ) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO roles (id, short_name, name, assignable) VALUES (?, ?, ?, ?)",
                params![role_id.get(), short_name, name, assignable],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn grant_capability(
        &self,
        user_id: UserId,
        capability: Capability,
        context_id: ContextId,
    ) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO capability_grants (user_id, capability, context_id)
                 VALUES (?, ?, ?)",
                params![user_id.get(), capability.name(), context_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn add_group(&self, group_id: GroupId, course_id: CourseId) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO course_groups (id, course_id) VALUES (?, ?)",
                params![group_id.get(), course_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        owner: Option<&Ownership>,
    ) -> HostResult<()> {
        let (component, item_id) = owner_columns(owner);
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO group_members (group_id, user_id, component, item_id)
                 VALUES (?, ?, ?, ?)",
                params![group_id.get(), user_id.get(), component, item_id],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn record_grade(&self, user_id: UserId, course_id: CourseId) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO grades (user_id, course_id, archived) VALUES (?, ?, 0)",
                params![user_id.get(), course_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn record_access(&self, user_id: UserId, course_id: CourseId, at: Timestamp) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO last_access (user_id, course_id, time_access) VALUES (?, ?, ?)",
                params![user_id.get(), course_id.get(), at.secs()],
            )
            .map_err(db)?;
        Ok(())
    }

    // Inspection

    pub fn role_assignments(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> HostResult<Vec<RoleAssignment>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT role_id, component, item_id FROM role_assignments
                 WHERE user_id = ? AND context_id = ? ORDER BY id ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![user_id.get(), context_id.get()], |row| {
                Ok(RoleAssignment {
                    role_id: RoleId::new(row.get(0)?),
                    user_id,
                    context_id,
                    owner: owner_from_columns(row.get(1)?, row.get(2)?),
                })
            })
            .map_err(db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db)
    }

    /// Grade state of the user in the course: None, or whether it is archived
    pub fn grade_archived(&self, user_id: UserId, course_id: CourseId) -> HostResult<Option<bool>> {
        self.conn()?
            .query_row(
                "SELECT archived FROM grades WHERE user_id = ? AND course_id = ?",
                params![user_id.get(), course_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)
    }

    pub fn last_access(&self, user_id: UserId, course_id: CourseId) -> HostResult<Option<Timestamp>> {
        let secs: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT time_access FROM last_access WHERE user_id = ? AND course_id = ?",
                params![user_id.get(), course_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        Ok(secs.map(Timestamp::from_secs))
    }

    pub fn is_user_dirty(&self, user_id: UserId) -> HostResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT user_id FROM dirty_users WHERE user_id = ?",
                [user_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        Ok(found.is_some())
    }

    /// Names of emitted events, newest first
    pub fn recent_event_names(&self, limit: usize) -> HostResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM events ORDER BY id DESC LIMIT ?")
            .map_err(db)?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get(0))
            .map_err(db)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(db)
    }
}

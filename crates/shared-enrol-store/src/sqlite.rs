//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use shared_enrol_api::{
    EnrolStartPolicy, EnrolmentInstance, ExpiredEnrolment, InstanceStatus, UnknownCode,
    UserEnrolment, UserEnrolmentStatus,
};
use shared_enrol_util::{
    CourseId, InstanceId, RoleId, Timestamp, UserEnrolmentId, UserId,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult, TaskState};

const INSTANCE_COLUMNS: &str = "id, enrol, course_id, status, role_id, enrol_period, \
                                enrol_start, time_created, time_modified";

const USER_ENROLMENT_COLUMNS: &str = "ue.id, ue.instance_id, ue.user_id, ue.status, \
                                      ue.time_start, ue.time_end, ue.modifier_id, \
                                      ue.time_created, ue.time_modified";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enrolment method instances (all methods)
            CREATE TABLE IF NOT EXISTS enrol_instances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                enrol TEXT NOT NULL,
                course_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                role_id INTEGER,
                enrol_period INTEGER NOT NULL DEFAULT 0,
                enrol_start INTEGER NOT NULL DEFAULT 4,
                time_created INTEGER NOT NULL,
                time_modified INTEGER NOT NULL
            );

            -- One record per (instance, user)
            CREATE TABLE IF NOT EXISTS user_enrolments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                time_start INTEGER NOT NULL DEFAULT 0,
                time_end INTEGER NOT NULL DEFAULT 0,
                modifier_id INTEGER NOT NULL DEFAULT 0,
                time_created INTEGER NOT NULL,
                time_modified INTEGER NOT NULL,
                UNIQUE (instance_id, user_id)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Scheduled task state
            CREATE TABLE IF NOT EXISTS task_state (
                name TEXT PRIMARY KEY,
                last_run TEXT NOT NULL,
                last_result INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_instances_course ON enrol_instances(course_id, enrol);
            CREATE INDEX IF NOT EXISTS idx_user_enrolments_user ON user_enrolments(user_id);
            CREATE INDEX IF NOT EXISTS idx_user_enrolments_end ON user_enrolments(time_end);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn decode<T>(idx: usize, value: Result<T, UnknownCode>) -> rusqlite::Result<T> {
    value.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<EnrolmentInstance> {
    let role_id: Option<i64> = row.get(4)?;
    let period: i64 = row.get(5)?;

    Ok(EnrolmentInstance {
        id: InstanceId::new(row.get(0)?),
        enrol: row.get(1)?,
        course_id: CourseId::new(row.get(2)?),
        status: decode(3, InstanceStatus::from_code(row.get(3)?))?,
        role_id: role_id.filter(|id| *id > 0).map(RoleId::new),
        enrol_period: (period > 0).then(|| Duration::from_secs(period as u64)),
        enrol_start: decode(6, EnrolStartPolicy::from_code(row.get(6)?))?,
        time_created: Timestamp::from_secs(row.get(7)?),
        time_modified: Timestamp::from_secs(row.get(8)?),
    })
}

fn user_enrolment_from_row(row: &Row<'_>) -> rusqlite::Result<UserEnrolment> {
    Ok(UserEnrolment {
        id: UserEnrolmentId::new(row.get(0)?),
        instance_id: InstanceId::new(row.get(1)?),
        user_id: UserId::new(row.get(2)?),
        status: decode(3, UserEnrolmentStatus::from_code(row.get(3)?))?,
        time_start: Timestamp::from_secs(row.get(4)?),
        time_end: Timestamp::from_secs(row.get(5)?),
        modifier_id: UserId::new(row.get(6)?),
        time_created: Timestamp::from_secs(row.get(7)?),
        time_modified: Timestamp::from_secs(row.get(8)?),
    })
}

fn period_secs(period: Option<Duration>) -> i64 {
    period
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn parse_local(s: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| shared_enrol_util::now())
}

impl Store for SqliteStore {
    fn instance_exists(&self, course: CourseId, enrol: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM enrol_instances WHERE course_id = ? AND enrol = ? LIMIT 1",
                params![course.get(), enrol],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_instance(&self, id: InstanceId) -> StoreResult<Option<EnrolmentInstance>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM enrol_instances WHERE id = ?");
        Ok(conn
            .query_row(&sql, [id.get()], instance_from_row)
            .optional()?)
    }

    fn instances_for_course(
        &self,
        course: CourseId,
        enrol: &str,
    ) -> StoreResult<Vec<EnrolmentInstance>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM enrol_instances \
             WHERE course_id = ? AND enrol = ? ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![course.get(), enrol], instance_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_instance(&self, instance: &EnrolmentInstance) -> StoreResult<InstanceId> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO enrol_instances
                (enrol, course_id, status, role_id, enrol_period, enrol_start, time_created, time_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                instance.enrol,
                instance.course_id.get(),
                instance.status.code(),
                instance.role_id.map(RoleId::get),
                period_secs(instance.enrol_period),
                instance.enrol_start.code(),
                instance.time_created.secs(),
                instance.time_modified.secs(),
            ],
        )?;

        let id = InstanceId::new(conn.last_insert_rowid());
        debug!(instance_id = %id, course_id = %instance.course_id, enrol = %instance.enrol, "Instance inserted");
        Ok(id)
    }

    fn update_instance(&self, instance: &EnrolmentInstance) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE enrol_instances
            SET status = ?, role_id = ?, enrol_period = ?, enrol_start = ?, time_modified = ?
            WHERE id = ?
            "#,
            params![
                instance.status.code(),
                instance.role_id.map(RoleId::get),
                period_secs(instance.enrol_period),
                instance.enrol_start.code(),
                instance.time_modified.secs(),
                instance.id.get(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("instance {}", instance.id)));
        }
        debug!(instance_id = %instance.id, "Instance updated");
        Ok(())
    }

    fn delete_instance(&self, id: InstanceId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM enrol_instances WHERE id = ?", [id.get()])?;
        debug!(instance_id = %id, "Instance deleted");
        Ok(())
    }

    fn get_user_enrolment(
        &self,
        instance: InstanceId,
        user: UserId,
    ) -> StoreResult<Option<UserEnrolment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {USER_ENROLMENT_COLUMNS} FROM user_enrolments ue \
             WHERE ue.instance_id = ? AND ue.user_id = ?"
        );
        Ok(conn
            .query_row(&sql, params![instance.get(), user.get()], user_enrolment_from_row)
            .optional()?)
    }

    fn insert_user_enrolment(&self, enrolment: &UserEnrolment) -> StoreResult<UserEnrolmentId> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO user_enrolments
                (instance_id, user_id, status, time_start, time_end, modifier_id, time_created, time_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                enrolment.instance_id.get(),
                enrolment.user_id.get(),
                enrolment.status.code(),
                enrolment.time_start.secs(),
                enrolment.time_end.secs(),
                enrolment.modifier_id.get(),
                enrolment.time_created.secs(),
                enrolment.time_modified.secs(),
            ],
        )?;

        let id = UserEnrolmentId::new(conn.last_insert_rowid());
        debug!(user_enrolment_id = %id, user_id = %enrolment.user_id, "User enrolment inserted");
        Ok(id)
    }

    fn update_user_enrolment(&self, enrolment: &UserEnrolment) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE user_enrolments
            SET status = ?, time_start = ?, time_end = ?, modifier_id = ?, time_modified = ?
            WHERE id = ?
            "#,
            params![
                enrolment.status.code(),
                enrolment.time_start.secs(),
                enrolment.time_end.secs(),
                enrolment.modifier_id.get(),
                enrolment.time_modified.secs(),
                enrolment.id.get(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("user enrolment {}", enrolment.id)));
        }
        Ok(())
    }

    fn delete_user_enrolment(&self, id: UserEnrolmentId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM user_enrolments WHERE id = ?", [id.get()])?;
        debug!(user_enrolment_id = %id, "User enrolment deleted");
        Ok(())
    }

    fn user_enrolments_for_instance(
        &self,
        instance: InstanceId,
    ) -> StoreResult<Vec<UserEnrolment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {USER_ENROLMENT_COLUMNS} FROM user_enrolments ue \
             WHERE ue.instance_id = ? ORDER BY ue.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([instance.get()], user_enrolment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn user_has_any_enrolment(&self, user: UserId, course: CourseId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                r#"
                SELECT 1 FROM user_enrolments ue
                JOIN enrol_instances e ON e.id = ue.instance_id
                WHERE ue.user_id = ? AND e.course_id = ?
                LIMIT 1
                "#,
                params![user.get(), course.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn expired_user_enrolments(
        &self,
        enrol: &str,
        now: Timestamp,
        course: Option<CourseId>,
        after: UserEnrolmentId,
        limit: usize,
    ) -> StoreResult<Vec<ExpiredEnrolment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {USER_ENROLMENT_COLUMNS}, e.course_id \
             FROM user_enrolments ue \
             JOIN enrol_instances e ON e.id = ue.instance_id \
             WHERE e.enrol = ?1 AND ue.time_end > 0 AND ue.time_end < ?2 AND ue.id > ?3 \
               AND (?4 IS NULL OR e.course_id = ?4) \
             ORDER BY ue.id ASC LIMIT ?5"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                enrol,
                now.secs(),
                after.get(),
                course.map(CourseId::get),
                i64::try_from(limit).unwrap_or(i64::MAX),
            ],
            |row| {
                Ok(ExpiredEnrolment {
                    user_enrolment: user_enrolment_from_row(row)?,
                    course_id: CourseId::new(row.get(9)?),
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp: parse_local(&timestamp_str),
                event,
            });
        }

        Ok(events)
    }

    fn load_task_state(&self, name: &str) -> StoreResult<Option<TaskState>> {
        let conn = self.conn()?;

        let row: Option<(String, i32)> = conn
            .query_row(
                "SELECT last_run, last_result FROM task_state WHERE name = ?",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(last_run, last_result)| TaskState {
            name: name.to_string(),
            last_run: parse_local(&last_run),
            last_result,
        }))
    }

    fn save_task_state(&self, state: &TaskState) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO task_state (name, last_run, last_result)
            VALUES (?, ?, ?)
            ON CONFLICT(name)
            DO UPDATE SET last_run = excluded.last_run, last_result = excluded.last_result
            "#,
            params![state.name, state.last_run.to_rfc3339(), state.last_result],
        )?;

        debug!(task = %state.name, result = state.last_result, "Task state saved");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_enrol_util::SyncRunId;

    fn instance(course: i64, enrol: &str) -> EnrolmentInstance {
        EnrolmentInstance {
            id: InstanceId::new(0),
            enrol: enrol.to_string(),
            course_id: CourseId::new(course),
            status: InstanceStatus::Enabled,
            role_id: Some(RoleId::new(5)),
            enrol_period: Some(Duration::from_secs(86_400)),
            enrol_start: EnrolStartPolicy::Now,
            time_created: Timestamp::from_secs(1000),
            time_modified: Timestamp::from_secs(1000),
        }
    }

    fn enrolment(instance: InstanceId, user: i64, time_end: i64) -> UserEnrolment {
        UserEnrolment {
            id: UserEnrolmentId::new(0),
            instance_id: instance,
            user_id: UserId::new(user),
            status: UserEnrolmentStatus::Active,
            time_start: Timestamp::from_secs(1000),
            time_end: Timestamp::from_secs(time_end),
            modifier_id: UserId::new(2),
            time_created: Timestamp::from_secs(1000),
            time_modified: Timestamp::from_secs(1000),
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_instance_crud() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.instance_exists(CourseId::new(7), "shared").unwrap());

        let id = store.insert_instance(&instance(7, "shared")).unwrap();
        assert!(store.instance_exists(CourseId::new(7), "shared").unwrap());
        assert!(!store.instance_exists(CourseId::new(7), "manual").unwrap());

        let mut loaded = store.get_instance(id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.enrol_period, Some(Duration::from_secs(86_400)));

        loaded.role_id = None;
        loaded.enrol_period = None;
        loaded.status = InstanceStatus::Disabled;
        store.update_instance(&loaded).unwrap();

        let reloaded = store.get_instance(id).unwrap().unwrap();
        assert_eq!(reloaded.role_id, None);
        assert_eq!(reloaded.enrol_period, None);
        assert_eq!(reloaded.status, InstanceStatus::Disabled);

        store.delete_instance(id).unwrap();
        assert!(store.get_instance(id).unwrap().is_none());
    }

    #[test]
    fn test_instances_for_course_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.insert_instance(&instance(7, "shared")).unwrap();
        store.insert_instance(&instance(7, "manual")).unwrap();
        let b = store.insert_instance(&instance(7, "shared")).unwrap();
        store.insert_instance(&instance(8, "shared")).unwrap();

        let ids: Vec<_> = store
            .instances_for_course(CourseId::new(7), "shared")
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let mut missing = instance(7, "shared");
        missing.id = InstanceId::new(99);
        assert!(matches!(
            store.update_instance(&missing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_user_enrolment_crud() {
        let store = SqliteStore::in_memory().unwrap();
        let inst = store.insert_instance(&instance(7, "shared")).unwrap();
        let user = UserId::new(40);

        assert!(store.get_user_enrolment(inst, user).unwrap().is_none());
        assert!(!store.user_has_any_enrolment(user, CourseId::new(7)).unwrap());

        let id = store.insert_user_enrolment(&enrolment(inst, 40, 0)).unwrap();
        let mut ue = store.get_user_enrolment(inst, user).unwrap().unwrap();
        assert_eq!(ue.id, id);
        assert!(store.user_has_any_enrolment(user, CourseId::new(7)).unwrap());
        assert!(!store.user_has_any_enrolment(user, CourseId::new(8)).unwrap());

        ue.status = UserEnrolmentStatus::Suspended;
        ue.time_end = Timestamp::from_secs(5000);
        store.update_user_enrolment(&ue).unwrap();
        assert_eq!(store.get_user_enrolment(inst, user).unwrap(), Some(ue));

        assert_eq!(store.user_enrolments_for_instance(inst).unwrap().len(), 1);
        store.delete_user_enrolment(id).unwrap();
        assert!(store.user_enrolments_for_instance(inst).unwrap().is_empty());
    }

    #[test]
    fn test_one_record_per_instance_user() {
        let store = SqliteStore::in_memory().unwrap();
        let inst = store.insert_instance(&instance(7, "shared")).unwrap();
        store.insert_user_enrolment(&enrolment(inst, 40, 0)).unwrap();
        assert!(store.insert_user_enrolment(&enrolment(inst, 40, 0)).is_err());
    }

    #[test]
    fn test_any_enrolment_spans_methods() {
        let store = SqliteStore::in_memory().unwrap();
        let shared = store.insert_instance(&instance(7, "shared")).unwrap();
        let manual = store.insert_instance(&instance(7, "manual")).unwrap();
        let user = UserId::new(40);

        let a = store.insert_user_enrolment(&enrolment(shared, 40, 0)).unwrap();
        store.insert_user_enrolment(&enrolment(manual, 40, 0)).unwrap();
        store.delete_user_enrolment(a).unwrap();

        assert!(store.user_has_any_enrolment(user, CourseId::new(7)).unwrap());
    }

    #[test]
    fn test_expired_scan_boundaries() {
        let store = SqliteStore::in_memory().unwrap();
        let inst = store.insert_instance(&instance(7, "shared")).unwrap();
        let manual = store.insert_instance(&instance(7, "manual")).unwrap();

        store.insert_user_enrolment(&enrolment(inst, 1, 0)).unwrap();
        store.insert_user_enrolment(&enrolment(inst, 2, 5000)).unwrap();
        store.insert_user_enrolment(&enrolment(inst, 3, 4999)).unwrap();
        store.insert_user_enrolment(&enrolment(inst, 4, 5001)).unwrap();
        store.insert_user_enrolment(&enrolment(manual, 5, 10)).unwrap();

        let expired = store
            .expired_user_enrolments(
                "shared",
                Timestamp::from_secs(5000),
                None,
                UserEnrolmentId::new(0),
                100,
            )
            .unwrap();

        let users: Vec<_> = expired.iter().map(|e| e.user_enrolment.user_id.get()).collect();
        assert_eq!(users, vec![3]);
        assert_eq!(expired[0].course_id, CourseId::new(7));
    }

    #[test]
    fn test_expired_scan_pages_and_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.insert_instance(&instance(7, "shared")).unwrap();
        let b = store.insert_instance(&instance(8, "shared")).unwrap();
        for user in 1..=5 {
            store.insert_user_enrolment(&enrolment(a, user, 10)).unwrap();
            store.insert_user_enrolment(&enrolment(b, user, 10)).unwrap();
        }
        let now = Timestamp::from_secs(100);

        let first = store
            .expired_user_enrolments("shared", now, Some(CourseId::new(7)), UserEnrolmentId::new(0), 2)
            .unwrap();
        assert_eq!(first.len(), 2);

        let last_id = first[1].user_enrolment.id;
        let rest = store
            .expired_user_enrolments("shared", now, Some(CourseId::new(7)), last_id, 10)
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|e| e.course_id == CourseId::new(7)));
        assert!(rest.iter().all(|e| e.user_enrolment.id > last_id));

        let all = store
            .expired_user_enrolments("shared", now, None, UserEnrolmentId::new(0), 100)
            .unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::SyncStarted {
                run_id: SyncRunId::new(),
                course_id: Some(CourseId::new(3)),
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].event,
            AuditEventType::SyncStarted { course_id: Some(c), .. } if c == CourseId::new(3)
        ));
        assert!(matches!(events[1].event, AuditEventType::DaemonStarted));
    }

    #[test]
    fn test_task_state() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load_task_state("shared_enrol_sync").unwrap().is_none());

        let state = TaskState {
            name: "shared_enrol_sync".into(),
            last_run: shared_enrol_util::now(),
            last_result: 0,
        };
        store.save_task_state(&state).unwrap();
        store
            .save_task_state(&TaskState {
                last_result: 2,
                ..state.clone()
            })
            .unwrap();

        let loaded = store.load_task_state("shared_enrol_sync").unwrap().unwrap();
        assert_eq!(loaded.last_result, 2);
        assert!((loaded.last_run - state.last_run).num_seconds().abs() < 1);
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared-enrol.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_instance(&instance(7, "shared")).unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_instance(id).unwrap().is_some());
    }
}

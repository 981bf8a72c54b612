//! SQLite storage.
//!
//! One connection behind a mutex; every store call is a short-lived blocking
//! operation inside a request, and multi-statement operations (bulk upsert,
//! statistics recompute) run in a transaction so partial writes are never
//! observable.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::Connection;

use campuswatch_api::{
    CreateReportRequest, NewUser, ProjectReportStats, Report, ReportReason, ReportStatus,
    ServiceError, StudentSearchResult, User, UserReportStats, service,
};

/// Shared database handle.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

/// Initialize the database: open the file, enable WAL, run migrations.
pub fn init_db(db_path: &Path) -> Result<Db> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path).context("opening SQLite database")?;
    init_conn(&conn)?;
    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn init_conn(conn: &Connection) -> Result<()> {
    // WAL keeps readers unblocked while a request writes
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    run_migrations(conn)?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let migrations = vec![("0001_init", include_str!("../../../migrations/0001_init.sql"))];

    for (name, sql) in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

const USER_COLUMNS: &str = "id, login, email, display_name, is_staff, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        is_staff: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let status: String = row.get(6)?;
    Ok(Report {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        reported_student_login: row.get(2)?,
        project_name: row.get(3)?,
        reason: row.get(4)?,
        explanation: row.get(5)?,
        status: ReportStatus::parse(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(7)?,
        reviewed_at: row.get(8)?,
        reviewed_by: row.get(9)?,
    })
}

impl Db {
    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ── Users ───────────────────────────────────────────────────────────

    /// Insert or update a user keyed by login. Re-login overwrites profile
    /// fields but never touches the staff flag — staff status is provisioned
    /// directly against the store.
    pub fn upsert_user(&self, user: &NewUser) -> Result<User, ServiceError> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "INSERT INTO users (login, email, display_name) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(login) DO UPDATE SET \
                     email = excluded.email, display_name = excluded.display_name \
                 RETURNING {USER_COLUMNS}"
            ),
            rusqlite::params![&user.login, &user.email, &user.display_name],
            user_from_row,
        )
        .map_err(ServiceError::from_db("upsert user"))
    }

    pub fn user_by_login(&self, login: &str) -> Result<Option<User>, ServiceError> {
        let conn = self.conn();
        match conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE login = ?1"),
            [login],
            user_from_row,
        ) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ServiceError::from_db("get user by login")(e)),
        }
    }

    pub fn user_count(&self) -> Result<i64, ServiceError> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(ServiceError::from_db("count users"))
    }

    /// Local directory search over login and display name, capped at 10 hits.
    pub fn search_users(&self, query: &str) -> Result<Vec<StudentSearchResult>, ServiceError> {
        let pattern = format!("%{query}%");
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT login, display_name, email FROM users \
                 WHERE login LIKE ?1 OR display_name LIKE ?1 \
                 ORDER BY login LIMIT 10",
            )
            .map_err(ServiceError::from_db("prepare user search"))?;
        let rows = stmt
            .query_map([&pattern], |row| {
                Ok(StudentSearchResult {
                    login: row.get(0)?,
                    display_name: row.get(1)?,
                    email: row.get(2)?,
                })
            })
            .map_err(ServiceError::from_db("search users"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ServiceError::from_db("read search rows"))
    }

    /// Replace the local directory with the given campus members, one
    /// transaction for the whole batch. Any row failure rolls everything back.
    pub fn bulk_upsert_users(&self, users: &[NewUser]) -> Result<usize, ServiceError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(ServiceError::from_db("open bulk upsert transaction"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO users (login, email, display_name) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(login) DO UPDATE SET \
                         email = excluded.email, display_name = excluded.display_name",
                )
                .map_err(ServiceError::from_db("prepare bulk upsert"))?;
            for user in users {
                stmt.execute(rusqlite::params![
                    &user.login,
                    &user.email,
                    &user.display_name
                ])
                .map_err(ServiceError::from_db("bulk upsert row"))?;
            }
        }
        tx.commit()
            .map_err(ServiceError::from_db("commit bulk upsert"))?;
        Ok(users.len())
    }

    // ── Reports ─────────────────────────────────────────────────────────

    /// Insert a new pending report, returning its id.
    pub fn create_report(
        &self,
        reporter_id: i64,
        req: &CreateReportRequest,
    ) -> Result<i64, ServiceError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO reports \
                 (reporter_id, reported_student_login, project_name, reason, explanation) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                reporter_id,
                &req.reported_student_login,
                &req.project_name,
                &req.reason,
                &req.explanation,
            ],
        )
        .map_err(ServiceError::from_db("insert report"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Pending reports against one (student, project) pair. Trigger input
    /// for staff notification; resolved reports do not count.
    pub fn pending_report_count(
        &self,
        student_login: &str,
        project_name: &str,
    ) -> Result<i64, ServiceError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM reports \
             WHERE reported_student_login = ?1 AND project_name = ?2 AND status = 'pending'",
            [student_login, project_name],
            |row| row.get(0),
        )
        .map_err(ServiceError::from_db("count pending reports"))
    }

    pub fn pending_reports(&self) -> Result<Vec<Report>, ServiceError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, reporter_id, reported_student_login, project_name, reason, \
                        explanation, status, created_at, reviewed_at, reviewed_by \
                 FROM reports WHERE status = 'pending' \
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(ServiceError::from_db("prepare pending reports"))?;
        let rows = stmt
            .query_map([], report_from_row)
            .map_err(ServiceError::from_db("list pending reports"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ServiceError::from_db("read report rows"))
    }

    /// Move a pending report to a terminal state. The transition is
    /// one-directional and single-step: a second review of the same report
    /// is a conflict, an unknown id is not found.
    pub fn review_report(
        &self,
        report_id: i64,
        status: ReportStatus,
        reviewer_id: i64,
    ) -> Result<(), ServiceError> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE reports \
                 SET status = ?1, reviewed_by = ?2, reviewed_at = datetime('now') \
                 WHERE id = ?3 AND status = 'pending'",
                rusqlite::params![status.as_str(), reviewer_id, report_id],
            )
            .map_err(ServiceError::from_db("update report status"))?;

        if changed == 0 {
            let existing: Option<String> = conn
                .query_row("SELECT status FROM reports WHERE id = ?1", [report_id], |row| {
                    row.get(0)
                })
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(ServiceError::from_db("check report status")(other)),
                })?;
            return match existing {
                None => Err(ServiceError::NotFound("report not found".into())),
                Some(current) => Err(ServiceError::Conflict(format!(
                    "report already {current}"
                ))),
            };
        }
        Ok(())
    }

    pub fn report_reasons(&self) -> Result<Vec<ReportReason>, ServiceError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, reason, description FROM report_reasons ORDER BY reason")
            .map_err(ServiceError::from_db("prepare report reasons"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ReportReason {
                    id: row.get(0)?,
                    reason: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(ServiceError::from_db("list report reasons"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ServiceError::from_db("read reason rows"))
    }

    /// Ranking of projects by report volume for the staff dashboard.
    pub fn most_reported_projects(&self) -> Result<Vec<ProjectReportStats>, ServiceError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT project_name, \
                        COUNT(*) AS total, \
                        SUM(status = 'pending'), \
                        SUM(status = 'approved'), \
                        SUM(status = 'rejected'), \
                        COUNT(DISTINCT reported_student_login) \
                 FROM reports \
                 GROUP BY project_name \
                 ORDER BY total DESC, project_name ASC",
            )
            .map_err(ServiceError::from_db("prepare project stats"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectReportStats {
                    project_name: row.get(0)?,
                    total_reports: row.get(1)?,
                    pending_reports: row.get(2)?,
                    approved_reports: row.get(3)?,
                    rejected_reports: row.get(4)?,
                    reported_students: row.get(5)?,
                })
            })
            .map_err(ServiceError::from_db("list project stats"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ServiceError::from_db("read project stat rows"))
    }

    // ── Notifications & Statistics ──────────────────────────────────────

    /// Record that a (student, project) pair hit the report threshold.
    pub fn create_staff_notification(
        &self,
        student_login: &str,
        project_name: &str,
        report_count: i64,
    ) -> Result<i64, ServiceError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO staff_notifications \
                 (reported_student_login, project_name, report_count) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![student_login, project_name, report_count],
        )
        .map_err(ServiceError::from_db("insert staff notification"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Recompute a reporter's statistics from all their resolved reports and
    /// replace the stats row in one transaction. Maintenance operation — no
    /// handler calls this automatically.
    pub fn recompute_user_stats(&self, user_id: i64) -> Result<UserReportStats, ServiceError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(ServiceError::from_db("open stats transaction"))?;

        let (total, approved, rejected): (i64, i64, i64) = tx
            .query_row(
                "SELECT COUNT(*), \
                        COALESCE(SUM(status = 'approved'), 0), \
                        COALESCE(SUM(status = 'rejected'), 0) \
                 FROM reports WHERE reporter_id = ?1 AND status != 'pending'",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(ServiceError::from_db("aggregate resolved reports"))?;

        let ratio = service::false_report_ratio(total, rejected);

        tx.execute(
            "INSERT OR REPLACE INTO user_report_stats \
                 (user_id, total_reports, approved_reports, rejected_reports, false_report_ratio) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, total, approved, rejected, ratio],
        )
        .map_err(ServiceError::from_db("replace stats row"))?;

        tx.commit()
            .map_err(ServiceError::from_db("commit stats transaction"))?;

        Ok(UserReportStats {
            user_id,
            total_reports: total,
            approved_reports: approved,
            rejected_reports: rejected,
            false_report_ratio: ratio,
            warned: false,
        })
    }
}

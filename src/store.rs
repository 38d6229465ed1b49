use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::taxonomy::{PositionCategory, PositionType, Taxonomy, TaxonomyProvider};

/// An accepted claim persisted under a report. References its position type
/// by code, never by copied value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPosition {
    pub code: String,
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub processed_at: DateTime<Utc>,
    pub file_name: String,
    pub positions: Vec<ReportPosition>,
}

/// Optional report-level filters for the read-only query surface.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub id: Option<Uuid>,
    pub file_name: Option<String>,
}

/// The persistence contract the pipeline writes through. `create_report` is
/// atomic: the report and all its positions are durably written together, or
/// not at all.
pub trait ReportRepository: Send + Sync {
    fn create_report(
        &self,
        file_name: &str,
        processed_at: DateTime<Utc>,
        positions: &[ReportPosition],
    ) -> Result<Report>;

    fn get_report(&self, id: &Uuid) -> Result<Option<Report>>;

    fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>>;
}

impl<T: ReportRepository + ?Sized> ReportRepository for std::sync::Arc<T> {
    fn create_report(
        &self,
        file_name: &str,
        processed_at: DateTime<Utc>,
        positions: &[ReportPosition],
    ) -> Result<Report> {
        (**self).create_report(file_name, processed_at, positions)
    }

    fn get_report(&self, id: &Uuid) -> Result<Option<Report>> {
        (**self).get_report(id)
    }

    fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        (**self).list_reports(filter)
    }
}

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE schema_version (version INTEGER NOT NULL);

     CREATE TABLE position_types (
         code TEXT PRIMARY KEY,
         description TEXT NOT NULL,
         category TEXT NOT NULL CHECK (category IN ('asset', 'liability', 'equity'))
     );

     CREATE TABLE reports (
         id TEXT PRIMARY KEY,
         processed_at TEXT NOT NULL,
         file_name TEXT NOT NULL
     );
     CREATE INDEX idx_reports_file_name ON reports(file_name);
     CREATE INDEX idx_reports_processed_at ON reports(processed_at);

     CREATE TABLE report_positions (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
         position_code TEXT NOT NULL REFERENCES position_types(code),
         current REAL,
         previous REAL
     );
     CREATE INDEX idx_report_positions_report ON report_positions(report_id);

     INSERT INTO schema_version (version) VALUES (1);",
)];

/// SQLite-backed store for the taxonomy and persisted reports. Safe to share
/// across concurrent pipeline runs; every write happens inside one
/// transaction.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Taxonomy administration: idempotent upsert of position types. Not part
    /// of the extraction pipeline, which only ever reads the taxonomy.
    pub fn seed_taxonomy(&self, taxonomy: &Taxonomy) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO position_types (code, description, category) VALUES (?1, ?2, ?3)
                 ON CONFLICT(code) DO UPDATE SET
                     description = excluded.description,
                     category = excluded.category",
            )?;
            for position in taxonomy.iter() {
                stmt.execute(params![
                    position.code,
                    position.description,
                    position.category.as_str()
                ])?;
            }
        }
        tx.commit()?;
        info!("Seeded taxonomy with {} position types", taxonomy.len());
        Ok(())
    }

    /// Cascades to the report's positions. Returns whether a report existed.
    pub fn delete_report(&self, id: &Uuid) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }
}

fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current_version: i64 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            debug!("Running store migration v{}", version);
            conn.execute_batch(sql)?;
        }
    }
    Ok(())
}

fn report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Uuid, DateTime<Utc>, String)> {
    let id_raw: String = row.get(0)?;
    let processed_raw: String = row.get(1)?;
    let file_name: String = row.get(2)?;

    let id = Uuid::parse_str(&id_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let processed_at = DateTime::parse_from_rfc3339(&processed_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok((id, processed_at, file_name))
}

fn load_positions(conn: &Connection, report_id: &Uuid) -> rusqlite::Result<Vec<ReportPosition>> {
    let mut stmt = conn.prepare(
        "SELECT position_code, current, previous FROM report_positions
         WHERE report_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![report_id.to_string()], |row| {
        Ok(ReportPosition {
            code: row.get(0)?,
            current: row.get(1)?,
            previous: row.get(2)?,
        })
    })?;
    rows.collect()
}

impl ReportRepository for SqliteReportStore {
    fn create_report(
        &self,
        file_name: &str,
        processed_at: DateTime<Utc>,
        positions: &[ReportPosition],
    ) -> Result<Report> {
        let id = Uuid::new_v4();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO reports (id, processed_at, file_name) VALUES (?1, ?2, ?3)",
            params![id.to_string(), processed_at.to_rfc3339(), file_name],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO report_positions (report_id, position_code, current, previous)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for position in positions {
                // The foreign key makes an out-of-taxonomy code a hard error
                // here, rolling back the whole report.
                stmt.execute(params![
                    id.to_string(),
                    position.code,
                    position.current,
                    position.previous
                ])?;
            }
        }
        tx.commit()?;

        info!(
            "Report {} created with {} positions",
            id,
            positions.len()
        );

        Ok(Report {
            id,
            processed_at,
            file_name: file_name.to_string(),
            positions: positions.to_vec(),
        })
    }

    fn get_report(&self, id: &Uuid) -> Result<Option<Report>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, processed_at, file_name FROM reports WHERE id = ?1")?;

        let result = stmt.query_row(params![id.to_string()], report_row);
        match result {
            Ok((id, processed_at, file_name)) => {
                let positions = load_positions(&conn, &id)?;
                Ok(Some(Report {
                    id,
                    processed_at,
                    file_name,
                    positions,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let conn = self.conn();

        let mut sql = String::from("SELECT id, processed_at, file_name FROM reports");
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(id) = &filter.id {
            clauses.push("id = ?");
            args.push(id.to_string());
        }
        if let Some(file_name) = &filter.file_name {
            clauses.push("file_name = ?");
            args.push(file_name.clone());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY processed_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), report_row)?;

        let mut reports = Vec::new();
        for row in rows {
            let (id, processed_at, file_name) = row?;
            let positions = load_positions(&conn, &id)?;
            reports.push(Report {
                id,
                processed_at,
                file_name,
                positions,
            });
        }
        Ok(reports)
    }
}

impl TaxonomyProvider for SqliteReportStore {
    fn load_taxonomy(&self) -> Result<Taxonomy> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT code, description, category FROM position_types ORDER BY code")
            .map_err(|e| ReportError::TaxonomyUnavailable(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| ReportError::TaxonomyUnavailable(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (code, description, category_raw) =
                row.map_err(|e| ReportError::TaxonomyUnavailable(e.to_string()))?;
            let category: PositionCategory = category_raw
                .parse()
                .map_err(|e: String| ReportError::TaxonomyUnavailable(e))?;
            entries.push(PositionType {
                code,
                description,
                category,
            });
        }

        if entries.is_empty() {
            return Err(ReportError::TaxonomyUnavailable(
                "no position types defined".to_string(),
            ));
        }
        Ok(Taxonomy::from_entries(entries))
    }
}

//! SQLite persistence for scored assessments.
//!
//! Records are insert-only; there is no update path.

use crate::db::{format_ts, parse_ts};
use crate::Result;
use medisage_types::{RiskAssessmentRecord, TestVariant};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub struct AssessmentStore {
    conn: Mutex<Connection>,
}

impl AssessmentStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS assessments (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                test_variant TEXT NOT NULL,
                input_form TEXT NOT NULL,
                score INTEGER NOT NULL,
                risk_label TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assessments_owner_created
                ON assessments(owner_id, created_at);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, record: &RiskAssessmentRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO assessments (
                id, owner_id, test_variant, input_form, score, risk_label, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.test_id.to_string(),
                record.owner_id,
                record.test_variant.as_str(),
                serde_json::to_string(&record.input_form)?,
                record.score,
                record.risk_label.as_str(),
                format_ts(record.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, test_id: Uuid) -> Result<Option<RiskAssessmentRecord>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                "SELECT * FROM assessments WHERE id = ?1",
                params![test_id.to_string()],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// An owner's assessments, newest first.
    pub fn list_by_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<RiskAssessmentRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM assessments
            WHERE owner_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )?;
        let raws = stmt
            .query_map(params![owner_id, limit as i64], RawRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }
}

struct RawRecord {
    id: String,
    owner_id: String,
    test_variant: String,
    input_form: String,
    score: i32,
    risk_label: String,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            test_variant: row.get("test_variant")?,
            input_form: row.get("input_form")?,
            score: row.get("score")?,
            risk_label: row.get("risk_label")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_record(self) -> Result<RiskAssessmentRecord> {
        Ok(RiskAssessmentRecord {
            test_id: Uuid::parse_str(&self.id).unwrap_or_default(),
            owner_id: self.owner_id,
            test_variant: self
                .test_variant
                .parse::<TestVariant>()
                .map_err(crate::EngineError::UnsupportedVariant)?,
            input_form: serde_json::from_str(&self.input_form)?,
            score: self.score,
            risk_label: self
                .risk_label
                .parse()
                .unwrap_or_else(|_| crate::scoring::label_for(self.score)),
            created_at: parse_ts(&self.created_at),
        })
    }
}

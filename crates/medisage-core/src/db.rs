//! SQLite persistence for conversation sessions.
//!
//! Sessions live in `sessions`; their turns live in `turns`, keyed by
//! `(session_id, seq)`. Appends run in a single transaction under the
//! connection lock, so concurrent writers to the same id compose instead of
//! clobbering each other and no half-written append is ever visible.

use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use medisage_types::{ConversationTurn, Session, SessionSummary};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// SQLite-based session store.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Wrap an existing connection, creating tables if needed.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_owner_updated
                ON sessions(owner_id, updated_at);

            CREATE TABLE IF NOT EXISTS turns (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                timestamp TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            );
            "#,
        )?;
        Ok(())
    }

    /// Create the session if absent, then append `turns` in order.
    ///
    /// The owner is fixed by the first writer. Turn timestamps are clamped so
    /// they never run backwards within a session.
    pub fn upsert_append(
        &self,
        session_id: &str,
        owner_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<Session> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_ts(Utc::now());

        tx.execute(
            r#"
            INSERT INTO sessions (id, owner_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(id) DO UPDATE SET
                updated_at = MAX(sessions.updated_at, excluded.updated_at)
            "#,
            params![session_id, owner_id, now],
        )?;

        let last: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, timestamp FROM turns WHERE session_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (mut seq, mut floor) = match last {
            Some((seq, ts)) => (seq + 1, Some(parse_ts(&ts))),
            None => (0, None),
        };

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO turns (session_id, seq, role, content, attachments, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for turn in turns {
                let timestamp = match floor {
                    Some(f) if turn.timestamp < f => f,
                    _ => turn.timestamp,
                };
                stmt.execute(params![
                    session_id,
                    seq,
                    turn.role.as_str(),
                    serde_json::to_string(&turn.content)?,
                    serde_json::to_string(&turn.attachments)?,
                    format_ts(timestamp),
                ])?;
                seq += 1;
                floor = Some(timestamp);
            }
        }

        tx.commit()?;
        debug!(
            target: "medisage::store",
            "Appended {} turns to session {} ({} total)", turns.len(), session_id, seq
        );

        // The row was written above under the same lock.
        Self::load(&conn, session_id)?.ok_or_else(|| {
            crate::EngineError::SessionNotFound(session_id.to_string())
        })
    }

    /// Get a session by id.
    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        Self::load(&conn, session_id)
    }

    /// List an owner's sessions, most recently updated first.
    pub fn list_by_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let conn = self.conn();
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                r#"
                SELECT id FROM sessions
                WHERE owner_id = ?1
                ORDER BY updated_at DESC, id ASC
                LIMIT ?2
                "#,
            )?;
            stmt.query_map(params![owner_id, limit as i64], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = Self::load(&conn, &id)? {
                summaries.push(SessionSummary::from(&session));
            }
        }
        Ok(summaries)
    }

    /// Delete a session and its turns. Returns false when it did not exist.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(removed > 0)
    }

    fn load(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
        let header: Option<(String, String, String)> = conn
            .query_row(
                "SELECT owner_id, created_at, updated_at FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((owner_id, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT role, content, attachments, timestamp FROM turns
            WHERE session_id = ?1
            ORDER BY seq ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut turns = Vec::with_capacity(rows.len());
        for (role, content, attachments, timestamp) in rows {
            turns.push(ConversationTurn {
                role: role.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                content: serde_json::from_str(&content)?,
                attachments: serde_json::from_str(&attachments)?,
                timestamp: parse_ts(&timestamp),
            });
        }

        Ok(Some(Session {
            session_id: session_id.to_string(),
            owner_id,
            turns,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        }))
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

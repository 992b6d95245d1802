//! Auto-match run history

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{AutoMatchSummary, MatchRun};

impl Database {
    /// Open a run record before the sweep starts
    pub fn create_match_run(&self, owner: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO match_runs (owner, status) VALUES (?, 'running')",
            params![owner],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Close a run record with its final counters
    pub fn finish_match_run(
        &self,
        id: i64,
        status: &str,
        summary: &AutoMatchSummary,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE match_runs
            SET status = ?, processed = ?, proposed = ?, transaction_matches = ?,
                group_matches = ?, ambiguous = ?, failed = ?, duration_ms = ?,
                finished_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                status,
                summary.processed,
                summary.proposed,
                summary.transaction_matches,
                summary.group_matches,
                summary.ambiguous,
                summary.failed,
                summary.duration_ms,
                id,
            ],
        )?;
        Ok(())
    }

    /// Get run by ID
    pub fn get_match_run(&self, id: i64) -> Result<Option<MatchRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, status, processed, proposed, transaction_matches, group_matches,
                    ambiguous, failed, duration_ms, started_at, finished_at
             FROM match_runs WHERE id = ?",
        )?;

        let run = stmt
            .query_row(params![id], |row| Self::row_to_run(row))
            .optional()?;

        Ok(run)
    }

    /// Recent runs for an owner, newest first
    pub fn list_match_runs(&self, owner: &str, limit: i64) -> Result<Vec<MatchRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, status, processed, proposed, transaction_matches, group_matches,
                    ambiguous, failed, duration_ms, started_at, finished_at
             FROM match_runs
             WHERE owner = ?
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
        )?;

        let runs = stmt
            .query_map(params![owner, limit], |row| Self::row_to_run(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<MatchRun> {
        let started_at_str: String = row.get(10)?;
        let finished_at_str: Option<String> = row.get(11)?;

        Ok(MatchRun {
            id: row.get(0)?,
            owner: row.get(1)?,
            status: row.get(2)?,
            summary: AutoMatchSummary {
                processed: row.get(3)?,
                proposed: row.get(4)?,
                transaction_matches: row.get(5)?,
                group_matches: row.get(6)?,
                ambiguous: row.get(7)?,
                failed: row.get(8)?,
                duration_ms: row.get(9)?,
            },
            started_at: parse_datetime(&started_at_str),
            finished_at: finished_at_str.map(|s| parse_datetime(&s)),
        })
    }
}

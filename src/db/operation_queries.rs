use super::models::{OperationRecord, OperationStatus};
use super::Database;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

const SELECT_OPERATION: &str = "SELECT id, command, diskgroup, status, steps, current_step, error_code, \
                                log, progress_json, result_json, created_at, updated_at FROM operations";

fn parse_json(text: Option<String>) -> Option<Value> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}

fn map_operation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OperationRecord> {
    let status_str: String = row.get(3)?;
    let status = OperationStatus::try_from(status_str.as_str())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::from(e)))?;
    let steps: String = row.get(4)?;
    Ok(OperationRecord {
        id: row.get(0)?,
        command: row.get(1)?,
        diskgroup: row.get(2)?,
        status,
        steps: serde_json::from_str(&steps).unwrap_or_default(),
        current_step: row.get(5)?,
        error_code: row.get::<_, i64>(6)? as u32,
        log: row.get(7)?,
        progress: parse_json(row.get(8)?),
        result: parse_json(row.get(9)?),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl Database {
    /// Record a new running operation.
    pub fn create_operation(&self, command: &str, diskgroup: Option<&str>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO operations (command, diskgroup) VALUES (?1, ?2)",
            params![command, diskgroup],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record the step the operation just entered, along with its full step list.
    pub fn update_operation_step(&self, id: i64, steps: &[&str], current: &str) -> Result<()> {
        let steps = serde_json::to_string(steps)?;
        let conn = self.conn();
        conn.execute(
            "UPDATE operations SET steps = ?1, current_step = ?2, updated_at = datetime('now') WHERE id = ?3",
            params![steps, current, id],
        )?;
        Ok(())
    }

    pub fn update_operation_progress(&self, id: i64, progress: &Value) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE operations SET progress_json = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![progress.to_string(), id],
        )?;
        Ok(())
    }

    /// Store the final outcome of an operation.
    pub fn finish_operation(
        &self,
        id: i64,
        status: OperationStatus,
        error_code: u32,
        log: &str,
        result: Option<&Value>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE operations \
             SET status = ?1, error_code = ?2, log = ?3, result_json = ?4, updated_at = datetime('now') \
             WHERE id = ?5",
            params![status.as_str(), i64::from(error_code), log, result.map(Value::to_string), id],
        )?;
        Ok(())
    }

    pub fn get_operation(&self, id: i64) -> Result<Option<OperationRecord>> {
        let conn = self.conn();
        let op = conn
            .query_row(&format!("{SELECT_OPERATION} WHERE id = ?1"), params![id], map_operation_row)
            .optional()?;
        Ok(op)
    }

    /// Most recent operations first.
    pub fn list_operations(&self, limit: u32) -> Result<Vec<OperationRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{SELECT_OPERATION} ORDER BY id DESC LIMIT ?1"))?;
        let ops = stmt.query_map(params![limit], map_operation_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(ops)
    }
}

use super::Database;
use crate::diskgroup::{DiskgroupRecord, Redundancy, Tier};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

const SELECT_DISKGROUP: &str = "SELECT id, name, type, size_gb, slice_size_gb, sparse_virtual_size_gb, \
                                quorum, ocr_vote, redundancy, sparse FROM diskgroups";

fn map_diskgroup_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiskgroupRecord> {
    let type_str: String = row.get(2)?;
    let tier = Tier::try_from(type_str.as_str())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::from(e)))?;
    let redundancy: String = row.get(8)?;
    Ok(DiskgroupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        tier,
        size_gb: row.get::<_, i64>(3)? as u64,
        slice_size_gb: row.get::<_, i64>(4)? as u64,
        sparse_virtual_size_gb: row.get::<_, i64>(5)? as u64,
        quorum: row.get(6)?,
        ocr_vote: row.get(7)?,
        redundancy: Redundancy::parse(&redundancy),
        sparse: row.get(9)?,
    })
}

impl Database {
    /// Every configured diskgroup, DATA first.
    pub fn list_diskgroups(&self) -> Result<Vec<DiskgroupRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_DISKGROUP} ORDER BY CASE type WHEN 'data' THEN 0 WHEN 'reco' THEN 1 ELSE 2 END, name"
        ))?;
        let rows = stmt.query_map([], map_diskgroup_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// First diskgroup configured for a tier.
    #[cfg(test)]
    pub fn diskgroup_by_tier(&self, tier: Tier) -> Result<Option<DiskgroupRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("{SELECT_DISKGROUP} WHERE type = ?1 ORDER BY name LIMIT 1"),
                params![tier.as_str()],
                map_diskgroup_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn diskgroup_by_name(&self, name: &str) -> Result<Option<DiskgroupRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(&format!("{SELECT_DISKGROUP} WHERE name = ?1"), params![name], map_diskgroup_row)
            .optional()?;
        Ok(record)
    }

    /// Insert or replace a diskgroup record, keyed by id.
    pub fn upsert_diskgroup(&self, record: &DiskgroupRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO diskgroups \
             (id, name, type, size_gb, slice_size_gb, sparse_virtual_size_gb, quorum, ocr_vote, redundancy, sparse)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                type = excluded.type,
                size_gb = excluded.size_gb,
                slice_size_gb = excluded.slice_size_gb,
                sparse_virtual_size_gb = excluded.sparse_virtual_size_gb,
                quorum = excluded.quorum,
                ocr_vote = excluded.ocr_vote,
                redundancy = excluded.redundancy,
                sparse = excluded.sparse,
                updated_at = datetime('now')",
            params![
                record.id,
                record.name,
                record.tier.as_str(),
                record.size_gb as i64,
                record.slice_size_gb as i64,
                record.sparse_virtual_size_gb as i64,
                record.quorum,
                record.ocr_vote,
                record.redundancy.as_str(),
                record.sparse,
            ],
        )?;
        Ok(())
    }

    /// Remove a diskgroup record by name. Returns whether a row was removed.
    pub fn remove_diskgroup(&self, name: &str) -> Result<bool> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM diskgroups WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }
}

use anyhow::Result;
use rusqlite::Connection;

/// What was sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Workflow,
    Import,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &str {
        match self {
            SubmissionKind::Workflow => "workflow",
            SubmissionKind::Import => "import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "workflow" => Some(SubmissionKind::Workflow),
            "import" => Some(SubmissionKind::Import),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(SubmissionStatus::Submitted),
            "failed" => Some(SubmissionStatus::Failed),
            _ => None,
        }
    }
}

/// One workflow run or import request, as recorded locally.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub kind: SubmissionKind,
    pub name: String,
    pub target: String,
    pub status: SubmissionStatus,
    pub message: String,
    pub created_at: String,
}

/// Initialize the submissions table.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('workflow', 'import')),
            name TEXT NOT NULL,
            target TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK(status IN ('submitted', 'failed')),
            message TEXT NOT NULL DEFAULT '',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// Record a submission. Returns the new row id.
pub fn record_submission(
    conn: &Connection,
    kind: SubmissionKind,
    name: &str,
    target: &str,
    status: SubmissionStatus,
    message: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO submissions (kind, name, target, status, message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![kind.as_str(), name, target, status.as_str(), message],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All submissions, newest first.
pub fn list_submissions(conn: &Connection) -> Result<Vec<Submission>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, name, target, status, message, created_at
         FROM submissions
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let kind: String = row.get(1)?;
            let status: String = row.get(4)?;
            Ok(Submission {
                id: row.get(0)?,
                kind: SubmissionKind::from_str(&kind).unwrap_or(SubmissionKind::Workflow),
                name: row.get(2)?,
                target: row.get(3)?,
                status: SubmissionStatus::from_str(&status).unwrap_or(SubmissionStatus::Failed),
                message: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_submission(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM submissions WHERE id = ?1", [id])?;
    Ok(())
}

/// Remove every recorded submission. Returns how many rows were deleted.
pub fn clear_submissions(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM submissions", [])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;

    #[test]
    fn test_init_db_idempotent() {
        let conn = open_memory_db().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_record_and_list() {
        let conn = open_memory_db().unwrap();
        init_db(&conn).unwrap();

        record_submission(
            &conn,
            SubmissionKind::Workflow,
            "cellpose",
            "3 images",
            SubmissionStatus::Submitted,
            "Workflow started",
        )
        .unwrap();
        let id = record_submission(
            &conn,
            SubmissionKind::Import,
            "2 files",
            "dataset-5",
            SubmissionStatus::Failed,
            "No destinations selected",
        )
        .unwrap();

        let rows = list_submissions(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        // Same timestamp resolution, so newest id comes first
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].kind, SubmissionKind::Import);
        assert_eq!(rows[0].status, SubmissionStatus::Failed);
        assert_eq!(rows[1].name, "cellpose");

        delete_submission(&conn, id).unwrap();
        assert_eq!(list_submissions(&conn).unwrap().len(), 1);
        assert_eq!(clear_submissions(&conn).unwrap(), 1);
        assert!(list_submissions(&conn).unwrap().is_empty());
    }
}

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Params, Row};

use super::tags::get_or_create_tag;
use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
    models::{LogEntry, NewLogEntry, TagRef},
};

const LOG_COLUMNS: &str = "l.id AS id, l.message AS message, l.start_date AS start_date, \
     l.end_date AS end_date, l.created_at AS created_at, l.deleted_at AS deleted_at";

fn row_to_log(row: &Row) -> Result<LogEntry> {
    let start_date: String = row.get("start_date")?;
    let end_date: String = row.get("end_date")?;
    let created_at: String = row.get("created_at")?;
    let deleted_at: Option<String> = row.get("deleted_at")?;

    Ok(LogEntry {
        id: row.get("id")?,
        message: row.get("message")?,
        tags: Vec::new(),
        start_date: parse_datetime(&start_date, "start_date")?,
        end_date: parse_datetime(&end_date, "end_date")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        deleted_at: parse_optional_datetime(deleted_at, "deleted_at")?,
    })
}

fn load_tags(conn: &Connection, log_id: i64) -> Result<Vec<TagRef>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name
         FROM log_tags lt
         JOIN tags t ON t.id = lt.tag_id
         WHERE lt.log_id = ?1 AND t.deleted_at IS NULL
         ORDER BY lt.position ASC",
    )?;
    let mut rows = stmt.query(params![log_id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(TagRef {
            id: row.get(0)?,
            name: row.get(1)?,
        });
    }
    Ok(tags)
}

fn query_logs<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut logs = Vec::new();
    while let Some(row) = rows.next()? {
        logs.push(row_to_log(row)?);
    }
    for log in &mut logs {
        log.tags = load_tags(conn, log.id)?;
    }
    Ok(logs)
}

fn fetch_log(conn: &Connection, log_id: i64) -> Result<Option<LogEntry>> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM logs l WHERE l.id = ?1");
    Ok(query_logs(conn, &sql, params![log_id])?.into_iter().next())
}

impl Database {
    /// Persist a log and link its tags, creating unknown tags on the way.
    pub async fn save_log(&self, entry: NewLogEntry) -> Result<LogEntry> {
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction().context("failed to open log transaction")?;

            tx.execute(
                "INSERT INTO logs (message, start_date, end_date, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.message,
                    entry.start_date.to_rfc3339(),
                    entry.end_date.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .context("failed to insert log")?;
            let log_id = tx.last_insert_rowid();

            for (position, name) in entry.tags.iter().enumerate() {
                let tag_id = get_or_create_tag(&tx, name, now)
                    .with_context(|| format!("failed to resolve tag '{name}'"))?;
                tx.execute(
                    "INSERT OR IGNORE INTO log_tags (log_id, tag_id, position)
                     VALUES (?1, ?2, ?3)",
                    params![log_id, tag_id, position as i64],
                )?;
            }

            tx.commit().context("failed to commit log")?;

            fetch_log(conn, log_id)?.ok_or_else(|| anyhow!("Log not found after insert"))
        })
        .await
    }

    pub async fn get_log(&self, log_id: i64) -> Result<Option<LogEntry>> {
        self.execute(move |conn| fetch_log(conn, log_id)).await
    }

    /// Non-deleted logs, newest first
    pub async fn get_logs(&self) -> Result<Vec<LogEntry>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM logs l
                 WHERE l.deleted_at IS NULL
                 ORDER BY l.start_date DESC, l.id DESC"
            );
            query_logs(conn, &sql, params![])
        })
        .await
    }

    /// Case-insensitive substring search over log messages
    pub async fn search_logs(&self, text: &str) -> Result<Vec<LogEntry>> {
        let text = text.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM logs l
                 WHERE l.deleted_at IS NULL AND instr(lower(l.message), lower(?1)) > 0
                 ORDER BY l.start_date DESC, l.id DESC"
            );
            query_logs(conn, &sql, params![text])
        })
        .await
    }

    pub async fn get_logs_by_tag(&self, tag_name: &str) -> Result<Vec<LogEntry>> {
        let tag_name = tag_name.trim_start_matches('#').to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM logs l
                 JOIN log_tags lt ON lt.log_id = l.id
                 JOIN tags t ON t.id = lt.tag_id
                 WHERE l.deleted_at IS NULL AND t.deleted_at IS NULL AND t.name = ?1
                 ORDER BY l.start_date DESC, l.id DESC"
            );
            query_logs(conn, &sql, params![tag_name])
        })
        .await
    }

    pub async fn soft_delete_log(&self, log_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE logs SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![Utc::now().to_rfc3339(), log_id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Log not found or already deleted"));
            }
            Ok(())
        })
        .await
    }
}

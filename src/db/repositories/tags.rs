use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
    models::{Tag, TagUpdate, DEFAULT_CATEGORY_ID},
};

const TAG_COLUMNS: &str =
    "id, name, description, category_id, created_at, updated_at, deleted_at";

fn row_to_tag(row: &Row) -> Result<Tag> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let deleted_at: Option<String> = row.get("deleted_at")?;

    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        category_id: row.get("category_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        deleted_at: parse_optional_datetime(deleted_at, "deleted_at")?,
    })
}

fn fetch_tag(conn: &Connection, tag_id: i64) -> Result<Option<Tag>> {
    let mut stmt = conn.prepare(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"))?;
    let mut rows = stmt.query(params![tag_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_tag(row)?)),
        None => Ok(None),
    }
}

/// Looks a tag up by name, creating it (or reviving a soft-deleted one).
pub(super) fn get_or_create_tag(conn: &Connection, name: &str, now: DateTime<Utc>) -> Result<i64> {
    let existing: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT id, deleted_at FROM tags WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((tag_id, None)) => Ok(tag_id),
        Some((tag_id, Some(_))) => {
            conn.execute(
                "UPDATE tags SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), tag_id],
            )?;
            Ok(tag_id)
        }
        None => {
            conn.execute(
                "INSERT INTO tags (name, category_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    name,
                    DEFAULT_CATEGORY_ID,
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

impl Database {
    /// All non-deleted tags, ordered by name
    pub async fn get_tags(&self) -> Result<Vec<Tag>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TAG_COLUMNS} FROM tags WHERE deleted_at IS NULL ORDER BY name ASC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut tags = Vec::new();
            while let Some(row) = rows.next()? {
                tags.push(row_to_tag(row)?);
            }
            Ok(tags)
        })
        .await
    }

    pub async fn get_tags_by_category(&self, category_id: i64) -> Result<Vec<Tag>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TAG_COLUMNS} FROM tags
                 WHERE category_id = ?1 AND deleted_at IS NULL
                 ORDER BY name ASC"
            ))?;
            let mut rows = stmt.query(params![category_id])?;
            let mut tags = Vec::new();
            while let Some(row) = rows.next()? {
                tags.push(row_to_tag(row)?);
            }
            Ok(tags)
        })
        .await
    }

    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TAG_COLUMNS} FROM tags WHERE name = ?1 AND deleted_at IS NULL"
            ))?;
            let mut rows = stmt.query(params![name])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_tag(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Update a tag's name, description and/or category
    pub async fn update_tag(&self, tag_id: i64, update: TagUpdate) -> Result<Tag> {
        self.execute(move |conn| {
            let now = Utc::now();

            let mut updates = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(name) = update.name {
                updates.push("name = ?");
                params_vec.push(Box::new(name));
            }
            if let Some(description) = update.description {
                updates.push("description = ?");
                params_vec.push(Box::new(description));
            }
            if let Some(category_id) = update.category_id {
                updates.push("category_id = ?");
                params_vec.push(Box::new(category_id));
            }

            if updates.is_empty() {
                return Err(anyhow!("No fields to update"));
            }

            updates.push("updated_at = ?");
            params_vec.push(Box::new(now.to_rfc3339()));
            params_vec.push(Box::new(tag_id));

            let query = format!(
                "UPDATE tags SET {} WHERE id = ? AND deleted_at IS NULL",
                updates.join(", ")
            );
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            if conn.execute(&query, params_refs.as_slice())? == 0 {
                return Err(anyhow!("Tag not found or already deleted"));
            }

            fetch_tag(conn, tag_id)?.ok_or_else(|| anyhow!("Tag not found after update"))
        })
        .await
    }

    /// Soft delete a tag. Logs keep their reference but stop listing it.
    pub async fn soft_delete_tag(&self, tag_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let now = Utc::now();
            let rows_affected = conn.execute(
                "UPDATE tags
                 SET deleted_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), now.to_rfc3339(), tag_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Tag not found or already deleted"));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::db::{
        models::{CategoryInput, NewLogEntry, TagUpdate},
        Database,
    };

    fn open(dir: &TempDir) -> Database {
        Database::new(dir.path().join("tags.sqlite3")).unwrap()
    }

    async fn log_with_tags(db: &Database, tags: &[&str]) {
        let now = Utc::now();
        db.save_log(NewLogEntry {
            message: "tagged".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            start_date: now,
            end_date: now,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn tags_are_created_lazily_once() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        assert!(db.get_tags().await.unwrap().is_empty());

        log_with_tags(&db, &["rust", "focus"]).await;
        log_with_tags(&db, &["focus"]).await;

        let names: Vec<String> = db
            .get_tags()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["focus", "rust"]);
    }

    #[tokio::test]
    async fn update_moves_tag_between_categories() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        log_with_tags(&db, &["reading"]).await;
        let category = db
            .create_category(CategoryInput {
                name: "Study".into(),
                description: String::new(),
                color: "#336699".into(),
            })
            .await
            .unwrap();
        let tag = db.get_tag_by_name("reading").await.unwrap().unwrap();
        assert_eq!(tag.category_id, 1);

        let updated = db
            .update_tag(
                tag.id,
                TagUpdate {
                    description: Some("books".into()),
                    category_id: Some(category.id),
                    ..TagUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.description, "books");
        assert_eq!(db.get_tags_by_category(category.id).await.unwrap().len(), 1);
        assert!(db.update_tag(tag.id, TagUpdate::default()).await.is_err());
    }

    #[tokio::test]
    async fn soft_deleted_tag_revives_on_reuse() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        log_with_tags(&db, &["music"]).await;
        let tag = db.get_tag_by_name("music").await.unwrap().unwrap();

        db.soft_delete_tag(tag.id).await.unwrap();
        assert!(db.get_tag_by_name("music").await.unwrap().is_none());
        assert!(db.soft_delete_tag(tag.id).await.is_err());

        log_with_tags(&db, &["music"]).await;
        let revived = db.get_tag_by_name("music").await.unwrap().unwrap();
        assert_eq!(revived.id, tag.id);
    }
}

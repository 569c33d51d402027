use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
    models::{
        category::validation::{validate_color, validate_name},
        Category, CategoryInput, CategoryUpdate, DEFAULT_CATEGORY_ID,
    },
};

const CATEGORY_COLUMNS: &str =
    "id, name, description, color, created_at, updated_at, deleted_at";

fn row_to_category(row: &Row) -> Result<Category> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let deleted_at: Option<String> = row.get("deleted_at")?;

    Ok(Category {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        color: row.get("color")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        deleted_at: parse_optional_datetime(deleted_at, "deleted_at")?,
    })
}

fn fetch_category(conn: &Connection, category_id: i64) -> Result<Option<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![category_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_category(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Create a new category
    /// Returns an error if the name is blank, the color malformed, or the name taken
    pub async fn create_category(&self, input: CategoryInput) -> Result<Category> {
        validate_name(&input.name)?;
        validate_color(&input.color)?;

        self.execute(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO categories (name, description, color, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    input.name.trim(),
                    input.description,
                    input.color,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;

            let category_id = conn.last_insert_rowid();
            fetch_category(conn, category_id)?
                .ok_or_else(|| anyhow!("Category not found after insert"))
        })
        .await
    }

    /// Get all non-deleted categories, default first
    pub async fn get_categories(&self) -> Result<Vec<Category>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories
                 WHERE deleted_at IS NULL
                 ORDER BY id ASC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut categories = Vec::new();
            while let Some(row) = rows.next()? {
                categories.push(row_to_category(row)?);
            }

            Ok(categories)
        })
        .await
    }

    /// Update a category's name, description and/or color
    pub async fn update_category(
        &self,
        category_id: i64,
        update: CategoryUpdate,
    ) -> Result<Category> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(color) = &update.color {
            validate_color(color)?;
        }

        self.execute(move |conn| {
            let now = Utc::now();

            // Build update query dynamically based on what's being updated
            let mut updates = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(name) = update.name {
                updates.push("name = ?");
                params_vec.push(Box::new(name.trim().to_string()));
            }
            if let Some(description) = update.description {
                updates.push("description = ?");
                params_vec.push(Box::new(description));
            }
            if let Some(color) = update.color {
                updates.push("color = ?");
                params_vec.push(Box::new(color));
            }

            if updates.is_empty() {
                return Err(anyhow!("No fields to update"));
            }

            updates.push("updated_at = ?");
            params_vec.push(Box::new(now.to_rfc3339()));
            params_vec.push(Box::new(category_id));

            let query = format!(
                "UPDATE categories SET {} WHERE id = ? AND deleted_at IS NULL",
                updates.join(", ")
            );
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            if conn.execute(&query, params_refs.as_slice())? == 0 {
                return Err(anyhow!("Category not found or already deleted"));
            }

            fetch_category(conn, category_id)?
                .ok_or_else(|| anyhow!("Category not found after update"))
        })
        .await
    }

    /// Soft delete a category and hand its tags to the default category
    pub async fn soft_delete_category(&self, category_id: i64) -> Result<()> {
        if category_id == DEFAULT_CATEGORY_ID {
            bail!("The default category cannot be deleted");
        }

        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;

            let rows_affected = tx.execute(
                "UPDATE categories
                 SET deleted_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), now.to_rfc3339(), category_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Category not found or already deleted"));
            }

            tx.execute(
                "UPDATE tags
                 SET category_id = ?1, updated_at = ?2
                 WHERE category_id = ?3",
                params![DEFAULT_CATEGORY_ID, now.to_rfc3339(), category_id],
            )?;

            tx.commit()?;
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
        models::{CategoryInput, CategoryUpdate, NewLogEntry, TagUpdate, DEFAULT_CATEGORY_ID},
        Database,
    };

    fn open(dir: &TempDir) -> Database {
        Database::new(dir.path().join("categories.sqlite3")).unwrap()
    }

    fn input(name: &str, color: &str) -> CategoryInput {
        CategoryInput {
            name: name.into(),
            description: String::new(),
            color: color.into(),
        }
    }

    #[tokio::test]
    async fn default_category_exists() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let categories = db.get_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].id, DEFAULT_CATEGORY_ID);
        assert!(db.soft_delete_category(DEFAULT_CATEGORY_ID).await.is_err());
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        assert!(db.create_category(input("Work", "red")).await.is_err());
        assert!(db.create_category(input(" ", "#FF0000")).await.is_err());

        let work = db.create_category(input("Work", "#FF0000")).await.unwrap();
        assert_eq!(work.name, "Work");
        assert!(db.create_category(input("Work", "#00FF00")).await.is_err());

        let renamed = db
            .update_category(
                work.id,
                CategoryUpdate {
                    color: Some("#00FF00".into()),
                    ..CategoryUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.color, "#00FF00");
    }

    #[tokio::test]
    async fn deleting_category_moves_tags_to_default() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let hobby = db.create_category(input("Hobby", "#123456")).await.unwrap();

        let now = Utc::now();
        db.save_log(NewLogEntry {
            message: "#guitar".into(),
            tags: vec!["guitar".into()],
            start_date: now,
            end_date: now,
        })
        .await
        .unwrap();
        let guitar = db.get_tag_by_name("guitar").await.unwrap().unwrap();
        db.update_tag(
            guitar.id,
            TagUpdate {
                category_id: Some(hobby.id),
                ..TagUpdate::default()
            },
        )
        .await
        .unwrap();

        db.soft_delete_category(hobby.id).await.unwrap();

        let guitar = db.get_tag_by_name("guitar").await.unwrap().unwrap();
        assert_eq!(guitar.category_id, DEFAULT_CATEGORY_ID);
        assert_eq!(db.get_categories().await.unwrap().len(), 1);
        // The name is free again once the old row is soft-deleted.
        assert!(db.create_category(input("Hobby", "#123456")).await.is_ok());
    }
}

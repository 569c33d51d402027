//! Category data models.
//!
//! Categories group tags. Category 1 ("Uncategorized") always exists and
//! receives the tags of any category that is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY_ID: i64 = 1;
pub const DEFAULT_CATEGORY_COLOR: &str = "#FFFFFF";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input data for creating a category
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_CATEGORY_COLOR.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

pub mod validation {
    use anyhow::{bail, Result};

    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("Category name must not be empty");
        }
        Ok(())
    }

    pub fn validate_color(color: &str) -> Result<()> {
        let Some(hex_part) = color.strip_prefix('#') else {
            bail!("Invalid color format. Must be hex (#RRGGBB)");
        };

        if hex_part.len() != 6 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("Invalid color format. Must be hex (#RRGGBB)");
        }

        Ok(())
    }

}

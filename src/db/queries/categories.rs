use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row used for CSV import/export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

pub async fn get_all_categories(pool: &SqlitePool) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
SELECT id, name, description, created_at, updated_at
FROM categories
ORDER BY name, id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> sqlx::Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
SELECT id, name, description, created_at, updated_at
FROM categories
WHERE categories.id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn category_exists(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Whether another category already uses `name`, ignoring the row `except`.
pub async fn name_taken(pool: &SqlitePool, name: &str, except: Option<i64>) -> sqlx::Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM categories WHERE name = ?1 AND (?2 IS NULL OR id != ?2)")
            .bind(name)
            .bind(except)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn create_category(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
) -> sqlx::Result<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
INSERT INTO categories (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Updates the fields that are present. `description` is left alone when
/// `None` and cleared when `Some(None)`. Returns the number of rows touched.
pub async fn update_category(
    pool: &SqlitePool,
    id: i64,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> sqlx::Result<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE categories
        SET name = COALESCE(?1, name),
            description = CASE WHEN ?2 THEN ?3 ELSE description END,
            updated_at = ?4
        WHERE categories.id = ?5
        "#,
    )
    .bind(name)
    .bind(description.is_some())
    .bind(description.flatten())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated)
}

/// Deletes the category and, through the foreign key cascade, its questions.
///
/// Returns how many questions went with it, or `RowNotFound` when there was no
/// such category.
pub async fn delete_category(pool: &SqlitePool, id: i64) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let (dependents,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM questions WHERE category_id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

    let deleted = sqlx::query("DELETE FROM categories WHERE categories.id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    tx.commit().await?;
    Ok(dependents)
}

pub async fn get_category_records(pool: &SqlitePool) -> sqlx::Result<Vec<CategoryRecord>> {
    sqlx::query_as::<_, CategoryRecord>("SELECT id, name, description FROM categories ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Inserts or overwrites categories by id, keeping creation time of existing rows.
pub async fn import_categories(pool: &SqlitePool, categories: Vec<CategoryRecord>) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for category in categories {
        sqlx::query(
            r#"
INSERT INTO categories (id, name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)
ON CONFLICT (id) DO UPDATE SET name = excluded.name, description = excluded.description, updated_at = excluded.updated_at
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(category.description.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

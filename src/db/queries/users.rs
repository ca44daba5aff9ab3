use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    SuperAdmin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::SuperAdmin => f.write_str("superadmin"),
        }
    }
}

/// Account as exposed over the API; the password hash is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, role, created_at, updated_at FROM users WHERE users.id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn find_user(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, role, created_at, updated_at FROM users WHERE users.id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_users(pool: &SqlitePool) -> sqlx::Result<Vec<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, role, created_at, updated_at FROM users ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn count_users(pool: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn find_credentials_by_email(
    pool: &SqlitePool,
    email: &str,
) -> sqlx::Result<Option<UserCredentials>> {
    sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, username, email, role, created_at, updated_at, password_hash FROM users WHERE users.email = ?1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn email_taken(pool: &SqlitePool, email: &str, except: Option<i64>) -> sqlx::Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = ?1 AND (?2 IS NULL OR id != ?2)")
            .bind(email)
            .bind(except)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn username_taken(
    pool: &SqlitePool,
    username: &str,
    except: Option<i64>,
) -> sqlx::Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ?1 AND (?2 IS NULL OR id != ?2)")
            .bind(username)
            .bind(except)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> sqlx::Result<i64> {
    let now = Utc::now();
    let user_id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(user_id)
}

/// Rewrites profile fields; the password hash only changes when one is given.
pub async fn update_user(
    pool: &SqlitePool,
    id: i64,
    username: &str,
    email: &str,
    password_hash: Option<&str>,
) -> sqlx::Result<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE users
        SET username = ?1, email = ?2, password_hash = COALESCE(?3, password_hash), updated_at = ?4
        WHERE users.id = ?5
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated)
}

pub async fn update_role<'e, E>(executor: E, id: i64, role: Role) -> sqlx::Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let updated = sqlx::query("UPDATE users SET role = ?1, updated_at = ?2 WHERE users.id = ?3")
        .bind(role)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?
        .rows_affected();
    Ok(updated)
}

pub async fn delete_user<'e, E>(executor: E, user_id: i64) -> sqlx::Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let deleted = sqlx::query(
        r#"
        DELETE FROM users WHERE users.id = ?1
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await?
    .rows_affected();
    Ok(deleted)
}

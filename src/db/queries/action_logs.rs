use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    UpdateUserRole,
    DeleteUser,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::UpdateUserRole => "UPDATE_USER_ROLE",
            ActionType::DeleteUser => "DELETE_USER",
        }
    }
}

/// Audit record of a user-management action.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActionLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action_type: ActionType,
    pub description: String,
    pub entity_id: Option<i64>,
    pub entity_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn record_action<'e, E>(
    executor: E,
    user_id: i64,
    action_type: ActionType,
    description: &str,
    entity_id: i64,
    entity_type: &str,
) -> sqlx::Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let now = Utc::now();
    let id = sqlx::query(
        r#"
INSERT INTO action_logs (user_id, action_type, description, entity_id, entity_type, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(user_id)
    .bind(action_type)
    .bind(description)
    .bind(entity_id)
    .bind(entity_type)
    .bind(now)
    .execute(executor)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn get_action_logs(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<ActionLog>> {
    sqlx::query_as::<_, ActionLog>(
        r#"
SELECT id, user_id, action_type, description, entity_id, entity_type, created_at, updated_at
FROM action_logs
ORDER BY created_at DESC, id DESC
LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

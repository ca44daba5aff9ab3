use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A question with its category expanded, the shape every endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_ref: Option<CategoryRef>,
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    question: String,
    answer: String,
    category_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_name: Option<String>,
    category_description: Option<String>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        let category_ref = match (row.category_id, row.category_name) {
            (Some(id), Some(name)) => Some(CategoryRef {
                id,
                name,
                description: row.category_description,
            }),
            _ => None,
        };
        Question {
            id: row.id,
            question: row.question,
            answer: row.answer,
            category_id: row.category_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            category_ref,
        }
    }
}

/// Flat row used for CSV import/export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuestionRecord {
    pub id: i64,
    pub category_id: Option<i64>,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category_id: Option<i64>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DateStat {
    pub date: String,
    pub count: i64,
}

/// Columns a question listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Id,
    Question,
    Answer,
    CategoryId,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    fn column(self) -> &'static str {
        match self {
            SortKey::Id => "q.id",
            // folded copy gives case-insensitive ordering
            SortKey::Question => "q.question_folded",
            SortKey::Answer => "q.answer",
            SortKey::CategoryId => "q.category_id",
            SortKey::CreatedAt => "q.created_at",
            SortKey::UpdatedAt => "q.updated_at",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Question => "question",
            SortKey::Answer => "answer",
            SortKey::CategoryId => "categoryId",
            SortKey::CreatedAt => "createdAt",
            SortKey::UpdatedAt => "updatedAt",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "id" => Ok(SortKey::Id),
            "question" => Ok(SortKey::Question),
            "answer" => Ok(SortKey::Answer),
            "categoryId" | "category_id" => Ok(SortKey::CategoryId),
            "createdAt" | "created_at" => Ok(SortKey::CreatedAt),
            "updatedAt" | "updated_at" => Ok(SortKey::UpdatedAt),
            other => Err(format!("Cannot sort questions by '{other}'")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(format!("Unknown sort order '{value}', expected ASC or DESC"))
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub search: Option<String>,
    pub category_id: Option<i64>,
}

const SELECT_QUESTIONS: &str = r#"
SELECT q.id, q.question, q.answer, q.category_id, q.created_at, q.updated_at,
       c.name AS category_name, c.description AS category_description
FROM questions q
LEFT JOIN categories c ON c.id = q.category_id
"#;

/// Case folding applied to stored text and to search terms alike.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for ch in fold_case(search).chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &QuestionFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (q.question_folded LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR q.answer_folded LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND q.category_id = ").push_bind(category_id);
    }
}

pub async fn count_questions(pool: &SqlitePool, filter: &QuestionFilter) -> sqlx::Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM questions q");
    push_filter(&mut builder, filter);
    let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

pub async fn find_questions(
    pool: &SqlitePool,
    filter: &QuestionFilter,
    sort: SortKey,
    order: SortOrder,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<Question>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_QUESTIONS);
    push_filter(&mut builder, filter);
    let direction = order.as_str();
    builder
        .push(format!(
            " ORDER BY {column} {direction}, q.id {direction}",
            column = sort.column()
        ))
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Question::from).collect())
}

pub async fn category_stats(pool: &SqlitePool) -> sqlx::Result<Vec<CategoryStat>> {
    sqlx::query_as::<_, CategoryStat>(
        r#"
SELECT category_id, COUNT(*) AS count
FROM questions
GROUP BY category_id
ORDER BY category_id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn date_stats(pool: &SqlitePool) -> sqlx::Result<Vec<DateStat>> {
    // timestamps are stored as RFC 3339 text in UTC, so the first ten characters are the date
    sqlx::query_as::<_, DateStat>(
        r#"
SELECT substr(created_at, 1, 10) AS date, COUNT(*) AS count
FROM questions
GROUP BY date
ORDER BY date ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_question_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Question> {
    let sql = format!("{SELECT_QUESTIONS} WHERE q.id = ?1");
    let row: QuestionRow = sqlx::query_as(&sql).bind(id).fetch_one(pool).await?;
    Ok(row.into())
}

/// Whether another question already has exactly this text, ignoring the row `except`.
pub async fn question_taken(
    pool: &SqlitePool,
    question: &str,
    except: Option<i64>,
) -> sqlx::Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM questions WHERE question = ?1 AND (?2 IS NULL OR id != ?2)")
            .bind(question)
            .bind(except)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn create_question(
    pool: &SqlitePool,
    question: &str,
    answer: &str,
    category: Option<i64>,
) -> sqlx::Result<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
INSERT INTO questions (category_id, question, answer, question_folded, answer_folded, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(category)
    .bind(question)
    .bind(answer)
    .bind(fold_case(question))
    .bind(fold_case(answer))
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn update_question(
    pool: &SqlitePool,
    id: i64,
    question: &str,
    answer: &str,
    category: Option<i64>,
) -> sqlx::Result<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE questions
        SET category_id = ?1, question = ?2, answer = ?3, question_folded = ?4, answer_folded = ?5, updated_at = ?6
        WHERE questions.id = ?7
        "#,
    )
    .bind(category)
    .bind(question)
    .bind(answer)
    .bind(fold_case(question))
    .bind(fold_case(answer))
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated)
}

pub async fn delete_question(pool: &SqlitePool, id: i64) -> sqlx::Result<u64> {
    let deleted = sqlx::query("DELETE FROM questions WHERE questions.id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(deleted)
}

pub async fn get_question_records(pool: &SqlitePool) -> sqlx::Result<Vec<QuestionRecord>> {
    sqlx::query_as::<_, QuestionRecord>(
        "SELECT id, category_id, question, answer FROM questions ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Inserts or overwrites questions by id, keeping creation time of existing rows.
pub async fn import_questions(pool: &SqlitePool, questions: Vec<QuestionRecord>) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for question in questions {
        sqlx::query(
            r#"
INSERT INTO questions (id, category_id, question, answer, question_folded, answer_folded, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
ON CONFLICT (id) DO UPDATE SET
    category_id = excluded.category_id,
    question = excluded.question,
    answer = excluded.answer,
    question_folded = excluded.question_folded,
    answer_folded = excluded.answer_folded,
    updated_at = excluded.updated_at
            "#,
        )
        .bind(question.id)
        .bind(question.category_id)
        .bind(&question.question)
        .bind(&question.answer)
        .bind(fold_case(&question.question))
        .bind(fold_case(&question.answer))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_in_memory;
    use crate::db::queries::categories::create_category;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("Грипп"), "%грипп%");
    }

    #[test]
    fn sort_key_accepts_both_spellings() {
        assert_eq!("createdAt".parse::<SortKey>(), Ok(SortKey::CreatedAt));
        assert_eq!("created_at".parse::<SortKey>(), Ok(SortKey::CreatedAt));
        assert!("password".parse::<SortKey>().is_err());
        assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[tokio::test]
    async fn storage_rejects_duplicate_question_text() {
        let pool = establish_in_memory().await.unwrap();
        create_question(&pool, "Is flu contagious?", "Yes", None)
            .await
            .unwrap();

        let err = create_question(&pool, "Is flu contagious?", "Still yes", None)
            .await
            .unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            count_questions(&pool, &QuestionFilter::default()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn search_is_case_insensitive_beyond_ascii() {
        let pool = establish_in_memory().await.unwrap();
        create_question(&pool, "Что такое ГРИПП?", "Вирусная инфекция", None)
            .await
            .unwrap();
        create_question(&pool, "What is a fever?", "A raised temperature", None)
            .await
            .unwrap();

        let filter = QuestionFilter {
            search: Some("грипп".to_owned()),
            category_id: None,
        };
        let found = find_questions(&pool, &filter, SortKey::Id, SortOrder::Asc, 10, 0)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question, "Что такое ГРИПП?");
        assert_eq!(count_questions(&pool, &filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_matches_answer_text() {
        let pool = establish_in_memory().await.unwrap();
        create_question(&pool, "Headache?", "Drink WATER", None)
            .await
            .unwrap();
        let filter = QuestionFilter {
            search: Some("water".to_owned()),
            category_id: None,
        };
        assert_eq!(count_questions(&pool, &filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn question_sort_ignores_case() {
        let pool = establish_in_memory().await.unwrap();
        for text in ["banana?", "Apple?", "cherry?"] {
            create_question(&pool, text, "answer", None).await.unwrap();
        }
        let sorted = find_questions(
            &pool,
            &QuestionFilter::default(),
            SortKey::Question,
            SortOrder::Asc,
            10,
            0,
        )
        .await
        .unwrap();
        let texts: Vec<&str> = sorted.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(texts, ["Apple?", "banana?", "cherry?"]);
    }

    #[tokio::test]
    async fn question_carries_its_category() {
        let pool = establish_in_memory().await.unwrap();
        let category = create_category(&pool, "Cardiology", Some("Heart"))
            .await
            .unwrap();
        let id = create_question(&pool, "Palpitations?", "See a doctor", Some(category))
            .await
            .unwrap();

        let question = get_question_by_id(&pool, id).await.unwrap();
        assert_eq!(
            question.category_ref,
            Some(CategoryRef {
                id: category,
                name: "Cardiology".to_owned(),
                description: Some("Heart".to_owned()),
            })
        );
    }

    #[tokio::test]
    async fn stats_cover_the_whole_table() {
        let pool = establish_in_memory().await.unwrap();
        let category = create_category(&pool, "ENT", None).await.unwrap();
        create_question(&pool, "q1", "a", Some(category)).await.unwrap();
        create_question(&pool, "q2", "a", Some(category)).await.unwrap();
        create_question(&pool, "q3", "a", None).await.unwrap();

        let stats = category_stats(&pool).await.unwrap();
        assert_eq!(
            stats,
            vec![
                CategoryStat {
                    category_id: None,
                    count: 1
                },
                CategoryStat {
                    category_id: Some(category),
                    count: 2
                },
            ]
        );

        let dates = date_stats(&pool).await.unwrap();
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].count, 3);
        assert_eq!(dates[0].date, Utc::now().format("%Y-%m-%d").to_string());
    }
}

//! CSV backup and seeding of categories and questions.

use std::fs::File;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::queries::categories::{get_category_records, import_categories, CategoryRecord};
use crate::db::queries::questions::{get_question_records, import_questions, QuestionRecord};

pub const CATEGORIES_FILE: &str = "categories.csv";
pub const QUESTIONS_FILE: &str = "questions.csv";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub struct TransferSummary {
    pub categories: usize,
    pub questions: usize,
}

fn write_to(path: &Path, data: &[impl Serialize]) -> Result<(), TransferError> {
    let file = File::create(path).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut wtr = csv::Writer::from_writer(file);
    for line in data {
        wtr.serialize(line)?;
    }
    wtr.flush().map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

fn read_from<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TransferError> {
    let file = File::open(path).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut out = Vec::new();
    for record in rdr.deserialize() {
        out.push(record?);
    }
    Ok(out)
}

pub async fn export_data(pool: &SqlitePool, dir: &Path) -> Result<TransferSummary, TransferError> {
    let categories = get_category_records(pool).await?;
    let questions = get_question_records(pool).await?;
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| TransferError::Io {
            path: dir.display().to_string(),
            source,
        })?;
    }
    write_to(&dir.join(CATEGORIES_FILE), &categories)?;
    write_to(&dir.join(QUESTIONS_FILE), &questions)?;
    tracing::info!(
        categories = categories.len(),
        questions = questions.len(),
        "Exported to {}",
        dir.display()
    );
    Ok(TransferSummary {
        categories: categories.len(),
        questions: questions.len(),
    })
}

/// Upserts both files by id. Categories go first so question references resolve.
pub async fn import_data(pool: &SqlitePool, dir: &Path) -> Result<TransferSummary, TransferError> {
    let categories: Vec<CategoryRecord> = read_from(&dir.join(CATEGORIES_FILE))?;
    let questions: Vec<QuestionRecord> = read_from(&dir.join(QUESTIONS_FILE))?;
    let summary = TransferSummary {
        categories: categories.len(),
        questions: questions.len(),
    };
    import_categories(pool, categories).await?;
    import_questions(pool, questions).await?;
    tracing::info!(
        categories = summary.categories,
        questions = summary.questions,
        "Imported from {}",
        dir.display()
    );
    Ok(summary)
}

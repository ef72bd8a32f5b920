use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::db::operations::{
    upsert_category, upsert_student, upsert_teacher, CategoryRecord, StudentRecord, TeacherRecord,
};
use crate::db::DatabaseProxy;

/// Directory records owned by other LMS subsystems, loaded for local runs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySeed {
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(default)]
    pub teachers: Vec<TeacherRecord>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub students: usize,
    pub teachers: usize,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub async fn seed_from_file(proxy: &DatabaseProxy, path: &Path) -> Result<SeedSummary, SeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let seed: DirectorySeed = serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let summary = seed_directory(proxy, &seed).await?;
    tracing::info!(
        path = %path.display(),
        categories = summary.categories,
        students = summary.students,
        teachers = summary.teachers,
        "directory seed applied"
    );
    Ok(summary)
}

/// Inserts every record whose id is not present yet. Counts only new rows.
pub async fn seed_directory(
    proxy: &DatabaseProxy,
    seed: &DirectorySeed,
) -> Result<SeedSummary, SeedError> {
    let mut tx = proxy.pool().begin().await?;
    let mut summary = SeedSummary::default();

    for category in &seed.categories {
        if upsert_category(&mut *tx, category).await? {
            summary.categories += 1;
        }
    }
    for student in &seed.students {
        if upsert_student(&mut *tx, student).await? {
            summary.students += 1;
        }
    }
    for teacher in &seed.teachers {
        if upsert_teacher(&mut *tx, teacher).await? {
            summary.teachers += 1;
        }
    }

    tx.commit().await?;
    Ok(summary)
}

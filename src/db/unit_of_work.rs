use std::fmt::Display;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

/// A database transaction handed by `&mut` through every write that must
/// land atomically.
///
/// Dropping an unfinished unit of work rolls it back; callers normally close
/// it with [`UnitOfWork::finish`], which commits on success and aborts
/// explicitly on failure before handing the original error back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    label: &'static str,
}

impl UnitOfWork {
    pub async fn begin(pool: &SqlitePool, label: &'static str) -> Result<Self, sqlx::Error> {
        let tx = pool.begin().await?;
        tracing::trace!(label, "unit of work started");
        Ok(Self { tx, label })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        let label = self.label;
        self.tx.commit().await?;
        tracing::trace!(label, "unit of work committed");
        Ok(())
    }

    pub async fn abort(self) {
        let label = self.label;
        if let Err(err) = self.tx.rollback().await {
            tracing::warn!(label, error = %err, "unit of work rollback failed");
        }
    }

    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<sqlx::Error> + Display,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(label = self.label, error = %err, "aborting unit of work");
                self.abort().await;
                Err(err)
            }
        }
    }
}

//! # Refinery Migrations
//!
//! This section handles SQL migrations using the Refinery crate.
//! To add a new migration, create a new file in the /rust/refinery_migrations directory with the naming scheme:
//! V[YYYYMMDDHHmm]__[description].sql
//!
//! For example, if you made a migration on Dec 24th, 2021, at 10:41, to add post pinning, you may name it
//! V202112241041__post_pinning.sql
//!
//! V1 predates this scheme and creates the initial schema.
use std::ops::DerefMut;

use crate::backends::{BackendError, PostgresBackend};
use refinery::embed_migrations;
use thiserror::Error;

embed_migrations!("./refinery_migrations");

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connection(#[from] BackendError),
    #[error(transparent)]
    Refinery(#[from] refinery::Error),
}

/// Runs the Refinery migrator on the sql db.
pub async fn run_migrations(backend: &PostgresBackend) -> Result<refinery::Report, MigrationError> {
    let mut db_connection = backend.get_connection().await?;
    let migration_connection = db_connection.deref_mut().deref_mut();

    Ok(migrations::runner().run_async(migration_connection).await?)
}

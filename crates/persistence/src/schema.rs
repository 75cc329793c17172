//! Keyspace and table definitions

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u32,
) -> Result<(), PersistenceError> {
    let cql = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );
    session
        .query_unpaged(cql, ())
        .await
        .map_err(|e| PersistenceError::Schema(e.to_string()))?;
    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // One row per content record; the audio reference is the only column
    // this service writes.
    let contents = format!(
        "CREATE TABLE IF NOT EXISTS {}.contents (
            content_id text PRIMARY KEY,
            content_type text,
            summary text,
            title text,
            audio_reference_json text,
            updated_at bigint
        )",
        keyspace
    );
    session
        .query_unpaged(contents, ())
        .await
        .map_err(|e| PersistenceError::Schema(e.to_string()))?;
    Ok(())
}

use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_connection(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn open_connection(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub fn decode_timestamp(raw: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidRecord(format!("invalid {field_name} '{raw}': {error}"))
        })
}

pub fn decode_optional_timestamp(
    raw: Option<String>,
    field_name: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.as_deref()
        .map(|value| decode_timestamp(value, field_name))
        .transpose()
}

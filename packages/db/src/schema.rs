//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    db.query(QUEUE_SCHEMA).await?.check()?;
    db.query(JOB_SCHEMA).await?.check()?;
    db.query(QUEUE_ENTRY_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Queue table schema. Records are keyed by queue name.
const QUEUE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS name ON queue TYPE string;
DEFINE FIELD IF NOT EXISTS description ON queue TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON queue TYPE string;

DEFINE INDEX IF NOT EXISTS queue_name ON queue FIELDS name UNIQUE;
"#;

/// Job record table schema. Records are keyed by job ULID.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS queue ON job TYPE string;
DEFINE FIELD IF NOT EXISTS command ON job TYPE string;
DEFINE FIELD IF NOT EXISTS args ON job TYPE array<string> DEFAULT [];
DEFINE FIELD IF NOT EXISTS metadata ON job FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD IF NOT EXISTS status ON job TYPE string DEFAULT "new";
DEFINE FIELD IF NOT EXISTS return_code ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS output ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS error ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS worker ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS started_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS finished_at ON job TYPE option<string>;

DEFINE INDEX IF NOT EXISTS job_queue ON job FIELDS queue;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_queue_status ON job FIELDS queue, status;
"#;

/// Pending deliveries. Records are keyed by a ULID sequence so the oldest
/// entry sorts first; deleting an entry is the claim.
const QUEUE_ENTRY_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue_entry SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS seq ON queue_entry TYPE string;
DEFINE FIELD IF NOT EXISTS queue ON queue_entry TYPE string;
DEFINE FIELD IF NOT EXISTS job_id ON queue_entry TYPE string;

DEFINE INDEX IF NOT EXISTS entry_queue_seq ON queue_entry FIELDS queue, seq;
"#;

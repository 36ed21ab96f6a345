//! The process-wide SurrealDB connection.

use std::sync::LazyLock;

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use thiserror::Error;
use tokio::sync::OnceCell;

static DB: LazyLock<OnceCell<Surreal<Any>>> = LazyLock::new(OnceCell::new);

/// Database connection handle.
pub type Database = Surreal<Any>;

/// Endpoint schemes SurrealDB's `any` engine can open, paired with the
/// crate feature that compiles their backend in.
const SCHEMES: [(&str, &str, bool); 7] = [
    ("mem", "memory", true),
    ("file", "rocksdb", cfg!(feature = "rocksdb")),
    ("rocksdb", "rocksdb", cfg!(feature = "rocksdb")),
    ("ws", "remote", cfg!(feature = "remote")),
    ("wss", "remote", cfg!(feature = "remote")),
    ("http", "remote", cfg!(feature = "remote")),
    ("https", "remote", cfg!(feature = "remote")),
];

/// Schemes this build can actually connect to.
pub fn supported_schemes() -> Vec<&'static str> {
    SCHEMES
        .iter()
        .filter(|(_, _, enabled)| *enabled)
        .map(|(scheme, _, _)| *scheme)
        .collect()
}

/// Where the job database lives and how to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// `mem://`, `file://<path>`, `rocksdb://<path>` or a remote `ws://`/`http://` URL.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root user and password.
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "bgjobs".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// In-memory database, lost when the process exits.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::default().with_endpoint(format!("file://{}", path.into()))
    }

    /// Requires the `rocksdb` feature.
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self::default().with_endpoint(format!("rocksdb://{}", path.into()))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// The part of the endpoint before `://`.
    pub fn scheme(&self) -> Option<&str> {
        self.endpoint.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Whether data outlives the process. Only `mem://` does not.
    pub fn is_persistent(&self) -> bool {
        self.scheme() != Some("mem")
    }

    /// Reject configurations that cannot possibly connect, including
    /// schemes whose backend is not compiled into this build.
    pub fn validate(&self) -> Result<(), DbError> {
        let known = self
            .scheme()
            .and_then(|scheme| SCHEMES.iter().find(|(s, _, _)| *s == scheme));
        match known {
            Some((_, _, true)) => {}
            Some((scheme, feature, false)) => {
                return Err(DbError::Config(format!(
                    "endpoint `{}` needs the `{}` feature, this build was compiled without it ({}:// unavailable)",
                    self.endpoint, feature, scheme
                )));
            }
            None => {
                let expected: Vec<String> =
                    supported_schemes().iter().map(|s| format!("{}://", s)).collect();
                return Err(DbError::Config(format!(
                    "unsupported endpoint `{}`, expected one of {}",
                    self.endpoint,
                    expected.join(", ")
                )));
            }
        }
        if self.namespace.is_empty() || self.database.is_empty() {
            return Err(DbError::Config(
                "namespace and database must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for DbConfig {
    /// Renders `endpoint ns/db`, never the password.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.endpoint, self.namespace, self.database)?;
        if let Some((user, _)) = &self.credentials {
            write!(f, " as {}", user)?;
        }
        Ok(())
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not initialized - call init_db first")]
    NotInitialized,
    #[error("Invalid database configuration: {0}")]
    Config(String),
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Open the shared connection. The first successful call wins; later calls
/// return the existing connection whatever their configuration.
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    config.validate()?;
    if let Some(db) = DB.get() {
        tracing::debug!("Database already connected, ignoring {}", config);
        return Ok(db);
    }

    DB.get_or_try_init(|| async {
        tracing::info!("Connecting to database: {}", config);

        let db = connect(&config.endpoint).await?;
        if let Some((username, password)) = &config.credentials {
            db.signin(Root { username, password }).await?;
        }
        db.use_ns(&config.namespace).use_db(&config.database).await?;

        Ok(db)
    })
    .await
}

/// Get the shared connection.
pub fn get_db() -> Result<&'static Database, DbError> {
    DB.get().ok_or(DbError::NotInitialized)
}

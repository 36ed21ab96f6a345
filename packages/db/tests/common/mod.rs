#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::Runtime;
use tokio::sync::{Mutex, MutexGuard};

use db::{DbConfig, DbError};

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// The database connection is global and its background tasks live on the
/// runtime that opened it, so every test in a binary shares one runtime.
static RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
});

pub fn run<F>(test: F) -> Result<(), Box<dyn Error>>
where
    F: Future<Output = Result<(), Box<dyn Error>>>,
{
    RUNTIME.block_on(test)
}

/// Connect to the shared in-memory database and wipe it.
///
/// Hold the returned guard for the whole test.
pub async fn setup_db() -> Result<MutexGuard<'static, ()>, DbError> {
    let guard = TEST_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    let db_conn = db::get_db()?;
    db_conn
        .query("DELETE queue_entry; DELETE job; DELETE queue;")
        .await?
        .check()?;
    Ok(guard)
}

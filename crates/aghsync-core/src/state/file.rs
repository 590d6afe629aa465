// # File Timer Store
//
// File-backed implementation of TimerStore.
//
// ## Purpose
//
// Keeps the pending auto-on deadline across daemon restarts so an
// interrupted countdown can be replayed instead of lost.
//
// ## Crash Recovery
//
// - Atomic writes: the new value goes to a `.tmp` sibling, then is renamed
//   over the record
// - Corruption is detected by the scheduler on recovery, which resets the
//   record to `0`
//
// ## File Format
//
// A single line of text: `0` or an epoch-millisecond deadline, e.g.
//
// ```text
// 1736424000000
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::config::EndpointConfig;
use crate::traits::timer_store::{IDLE_RECORD, TimerStore};

/// File-based timer store
///
/// One file per accessory, named after its stable identifier.
///
/// # Example
///
/// ```rust,no_run
/// use aghsync_core::state::FileTimerStore;
/// use aghsync_core::traits::TimerStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileTimerStore::new("/var/lib/aghsync/aghsync-3f1c-timer.config").await?;
///
///     store.check_or_init().await?;
///     store.write("1736424000000").await?;
///     assert_eq!(store.read().await?, "1736424000000");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileTimerStore {
    path: PathBuf,
    // Serializes writers so two renames never race on the temp file
    write_lock: Mutex<()>,
}

impl FileTimerStore {
    /// Open a timer store at `path`, creating parent directories if needed
    ///
    /// The record itself is not created until [`TimerStore::check_or_init`]
    /// or the first write.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::storage(format!(
                        "Failed to create timer directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the timer store for an endpoint's accessory
    pub async fn for_endpoint(config: &EndpointConfig) -> Result<Self, Error> {
        Self::new(config.timer_file_path()).await
    }

    /// Location of the record
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    async fn write_atomic(&self, value: &str) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let temp_path = self.temp_path();

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(value.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Timer record written to {}: {}", self.path.display(), value);
        Ok(())
    }
}

#[async_trait]
impl TimerStore for FileTimerStore {
    async fn check_or_init(&self) -> Result<(), Error> {
        if fs::try_exists(&self.path).await.map_err(|e| {
            Error::storage(format!("Failed to stat {}: {}", self.path.display(), e))
        })? {
            return Ok(());
        }

        tracing::debug!("Initializing timer record at {}", self.path.display());
        self.write_atomic(IDLE_RECORD).await
    }

    async fn read(&self) -> Result<String, Error> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to read timer record {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(content.trim().to_string())
    }

    async fn write(&self, value: &str) -> Result<(), Error> {
        self.write_atomic(value).await
    }
}

// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Remembers the last confirmed public address across restarts and crashes,
// so a restart does not re-trigger file edits and notifications for an
// address that was already handled.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates the address on load
// - Automatic backup: Keeps .backup of the previous value
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// The file holds exactly the address, nothing else:
//
// ```text
// 203.0.113.7
// ```

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::Error;
use crate::address::PublicAddress;
use crate::atomic::write_atomic;
use crate::config::StateStoreConfig;
use crate::traits::state_store::{StateStore, StateStoreFactory};

/// File-based state store with crash recovery
///
/// Every `read_last()` goes to disk; nothing is cached in memory.
///
/// # Crash Recovery
///
/// - **Atomic writes**: New value written to a temporary file, then renamed
/// - **Backup**: Previous value kept in a `.backup` file
/// - **Corruption detection**: Content must parse as an address
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use ipsync_core::state::FileStateStore;
/// use ipsync_core::{PublicAddress, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ipsync/last_address");
///
///     store.write_last(&PublicAddress::parse("1.2.3.4")?).await?;
///
///     let last = store.read_last().await?;
///     assert_eq!(last, Some(PublicAddress::parse("1.2.3.4")?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

/// Result of loading one file
enum Loaded {
    Missing,
    Valid(PublicAddress),
    Corrupted(String),
}

impl FileStateStore {
    /// Create a file state store
    ///
    /// Nothing is touched on disk until the first read or write.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate a single file
    async fn load(path: &Path) -> Result<Loaded, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(match PublicAddress::parse(&content) {
            Ok(address) => Loaded::Valid(address),
            Err(e) => Loaded::Corrupted(e.to_string()),
        })
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".backup");
        path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read_last(&self) -> Result<Option<PublicAddress>, Error> {
        match Self::load(&self.path).await? {
            Loaded::Missing => {
                tracing::debug!("State file does not exist: {}", self.path.display());
                Ok(None)
            }
            Loaded::Valid(address) => Ok(Some(address)),
            Loaded::Corrupted(reason) => {
                tracing::warn!(
                    "State file {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    reason
                );

                let backup_path = Self::backup_path(&self.path);
                match Self::load(&backup_path).await? {
                    Loaded::Valid(address) => {
                        tracing::info!("Recovered address {} from backup", address);
                        if let Err(restore_err) =
                            Self::restore_from_backup(&self.path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(Some(address))
                    }
                    Loaded::Missing => Err(Error::storage(format!(
                        "State file {} is corrupted ({}) and no backup exists",
                        self.path.display(),
                        reason
                    ))),
                    Loaded::Corrupted(backup_reason) => Err(Error::storage(format!(
                        "State file {} is corrupted ({}) and so is its backup ({})",
                        self.path.display(),
                        reason,
                        backup_reason
                    ))),
                }
            }
        }
    }

    async fn write_last(&self, address: &PublicAddress) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Keep the previous value around for recovery
        if let Loaded::Valid(_) = Self::load(&self.path).await? {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        write_atomic(&self.path, address.to_string().as_bytes())
            .await
            .map_err(|e| {
                Error::storage(format!(
                    "Failed to write state file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to remove state file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Factory for [`FileStateStore`]
pub struct FileStateStoreFactory;

impl StateStoreFactory for FileStateStoreFactory {
    fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path))),
            _ => Err(Error::config("Invalid config for file state store")),
        }
    }
}

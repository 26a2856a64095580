// src/registry.rs
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ethers::types::{Address, U256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::types::RegisteredToken;

type Partitions = BTreeMap<String, Vec<RegisteredToken>>;

/// Tokens created or known per `(chainId, owner)` partition.
///
/// Appends are serialized behind one lock, and when a path is configured the
/// whole document is rewritten before the lock is released. Entries are never
/// merged: deploying the same metadata twice yields two entries.
pub struct TokenRegistry {
    path: Option<PathBuf>,
    partitions: Mutex<Partitions>,
}

pub fn partition_key(chain_id: u64, owner: Address) -> String {
    format!("deployedTokens_{}_0x{}", chain_id, hex::encode(owner.as_bytes()))
}

impl TokenRegistry {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            partitions: Mutex::new(Partitions::new()),
        }
    }

    /// Open the registry stored at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let partitions = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let partitions: Partitions = serde_json::from_str(&json)?;
            info!(path = %path.display(), partitions = partitions.len(), "token registry loaded");
            partitions
        } else {
            info!(path = %path.display(), "token registry file not found, starting empty");
            Partitions::new()
        };
        Ok(Self {
            path: Some(path),
            partitions: Mutex::new(partitions),
        })
    }

    pub fn record_deployed(&self, token: RegisteredToken) -> Result<(), RegistryError> {
        let key = partition_key(token.chain_id, token.owner_smart_account);
        let mut partitions = self.lock();
        partitions.entry(key.clone()).or_default().push(token);

        if let Err(e) = self.persist(&partitions) {
            if let Some(entries) = partitions.get_mut(&key) {
                entries.pop();
                if entries.is_empty() {
                    partitions.remove(&key);
                }
            }
            return Err(e);
        }
        debug!(key = %key, "token recorded");
        Ok(())
    }

    /// Tokens for one owner on one chain, in insertion order.
    pub fn list(&self, chain_id: u64, owner: Address) -> Vec<RegisteredToken> {
        self.lock()
            .get(&partition_key(chain_id, owner))
            .cloned()
            .unwrap_or_default()
    }

    /// Every token known on `chain_id`, regardless of owner.
    pub fn list_known(&self, chain_id: u64) -> Vec<RegisteredToken> {
        self.lock()
            .values()
            .flatten()
            .filter(|token| token.chain_id == chain_id)
            .cloned()
            .collect()
    }

    /// Store a freshly read balance on every entry for `address` in the partition.
    pub fn update_balance(
        &self,
        chain_id: u64,
        owner: Address,
        address: Address,
        balance: U256,
    ) -> Result<usize, RegistryError> {
        let mut partitions = self.lock();
        let Some(entries) = partitions.get_mut(&partition_key(chain_id, owner)) else {
            return Ok(0);
        };

        let mut previous = Vec::new();
        for (index, token) in entries.iter_mut().enumerate() {
            if token.address == address {
                previous.push((index, token.last_known_balance));
                token.last_known_balance = balance;
            }
        }
        if previous.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&partitions) {
            if let Some(entries) = partitions.get_mut(&partition_key(chain_id, owner)) {
                for (index, old) in &previous {
                    entries[*index].last_known_balance = *old;
                }
            }
            return Err(e);
        }
        Ok(previous.len())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Partitions> {
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, partitions: &Partitions) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(partitions)?;

        // The document is replaced by rename, never truncated in place.
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

//! Storage provider trait and implementations
//!
//! This module defines the storage abstraction the host uses for contract
//! state and for persisting async contexts that wait on cross-shard calls.

use crate::error::Result;
use std::collections::HashMap;

/// Storage provider trait
///
/// This trait must be implemented by the TOS blockchain to provide
/// storage access to contracts. The host itself does not implement storage;
/// it only defines the interface.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use tos_program_runtime::{storage::StorageProvider, Result};
///
/// struct TosChainStorage {
///     // Your storage implementation
/// }
///
/// impl StorageProvider for TosChainStorage {
///     fn get(&self, contract_hash: &[u8; 32], key: &[u8]) -> Result<Option<Vec<u8>>> {
///         // Read from your storage backend
///         todo!()
///     }
///
///     fn set(&mut self, contract_hash: &[u8; 32], key: &[u8], value: &[u8]) -> Result<()> {
///         // Write to your storage backend
///         todo!()
///     }
///
///     fn delete(&mut self, contract_hash: &[u8; 32], key: &[u8]) -> Result<bool> {
///         // Delete from your storage backend
///         todo!()
///     }
/// }
/// ```
pub trait StorageProvider {
    /// Read a value from contract storage
    ///
    /// # Arguments
    /// * `contract_hash` - Hash of the contract (for isolation)
    /// * `key` - Storage key
    ///
    /// # Returns
    /// * `Some(value)` if the key exists
    /// * `None` if the key doesn't exist
    fn get(&self, contract_hash: &[u8; 32], key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a value to contract storage
    ///
    /// # Arguments
    /// * `contract_hash` - Hash of the contract (for isolation)
    /// * `key` - Storage key
    /// * `value` - Value to store
    fn set(&mut self, contract_hash: &[u8; 32], key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from contract storage
    ///
    /// # Arguments
    /// * `contract_hash` - Hash of the contract (for isolation)
    /// * `key` - Storage key
    ///
    /// # Returns
    /// * `true` if the key existed and was deleted
    /// * `false` if the key didn't exist
    fn delete(&mut self, contract_hash: &[u8; 32], key: &[u8]) -> Result<bool>;
}

/// No-op storage provider for testing
///
/// This implementation does nothing and is useful for:
/// - Unit tests that don't need storage
/// - Development/debugging
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStorage;

impl StorageProvider for NoOpStorage {
    fn get(&self, _contract_hash: &[u8; 32], _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&mut self, _contract_hash: &[u8; 32], _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn delete(&mut self, _contract_hash: &[u8; 32], _key: &[u8]) -> Result<bool> {
        Ok(false)
    }
}

/// In-memory storage keyed by contract and key
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: HashMap<([u8; 32], Vec<u8>), Vec<u8>>,
}

impl InMemoryStorage {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all contracts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StorageProvider for InMemoryStorage {
    fn get(&self, contract_hash: &[u8; 32], key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&(*contract_hash, key.to_vec())).cloned())
    }

    fn set(&mut self, contract_hash: &[u8; 32], key: &[u8], value: &[u8]) -> Result<()> {
        self.entries
            .insert((*contract_hash, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, contract_hash: &[u8; 32], key: &[u8]) -> Result<bool> {
        Ok(self.entries.remove(&(*contract_hash, key.to_vec())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_storage() {
        let mut storage = NoOpStorage;
        let contract = [1u8; 32];
        let key = b"test_key";
        let value = b"test_value";

        // Read non-existent key
        assert_eq!(storage.get(&contract, key).unwrap(), None);

        // Write
        assert!(storage.set(&contract, key, value).is_ok());

        // Delete
        assert!(!storage.delete(&contract, key).unwrap());
    }

    #[test]
    fn test_in_memory_storage_isolates_contracts() {
        let mut storage = InMemoryStorage::new();
        let key = b"counter";

        storage.set(&[1u8; 32], key, b"1").unwrap();
        assert_eq!(storage.get(&[1u8; 32], key).unwrap(), Some(b"1".to_vec()));
        assert_eq!(storage.get(&[2u8; 32], key).unwrap(), None);

        // Overwrite
        storage.set(&[1u8; 32], key, b"2").unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(&[1u8; 32], key).unwrap(), Some(b"2".to_vec()));

        assert!(storage.delete(&[1u8; 32], key).unwrap());
        assert!(!storage.delete(&[1u8; 32], key).unwrap());
        assert!(storage.is_empty());
    }
}

//! Host configuration and gas schedule

use serde::{Deserialize, Serialize};

/// Gas costs charged by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Cost of one asynchronous step (call dispatch or callback dispatch)
    pub async_call_step: u64,
    /// Extra gas locked at async-call entry for the eventual callback
    pub async_callback_gas_lock: u64,
    /// Per-byte cost of copying call data into a new input
    pub data_copy_per_byte: u64,
    /// Per-byte cost of compiling contract code before execution
    pub compile_per_byte: u64,
    /// Base cost of registering an async call
    pub create_async_call: u64,
    /// Base cost of setting a group or context callback
    pub set_async_callback: u64,
    /// Base cost of a value transfer
    pub transfer_value: u64,
    /// Base cost of `tos_log`
    pub log: u64,
    /// Base cost of appending to the finish buffer
    pub finish: u64,
    /// Cost of reading return data
    pub get_return_data: u64,
    /// Base cost of a storage read
    pub storage_load: u64,
    /// Base cost of a storage write
    pub storage_store: u64,
    /// Cost of a storage delete
    pub storage_delete: u64,
    /// Per-byte refund for storage freed by a delete
    pub storage_release_per_byte: u64,
    /// Per-byte cost of persisting data
    pub persist_per_byte: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            async_call_step: 100_000,
            async_callback_gas_lock: 4_000_000,
            data_copy_per_byte: 50,
            compile_per_byte: 1,
            create_async_call: 100_000,
            set_async_callback: 50_000,
            transfer_value: 500,
            log: 100,
            finish: 100,
            get_return_data: 50,
            storage_load: 200,
            storage_store: 500,
            storage_delete: 300,
            storage_release_per_byte: 10,
            persist_per_byte: 2,
        }
    }
}

impl GasSchedule {
    /// Small, round costs convenient for tests and local tooling
    pub fn test() -> Self {
        Self {
            async_call_step: 10,
            async_callback_gas_lock: 100,
            data_copy_per_byte: 1,
            compile_per_byte: 0,
            create_async_call: 0,
            set_async_callback: 0,
            transfer_value: 5,
            log: 100,
            finish: 1,
            get_return_data: 1,
            storage_load: 20,
            storage_store: 50,
            storage_delete: 30,
            storage_release_per_byte: 1,
            persist_per_byte: 1,
        }
    }
}

/// Runtime configuration of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gas schedule applied to every frame
    pub gas_schedule: GasSchedule,
    /// Maximum number of nested frames
    pub max_call_depth: usize,
    /// Re-derive the callback caller from multi-transfer relays
    pub multi_transfer_callback_enabled: bool,
}

impl Config {
    /// Default maximum frame depth
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

    /// Configuration using [`GasSchedule::test`]
    pub fn test() -> Self {
        Self {
            gas_schedule: GasSchedule::test(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gas_schedule: GasSchedule::default(),
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
            multi_transfer_callback_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip_keeps_schedule() {
        let config = Config::test();
        let bytes = bincode::serialize(&config).unwrap();
        let decoded: Config = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.gas_schedule.async_call_step, 10);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_call_depth, 64);
        assert!(config.multi_transfer_callback_enabled);
        assert!(config.gas_schedule.async_callback_gas_lock > config.gas_schedule.async_call_step);
    }
}

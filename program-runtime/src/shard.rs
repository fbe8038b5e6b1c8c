//! Partition (shard) placement of addresses

use crate::types::Address;

/// Decides whether two addresses live in the same partition
pub trait ShardCoordinator {
    /// Partition of `address`
    fn shard_of(&self, address: &Address) -> u32;

    /// Whether `a` and `b` are in the same partition
    fn same_shard(&self, a: &Address, b: &Address) -> bool {
        self.shard_of(a) == self.shard_of(b)
    }
}

/// Every address lives in partition zero
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleShard;

impl ShardCoordinator for SingleShard {
    fn shard_of(&self, _address: &Address) -> u32 {
        0
    }
}

/// Places an address by its last byte modulo the number of partitions
#[derive(Debug, Clone, Copy)]
pub struct ShardMask {
    num_shards: u32,
}

impl ShardMask {
    /// Coordinator over `num_shards` partitions (at least one)
    pub fn new(num_shards: u32) -> Self {
        Self {
            num_shards: num_shards.max(1),
        }
    }
}

impl ShardCoordinator for ShardMask {
    fn shard_of(&self, address: &Address) -> u32 {
        u32::from(address[31])
            .checked_rem(self.num_shards)
            .unwrap_or(0)
    }
}

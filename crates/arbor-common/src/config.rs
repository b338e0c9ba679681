//! Configuration structures for Arbor maintenance.

use crate::error::{ArborError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for index vacuum runs.
///
/// The cost parameters implement cost-based pacing: every page visit and
/// every page dirtied adds to a running balance, and once the balance
/// reaches `cost_limit` the vacuum sleeps for `cost_delay_ms` before
/// continuing. A delay of zero disables pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VacuumConfig {
    /// Sleep duration in milliseconds once the cost limit is reached (0 = no pacing).
    pub cost_delay_ms: u64,
    /// Accumulated cost that triggers a sleep.
    pub cost_limit: u32,
    /// Cost charged for visiting a page.
    pub cost_page_hit: u32,
    /// Cost charged for dirtying a page.
    pub cost_page_dirty: u32,
    /// Number of block numbers held by each page-set arena chunk.
    pub page_set_chunk_blocks: usize,
}

impl Default for VacuumConfig {
    fn default() -> Self {
        Self {
            cost_delay_ms: 0,
            cost_limit: 200,
            cost_page_hit: 1,
            cost_page_dirty: 20,
            page_set_chunk_blocks: 4096, // 16 KB of u32 block numbers
        }
    }
}

impl VacuumConfig {
    /// Returns true if cost-based pacing is enabled.
    pub fn pacing_enabled(&self) -> bool {
        self.cost_delay_ms > 0
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.cost_limit == 0 {
            return Err(ArborError::InvalidParameter {
                name: "cost_limit".to_string(),
                value: self.cost_limit.to_string(),
            });
        }
        if self.page_set_chunk_blocks == 0 {
            return Err(ArborError::InvalidParameter {
                name: "page_set_chunk_blocks".to_string(),
                value: self.page_set_chunk_blocks.to_string(),
            });
        }
        Ok(())
    }
}

//! Cost-based pacing and cancellation between page visits.

use arbor_common::{ArborError, Result, VacuumConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Tracks the work done by a vacuum and sleeps once it exceeds the
/// configured budget.
///
/// [`VacuumDelay::delay_point`] must only be called while no page lock is
/// held.
pub struct VacuumDelay<'a> {
    index: &'a str,
    config: &'a VacuumConfig,
    interrupt: Option<&'a AtomicBool>,
    balance: u32,
    naps: u64,
}

impl<'a> VacuumDelay<'a> {
    pub fn new(index: &'a str, config: &'a VacuumConfig, interrupt: Option<&'a AtomicBool>) -> Self {
        Self {
            index,
            config,
            interrupt,
            balance: 0,
            naps: 0,
        }
    }

    /// Fails with [`ArborError::Interrupted`] if cancellation was requested,
    /// then sleeps if the cost balance reached the limit.
    pub fn delay_point(&mut self) -> Result<()> {
        if self
            .interrupt
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(ArborError::Interrupted(self.index.to_string()));
        }

        if self.config.pacing_enabled() && self.balance >= self.config.cost_limit {
            std::thread::sleep(Duration::from_millis(self.config.cost_delay_ms));
            self.balance = 0;
            self.naps += 1;
        }
        Ok(())
    }

    /// Charges one page visit.
    pub fn charge_hit(&mut self) {
        self.balance = self.balance.saturating_add(self.config.cost_page_hit);
    }

    /// Charges one page dirtied.
    pub fn charge_dirty(&mut self) {
        self.balance = self.balance.saturating_add(self.config.cost_page_dirty);
    }

    /// Returns how many times the vacuum has slept.
    pub fn naps(&self) -> u64 {
        self.naps
    }
}

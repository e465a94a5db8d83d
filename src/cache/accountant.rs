//! Per-instance and process-wide resident tile byte counters.

use std::sync::Mutex;

/// Process-wide total of bytes resident across every open store. Guarded
/// by its own mutex, acquired only briefly and never while holding any
/// other lock in this crate.
static TOTAL_USED_MEMORY: Mutex<u64> = Mutex::new(0);

/// Tracks bytes resident in one store's cache against its configured
/// budget, and mirrors the delta into the process-wide total.
#[derive(Debug)]
pub struct Accountant {
    used_memory: u64,
    memory_limit: u64,
}

impl Accountant {
    pub fn new(memory_limit: u64) -> Self {
        Accountant { used_memory: 0, memory_limit }
    }

    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn over_budget(&self) -> bool {
        self.used_memory > self.memory_limit
    }

    pub fn charge(&mut self, bytes: u64) {
        self.used_memory += bytes;
        let mut total = TOTAL_USED_MEMORY.lock().unwrap_or_else(|e| e.into_inner());
        *total += bytes;
    }

    pub fn discharge(&mut self, bytes: u64) {
        self.used_memory -= bytes;
        let mut total = TOTAL_USED_MEMORY.lock().unwrap_or_else(|e| e.into_inner());
        *total -= bytes;
    }
}

impl Drop for Accountant {
    fn drop(&mut self) {
        // A well-behaved store discharges every tile before dropping its
        // accountant (see Store::close); this is a last-resort reconciliation
        // so a leaked store doesn't permanently inflate the process total.
        if self.used_memory > 0 {
            let mut total = TOTAL_USED_MEMORY.lock().unwrap_or_else(|e| e.into_inner());
            *total = total.saturating_sub(self.used_memory);
        }
    }
}

/// Snapshot of the process-wide resident byte total, for diagnostics.
pub fn total_used_memory() -> u64 {
    *TOTAL_USED_MEMORY.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    // TOTAL_USED_MEMORY is process-wide; serialize tests that read it so
    // they don't observe each other's concurrent charges.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_charge_and_discharge() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = total_used_memory();
        let mut acc = Accountant::new(1024);
        acc.charge(100);
        assert_eq!(acc.used_memory(), 100);
        assert_eq!(total_used_memory(), before + 100);
        acc.discharge(100);
        assert_eq!(acc.used_memory(), 0);
        assert_eq!(total_used_memory(), before);
    }

    #[test]
    fn test_over_budget() {
        let mut acc = Accountant::new(100);
        assert!(!acc.over_budget());
        acc.charge(200);
        assert!(acc.over_budget());
        acc.discharge(200);
    }

    #[test]
    fn test_drop_reconciles_leaked_usage() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = total_used_memory();
        {
            let mut acc = Accountant::new(1024);
            acc.charge(64);
        }
        assert_eq!(total_used_memory(), before);
    }
}

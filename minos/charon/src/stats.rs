//! Machine-wide tick and event counters.
//!
//! The clock advances in ticks. Ticks are charged to user, system, or idle
//! time depending on what the processor was doing when they elapsed, and
//! `total_ticks` is always the sum of the three. The scheduler reads
//! `user_ticks` to measure CPU bursts; the memory manager bumps the paging
//! and disk counters.

/// Counters describing everything the machine has done so far.
///
/// All counters are monotone; nothing ever decrements them.
#[derive(Default, Debug)]
pub struct Stats {
    /// Ticks elapsed since boot.
    pub total_ticks: u64,
    /// Ticks spent with no thread to run.
    pub idle_ticks: u64,
    /// Ticks spent executing kernel code.
    pub system_ticks: u64,
    /// Ticks spent executing user code.
    pub user_ticks: u64,

    /// Page faults taken.
    pub num_page_faults: u64,
    /// Sectors read from the swap disk at run time.
    pub num_disk_reads: u64,
    /// Sectors written to the swap disk at run time.
    pub num_disk_writes: u64,
}

impl Stats {
    /// Charge `ticks` of user-mode execution.
    pub fn advance_user(&mut self, ticks: u64) {
        self.user_ticks += ticks;
        self.total_ticks += ticks;
    }

    /// Charge `ticks` of kernel-mode execution.
    pub fn advance_system(&mut self, ticks: u64) {
        self.system_ticks += ticks;
        self.total_ticks += ticks;
    }

    /// Charge `ticks` of idle time.
    pub fn advance_idle(&mut self, ticks: u64) {
        self.idle_ticks += ticks;
        self.total_ticks += ticks;
    }
}

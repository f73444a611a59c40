//! Charon: the machine layer underneath the minos kernel.
//!
//! Everything the kernel treats as hardware lives in this crate: the
//! processor's interrupt level, the tick and event counters, physical main
//! memory, and the swap disk. The kernel proper never touches anything
//! machine-shaped except through these types, so the boundary between
//! "kernel policy" and "machine mechanism" stays visible in the code.
//!
//! The machine is simulated. Main memory is a byte array carved into
//! frames, the disk is a sector array in memory, and the interrupt level is
//! a flag the kernel flips around its critical sections exactly as it would
//! program a real interrupt controller. Simulation keeps every component
//! deterministic and lets the whole machine be constructed per test, with
//! no global state shared between kernels.

pub mod disk;
pub mod interrupt;
pub mod mem;
pub mod stats;

pub use disk::{SimDisk, SwapDisk};
pub use interrupt::{Interrupts, Level};
pub use mem::MainMemory;
pub use stats::Stats;

/// Number of general-purpose registers in the simulated processor.
pub const NUM_REGS: usize = 16;

/// Sizing and timing parameters of the simulated machine.
///
/// All kernel state is dimensioned from one of these at construction time;
/// nothing is resized afterwards.
#[derive(Clone, Copy, Debug)]
pub struct MachineConfig {
    /// Bytes per physical frame, virtual page, and disk sector.
    pub page_size: usize,
    /// Number of physical frames backing main memory.
    pub num_phys_pages: usize,
    /// Number of sectors in the swap area.
    pub num_sectors: usize,
    /// Timer periods a thread may run before the round-robin policy
    /// requeues it.
    pub quantum: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            page_size: 128,
            num_phys_pages: 32,
            num_sectors: 1024,
            quantum: 1,
        }
    }
}

/// The simulated machine: interrupt level, counters, register file, and
/// main memory, bundled the way the kernel receives them.
///
/// The swap disk is deliberately *not* part of the bundle; the kernel owns
/// it behind the [`SwapDisk`] trait so tests can substitute their own
/// device.
pub struct Machine {
    config: MachineConfig,
    /// Interrupt level of the (single) processor.
    pub interrupt: Interrupts,
    /// Tick and event counters.
    pub stats: Stats,
    /// Physical main memory.
    pub memory: MainMemory,
    /// General-purpose register file of the running user program.
    pub regs: [u32; NUM_REGS],
    /// Identity of the address space whose translations are currently
    /// installed, if any.
    pub active_space: Option<u64>,
}

impl Machine {
    /// Build a machine from `config`, with interrupts enabled, zeroed
    /// counters, and zero-filled memory.
    pub fn new(config: MachineConfig) -> Self {
        Machine {
            config,
            interrupt: Interrupts::new(),
            stats: Stats::default(),
            memory: MainMemory::new(config.page_size, config.num_phys_pages),
            regs: [0; NUM_REGS],
            active_space: None,
        }
    }

    /// The configuration this machine was built from.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Bytes per page, frame, and sector.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }
}

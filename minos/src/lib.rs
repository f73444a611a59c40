//! # Minos
//!
//! Minos is a small teaching kernel, modeled in user space so that every
//! piece of it can be constructed, driven, and inspected from ordinary
//! tests. It implements the two subsystems where the interesting
//! engineering lives:
//!
//! - **Scheduling** ([`thread::scheduler`]) — a multi-policy dispatcher
//!   (FCFS, round robin, and shortest-job-first in non-preemptive and
//!   preemptive flavors) with a sleep/alarm facility and
//!   exponentially-weighted CPU-burst estimation feeding the SJF policies.
//! - **Memory management** ([`mm`]) — demand paging over a fixed pool of
//!   physical frames backed by a swap disk, with approximate-LRU victim
//!   selection and per-slot pinning around disk transfers.
//!
//! Both sit on the same thread abstraction ([`thread`]) and on the
//! simulated machine layer provided by the `charon` crate: interrupt
//! level, tick counters, main memory, and the swap disk. The [`Kernel`]
//! facade wires the collaborators together and plays the roles the
//! subsystems deliberately leave to the outside — the timer that expires
//! round-robin quanta, and the admission path that applies the preemptive
//! shortest-job-first comparison.
//!
//! ## Concurrency model
//!
//! Minos is a cooperative uniprocessor kernel. Mutual exclusion inside the
//! scheduler is the interrupts-off discipline: critical sections disable
//! interrupts on entry, and every scheduler operation asserts they are
//! off. Locks are deliberately absent from the scheduler — waiting on a
//! busy lock would recurse into the dispatcher. The memory manager pins
//! frames and sectors with per-slot flags while a transfer is in flight;
//! observers of a pinned slot yield cooperatively and re-check.
//!
//! Kernel-invariant violations do not produce error values; they abort.
//! A page lost from both tiers, an exhausted swap area, or a second
//! unburied carcass means the kernel itself is wrong, and no caller can
//! meaningfully recover.

pub mod kernel;
pub mod mm;
pub mod thread;

pub use charon::{MachineConfig, Stats};
pub use kernel::Kernel;
pub use thread::scheduler::SchedPolicy;

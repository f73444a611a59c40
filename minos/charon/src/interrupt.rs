//! Interrupt level of the simulated processor.
//!
//! On a uniprocessor, masking interrupts is mutual exclusion: while the
//! level is [`Level::Off`] nothing can preempt the running code, so any
//! state it touches is touched by one writer. The kernel relies on this
//! discipline instead of locks — its critical sections disable interrupts
//! on entry and restore the previous level on exit, and every
//! scheduler-manipulating operation asserts the level is `Off` before it
//! touches a queue.

/// Whether the processor is accepting interrupts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Level {
    /// Interrupts are disabled.
    Off,
    /// Interrupts are enabled.
    On,
}

/// The interrupt controller state of the single simulated processor.
pub struct Interrupts {
    level: Level,
}

impl Interrupts {
    /// A controller with interrupts enabled, the state the machine boots
    /// in.
    pub fn new() -> Self {
        Interrupts { level: Level::On }
    }

    /// Read the current interrupt level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Set the interrupt level, returning the previous one so callers can
    /// restore it when their critical section ends.
    pub fn set_level(&mut self, new: Level) -> Level {
        let old = self.level;
        self.level = new;
        old
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

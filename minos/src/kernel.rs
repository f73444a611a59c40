//! The kernel: collaborators wired together.
//!
//! [`Kernel`] owns the machine, the swap disk, the scheduler, the memory
//! manager, and the thread and space registries, and provides the
//! operations threads invoke on themselves: spawn, yield, sleep, finish,
//! translate. It is also the timer's target — [`Kernel::tick`] advances
//! the clock, drives the alarm, and applies the policy rules that live
//! *outside* the scheduler proper: the round-robin quantum and the
//! preemptive-SJF comparison.
//!
//! The kernel bootstraps with a `main` thread already holding the CPU, so
//! there is always exactly one running thread from construction onward.
//! Tests drive the kernel by invoking operations on behalf of whichever
//! thread is current, and observe dispatch decisions on the CPU's switch
//! trace.

use crate::mm::addrspace::{AddrSpace, SpaceId, SpaceTable};
use crate::mm::MemoryManager;
use crate::thread::scheduler::{SchedPolicy, Scheduler};
use crate::thread::{Cpu, Thread, ThreadId, ThreadStatus, ThreadTable, Yield};
use charon::{Level, Machine, MachineConfig, SimDisk, SwapDisk};
use log::debug;

/// Upper bound on fault-side waits for a pinned slot.
///
/// In this model disk transfers complete synchronously, so a slot found
/// pinned can only mean the kernel deadlocked against itself; the bound
/// turns that hang into a diagnosable abort.
const FAULT_WAIT_BOUND: u32 = 4096;

struct FaultWait {
    spins: u32,
}

impl Yield for FaultWait {
    fn yield_now(&mut self) {
        self.spins += 1;
        assert!(
            self.spins < FAULT_WAIT_BOUND,
            "page transfer never completed"
        );
    }
}

/// The assembled kernel.
pub struct Kernel {
    machine: Machine,
    swap_disk: Box<dyn SwapDisk>,
    scheduler: Scheduler,
    memory: MemoryManager,
    threads: ThreadTable,
    spaces: SpaceTable,
    cpu: Cpu,
    /// Timer periods the running thread has held the CPU since its
    /// dispatch. Consulted by the round-robin quantum rule.
    slice_ticks: u64,
    halted: bool,
}

impl Kernel {
    /// Assemble a kernel for `config`, scheduling under `policy`, with the
    /// bootstrap `main` thread holding the CPU.
    pub fn new(policy: SchedPolicy, config: MachineConfig) -> Self {
        let mut threads = ThreadTable::new();
        let mut cpu = Cpu::new();

        let main = threads.insert(Thread::new("main"));
        threads.get_mut(main).set_status(ThreadStatus::Running);
        cpu.set_current(Some(main));

        Kernel {
            machine: Machine::new(config),
            swap_disk: Box::new(SimDisk::new(config.page_size, config.num_sectors)),
            scheduler: Scheduler::new(policy),
            memory: MemoryManager::new(config.num_phys_pages, config.num_sectors),
            threads,
            spaces: SpaceTable::new(),
            cpu,
            slice_ticks: 0,
            halted: false,
        }
    }

    /// Create a kernel-only thread and admit it to the scheduler.
    pub fn spawn(&mut self, name: impl Into<String>) -> ThreadId {
        let id = self.threads.insert(Thread::new(name));
        let old_level = self.machine.interrupt.set_level(Level::Off);
        self.admit(id);
        self.machine.interrupt.set_level(old_level);
        id
    }

    /// Create a thread executing in a fresh address space of `num_pages`
    /// virtual pages, and admit it.
    pub fn spawn_with_space(
        &mut self,
        name: impl Into<String>,
        num_pages: usize,
    ) -> (ThreadId, SpaceId) {
        let space = self.spaces.insert(AddrSpace::new(num_pages));
        let id = self.threads.insert(Thread::new(name));
        self.threads.get_mut(id).space = Some(space);

        let old_level = self.machine.interrupt.set_level(Level::Off);
        self.admit(id);
        self.machine.interrupt.set_level(old_level);
        (id, space)
    }

    /// Admit `id` to the ready list and apply the preemptive-SJF rule.
    /// Interrupts must be off.
    fn admit(&mut self, id: ThreadId) {
        self.scheduler
            .ready_to_run(&self.machine, &mut self.threads, id);
        self.maybe_preempt_sjf();
    }

    /// The preemptive-SJF trigger, which lives outside the scheduler
    /// proper: fold the running thread's partial burst so its remaining
    /// estimate is fresh, then yield to the head of the ready list if its
    /// estimate is strictly shorter. Under the `Sjf` policy the ready
    /// list is sorted, so the head is the shortest ready thread.
    /// Interrupts must be off.
    fn maybe_preempt_sjf(&mut self) {
        if self.scheduler.policy() != SchedPolicy::Sjf {
            return;
        }
        if let (Some(current), Some(head)) = (self.cpu.current(), self.scheduler.ready_head()) {
            self.scheduler.accum_new_burst(&self.machine, current);
            if self.scheduler.rest_burst_time(head) < self.scheduler.rest_burst_time(current) {
                self.do_yield();
            }
        }
    }

    /// Relinquish the CPU if another thread is ready. Interrupts must be
    /// off.
    fn do_yield(&mut self) {
        let current = self.cpu.current().expect("yield with no running thread");
        if let Some(next) = self.scheduler.find_next_to_run(&self.machine) {
            self.scheduler
                .ready_to_run(&self.machine, &mut self.threads, current);
            self.scheduler.run(
                &mut self.machine,
                &mut self.threads,
                &mut self.spaces,
                &mut self.cpu,
                next,
                false,
            );
            self.slice_ticks = 0;
        }
    }

    /// Voluntarily yield the CPU. A no-op when nothing else is ready.
    pub fn yield_now(&mut self) {
        let old_level = self.machine.interrupt.set_level(Level::Off);
        self.do_yield();
        self.machine.interrupt.set_level(old_level);
    }

    /// Put the running thread to sleep for `ticks` timer ticks and
    /// dispatch another thread.
    ///
    /// When nothing else is ready the kernel idles the clock forward
    /// until the alarm readies a sleeper — possibly the caller itself.
    pub fn sleep_current(&mut self, ticks: u64) {
        let old_level = self.machine.interrupt.set_level(Level::Off);
        let current = self.cpu.current().expect("sleep with no running thread");
        self.scheduler
            .set_to_sleep(&self.machine, &mut self.threads, current, ticks);

        loop {
            if let Some(next) = self.scheduler.find_next_to_run(&self.machine) {
                self.scheduler.run(
                    &mut self.machine,
                    &mut self.threads,
                    &mut self.spaces,
                    &mut self.cpu,
                    next,
                    false,
                );
                self.slice_ticks = 0;
                break;
            }
            self.idle_tick();
        }
        self.machine.interrupt.set_level(old_level);
    }

    /// Finish the running thread.
    ///
    /// The successor buries the carcass during its own dispatch. When no
    /// successor exists and no sleeper can produce one, the machine halts
    /// and the last thread is dropped directly; there is no other stack
    /// left to run the epilogue from.
    pub fn finish_current(&mut self) {
        let old_level = self.machine.interrupt.set_level(Level::Off);
        let current = self.cpu.current().expect("finish with no running thread");

        loop {
            if let Some(next) = self.scheduler.find_next_to_run(&self.machine) {
                self.scheduler.run(
                    &mut self.machine,
                    &mut self.threads,
                    &mut self.spaces,
                    &mut self.cpu,
                    next,
                    true,
                );
                self.slice_ticks = 0;
                break;
            }
            if self.scheduler.no_one_sleeping() {
                let th = self.threads.remove(current);
                debug!("halting after thread {}", th.name());
                self.cpu.set_current(None);
                self.halted = true;
                break;
            }
            self.idle_tick();
        }
        self.machine.interrupt.set_level(old_level);
    }

    /// One timer period: charge the tick, run the alarm, then apply the
    /// policy rule the timer is responsible for.
    pub fn tick(&mut self) {
        let old_level = self.machine.interrupt.set_level(Level::Off);

        if self.cpu.current().is_some() {
            self.machine.stats.advance_user(1);
        } else {
            self.machine.stats.advance_idle(1);
        }
        self.scheduler.alarm_ticks(&self.machine, &mut self.threads);

        match self.scheduler.policy() {
            SchedPolicy::RoundRobin => {
                if self.cpu.current().is_some() {
                    self.slice_ticks += 1;
                    if self.slice_ticks >= self.machine.config().quantum {
                        self.slice_ticks = 0;
                        self.do_yield();
                    }
                }
            }
            SchedPolicy::Sjf => self.maybe_preempt_sjf(),
            SchedPolicy::Fcfs | SchedPolicy::Nsjf => {}
        }

        self.machine.interrupt.set_level(old_level);
    }

    /// Idle for one timer period: nothing runs, but the clock moves and
    /// the alarm fires. Interrupts must be off.
    fn idle_tick(&mut self) {
        self.machine.stats.advance_idle(1);
        self.scheduler.alarm_ticks(&self.machine, &mut self.threads);
    }

    /// Translate `virt_addr` in the running thread's address space,
    /// faulting the page in if needed, wait out any transfer still
    /// pinning the frame, and note the access for the LRU ordering.
    pub fn translate(&mut self, virt_addr: usize) -> usize {
        let current = self.cpu.current().expect("translation with no running thread");
        let space = self
            .threads
            .get(current)
            .space
            .expect("translation for a thread with no address space");

        let page_size = self.machine.page_size();
        let faults_before = self.machine.stats.num_page_faults;
        let mut wait = FaultWait { spins: 0 };
        let phys = self.memory.trans_addr(
            &mut self.machine,
            self.swap_disk.as_mut(),
            &mut self.spaces,
            &mut wait,
            space,
            virt_addr,
            false,
        );
        if self.machine.stats.num_page_faults > faults_before {
            // Fault resolution is kernel work, not part of the thread's
            // user burst.
            self.machine.stats.advance_system(1);
        }

        // The scan can return a frame an eviction still has pinned.
        let frame = phys / page_size;
        self.memory.check_lock(&mut wait, frame);
        self.memory.update_lru_stack(frame);
        phys
    }

    /// Populate one page of `space` with `image` through the load-time
    /// paging path, as an address-space loader would.
    pub fn load_page(&mut self, space: SpaceId, vpn: usize, image: &[u8]) {
        assert_eq!(
            image.len(),
            self.machine.page_size(),
            "page image must be exactly one page"
        );
        let frame = self.memory.acquire_page(
            &mut self.machine,
            self.swap_disk.as_mut(),
            &mut self.spaces,
            space,
            vpn,
            true,
        );
        self.machine.memory.frame_mut(frame).copy_from_slice(image);
        self.spaces.get_mut(space).update_phys_page(vpn, frame);
        self.machine.stats.advance_system(1);
    }

    /// Release every slot in either tier holding page `vpn` of `space`.
    pub fn release_page(&mut self, space: SpaceId, vpn: usize) {
        self.memory.release_page(space, vpn);
    }

    /// Whether the machine has halted (the last thread finished).
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// The simulated machine.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Mutable access to the simulated machine.
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The memory manager.
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// The thread registry.
    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    /// The address-space registry.
    pub fn spaces(&self) -> &SpaceTable {
        &self.spaces
    }

    /// The CPU: current thread and dispatch trace.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }
}

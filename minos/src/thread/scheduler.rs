//! Thread scheduler.
//!
//! The scheduler decides which thread holds the CPU next and performs the
//! dispatch. It keeps four pieces of state: the ready list, the sleep
//! list, the per-thread CPU-burst records, and the deferred-destruction
//! slot for the one thread that may be awaiting cleanup after finishing.
//!
//! Every operation here assumes interrupts are already disabled — on a
//! uniprocessor that *is* the mutual exclusion, and each entry point
//! asserts it. Locks cannot be used instead: waiting on a busy lock would
//! route right back through [`Scheduler::find_next_to_run`] and loop
//! forever.
//!
//! ## Policies
//!
//! The ordering discipline of the ready list is fixed at construction by
//! [`SchedPolicy`]:
//!
//! - [`SchedPolicy::Fcfs`] and [`SchedPolicy::RoundRobin`] keep the list
//!   in insertion order. Round robin differs only in that the external
//!   timer requeues the running thread when its quantum expires; the
//!   scheduler itself exposes nothing beyond [`Scheduler::ready_to_run`]
//!   for that.
//! - [`SchedPolicy::Nsjf`] and [`SchedPolicy::Sjf`] keep the list sorted
//!   ascending by *remaining estimated burst*, ties broken by insertion
//!   order. Preemption under `Sjf` is likewise driven from outside, by
//!   callers comparing the newcomer's estimate against the running
//!   thread's.
//!
//! ## Burst estimation
//!
//! Each thread carries a [`BurstRecord`]: the exponentially-weighted
//! estimate of its next CPU burst, and the ticks accumulated in the
//! current burst so far. The record is closed out by [`Scheduler::account`]
//! exactly when the thread's CPU residency ends — on sleep or on finish —
//! folding the finished burst into the estimate with smoothing factor
//! [`RATE`].

use super::{Cpu, ThreadId, ThreadStatus, ThreadTable};
use crate::mm::addrspace::SpaceTable;
use charon::{Level, Machine};
use log::{debug, trace};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Smoothing factor of the burst estimate: the weight given to the burst
/// that just finished, the remainder going to the running history.
pub const RATE: f64 = 0.5;

/// The scheduling policy, fixed for the lifetime of a scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedPolicy {
    /// First come, first served. No preemption.
    Fcfs,
    /// FIFO queue with timer-driven requeueing of the running thread.
    RoundRobin,
    /// Shortest job first, non-preemptive: the estimate is consulted only
    /// at dispatch time.
    Nsjf,
    /// Shortest job first, preemptive: a newcomer with a strictly shorter
    /// remaining estimate takes the CPU from the running thread.
    Sjf,
}

impl SchedPolicy {
    /// Whether the ready list is kept sorted by remaining estimated burst.
    pub fn sorts_by_burst(&self) -> bool {
        matches!(self, SchedPolicy::Nsjf | SchedPolicy::Sjf)
    }
}

/// Per-thread CPU-burst accounting.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct BurstRecord {
    /// Exponentially-weighted estimate of the next burst length, in ticks.
    pub hist_burst: u64,
    /// Ticks accumulated in the current burst so far.
    pub new_burst: u64,
}

/// A sleeping thread and the ticks left until it wakes.
struct Sleeper {
    thread: ThreadId,
    ticks_left: u64,
}

/// The thread dispatcher: ready list, sleep list, burst records, and the
/// deferred-destruction slot.
pub struct Scheduler {
    policy: SchedPolicy,
    /// Threads that are ready to run but not running. FIFO under
    /// FCFS/round-robin, sorted by remaining estimated burst under
    /// NSJF/SJF.
    ready: VecDeque<ThreadId>,
    /// Sleeping threads, sorted ascending by ticks left; ties keep
    /// insertion order.
    sleeping: VecDeque<Sleeper>,
    /// Burst accounting per thread, keyed by identity.
    bursts: BTreeMap<ThreadId, BurstRecord>,
    /// The finished thread to be destroyed by the next thread that runs.
    to_be_destroyed: Option<ThreadId>,
    /// User tick counter observed at the start of the running thread's
    /// current CPU slice.
    start_ticks: u64,
}

impl Scheduler {
    /// A scheduler with empty lists, dispatching under `policy`.
    pub fn new(policy: SchedPolicy) -> Self {
        Scheduler {
            policy,
            ready: VecDeque::new(),
            sleeping: VecDeque::new(),
            bursts: BTreeMap::new(),
            to_be_destroyed: None,
            start_ticks: 0,
        }
    }

    /// The policy this scheduler dispatches under.
    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    fn assert_int_off(mch: &Machine) {
        assert_eq!(
            mch.interrupt.level(),
            Level::Off,
            "scheduler entered with interrupts enabled"
        );
    }

    /// Mark `thread` ready and put it on the ready list.
    ///
    /// Installs a zeroed [`BurstRecord`] the first time a thread is
    /// admitted. Interrupts must be disabled.
    pub fn ready_to_run(&mut self, mch: &Machine, threads: &mut ThreadTable, thread: ThreadId) {
        Self::assert_int_off(mch);
        debug!(
            "putting thread {} on ready list",
            threads.get(thread).name()
        );

        threads.get_mut(thread).set_status(ThreadStatus::Ready);
        self.bursts.entry(thread).or_default();

        if self.policy.sorts_by_burst() {
            let key = self.rest_burst_time(thread);
            // Insert after every equal key so ties stay in arrival order.
            let pos = self
                .ready
                .partition_point(|&t| self.rest_burst_time(t) <= key);
            self.ready.insert(pos, thread);
        } else {
            self.ready.push_back(thread);
        }
    }

    /// Remove and return the next thread to dispatch, or `None` if the
    /// ready list is empty. Interrupts must be disabled.
    pub fn find_next_to_run(&mut self, mch: &Machine) -> Option<ThreadId> {
        Self::assert_int_off(mch);
        self.ready.pop_front()
    }

    /// The thread the next dispatch would pick, without removing it.
    pub fn ready_head(&self) -> Option<ThreadId> {
        self.ready.front().copied()
    }

    /// Dispatch the CPU to `next`.
    ///
    /// The outgoing thread must already be where it belongs — requeued by
    /// a yielding caller, inserted in the sleep list by
    /// [`Scheduler::set_to_sleep`], or nowhere at all when `finishing`.
    ///
    /// With `finishing` set, the outgoing thread is finished: its closing
    /// burst is accounted and it is parked in the deferred-destruction
    /// slot, to be freed once control is off its stack. The slot must be
    /// empty; two unburied carcasses cannot exist.
    ///
    /// The switch itself saves the outgoing thread's user context, checks
    /// its stack sentinel, and hands the CPU over. What follows the switch
    /// belongs to the incoming thread: it buries any parked carcass and
    /// restores its own user context. Interrupts must be disabled and stay
    /// disabled throughout.
    pub fn run(
        &mut self,
        mch: &mut Machine,
        threads: &mut ThreadTable,
        spaces: &mut SpaceTable,
        cpu: &mut Cpu,
        next: ThreadId,
        finishing: bool,
    ) {
        Self::assert_int_off(mch);
        let old = cpu.current().expect("dispatch with no running thread");

        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "a finished thread is already awaiting destruction"
            );
            self.account(mch, old);
            threads.get_mut(old).set_status(ThreadStatus::Zombie);
            self.to_be_destroyed = Some(old);
        }

        if let Some(space) = threads.get(old).space {
            threads.get_mut(old).save_user_state(mch);
            spaces.get(space).save_state(mch);
        }
        threads.get(old).check_overflow();

        cpu.set_current(Some(next));
        threads.get_mut(next).set_status(ThreadStatus::Running);
        self.start_ticks = mch.stats.user_ticks;

        debug!(
            "switching from {} to {}",
            threads.get(old).name(),
            threads.get(next).name()
        );
        cpu.switch_stacks(old, next);

        // From here on we are running on the incoming thread's stack.
        Self::assert_int_off(mch);
        self.check_to_be_destroyed(threads);
        if let Some(space) = threads.get(next).space {
            threads.get(next).restore_user_state(mch);
            spaces.get(space).restore_state(mch);
        }
    }

    /// Destroy the thread parked by a finishing dispatch, if any.
    ///
    /// A thread cannot free itself while still executing on its own stack,
    /// so the *next* thread to run buries it from here.
    pub fn check_to_be_destroyed(&mut self, threads: &mut ThreadTable) {
        if let Some(id) = self.to_be_destroyed.take() {
            let th = threads.remove(id);
            debug!("destroying finished thread {}", th.name());
        }
    }

    /// The thread currently awaiting deferred destruction, if any.
    pub fn to_be_destroyed(&self) -> Option<ThreadId> {
        self.to_be_destroyed
    }

    /// Put `thread` (the running thread) to sleep for `sleep_ticks` timer
    /// ticks.
    ///
    /// Closes out the thread's burst, inserts it into the sleep list in
    /// ascending order of remaining sleep time, and marks it sleeping. The
    /// caller completes the cooperative yield by dispatching another
    /// thread. Interrupts must be disabled and the duration positive.
    pub fn set_to_sleep(
        &mut self,
        mch: &Machine,
        threads: &mut ThreadTable,
        thread: ThreadId,
        sleep_ticks: u64,
    ) {
        Self::assert_int_off(mch);
        assert!(sleep_ticks > 0, "sleep duration must be positive");

        self.account(mch, thread);

        let pos = self
            .sleeping
            .partition_point(|s| s.ticks_left <= sleep_ticks);
        self.sleeping.insert(
            pos,
            Sleeper {
                thread,
                ticks_left: sleep_ticks,
            },
        );
        threads.get_mut(thread).set_status(ThreadStatus::Sleeping);
        debug!(
            "thread {} sleeping for {} ticks",
            threads.get(thread).name(),
            sleep_ticks
        );
    }

    /// One timer tick for the sleep list: decrement every sleeper, then
    /// wake the ones whose countdown reached zero.
    ///
    /// The list is sorted, so the drain stops at the first entry still
    /// counting; wake-ups therefore happen in ascending sleep-time order,
    /// then in arrival order. Interrupts must be disabled.
    pub fn alarm_ticks(&mut self, mch: &Machine, threads: &mut ThreadTable) {
        Self::assert_int_off(mch);

        for sleeper in self.sleeping.iter_mut() {
            sleeper.ticks_left -= 1;
        }
        while let Some(front) = self.sleeping.front() {
            if front.ticks_left > 0 {
                break;
            }
            let sleeper = self.sleeping.pop_front().unwrap();
            self.ready_to_run(mch, threads, sleeper.thread);
        }
    }

    /// Whether no thread is sleeping.
    pub fn no_one_sleeping(&self) -> bool {
        self.sleeping.is_empty()
    }

    /// Remaining estimated burst of `thread`: the estimate minus what the
    /// current burst has already consumed, floored at zero. Zero for a
    /// thread with no record yet.
    pub fn rest_burst_time(&self, thread: ThreadId) -> u64 {
        self.bursts
            .get(&thread)
            .map(|r| r.hist_burst.saturating_sub(r.new_burst))
            .unwrap_or(0)
    }

    /// Fold the ticks of the running slice so far into `thread`'s current
    /// burst and restart the slice clock.
    ///
    /// `thread` must be the running thread; the slice is measured against
    /// the machine's user tick counter.
    pub fn accum_new_burst(&mut self, mch: &Machine, thread: ThreadId) {
        let now = mch.stats.user_ticks;
        let rec = self.bursts.entry(thread).or_default();
        rec.new_burst += now - self.start_ticks;
        self.start_ticks = now;
    }

    /// Close out the running thread's burst: accumulate the final slice,
    /// fold the burst into the estimate, and reset.
    ///
    /// Invoked exactly when a thread's CPU residency ends — on sleep entry
    /// or when finishing.
    pub fn account(&mut self, mch: &Machine, thread: ThreadId) {
        self.accum_new_burst(mch, thread);
        let rec = self
            .bursts
            .get_mut(&thread)
            .expect("accounting a thread with no burst record");
        let esti =
            (RATE * rec.new_burst as f64 + (1.0 - RATE) * rec.hist_burst as f64) as u64;
        trace!(
            "burst estimate: hist {} new {} -> {}",
            rec.hist_burst,
            rec.new_burst,
            esti
        );
        rec.hist_burst = esti;
        rec.new_burst = 0;
    }

    /// The burst record of `thread`, if one was ever installed.
    pub fn burst_record(&self, thread: ThreadId) -> Option<BurstRecord> {
        self.bursts.get(&thread).copied()
    }

    /// Threads on the ready list, in dispatch order.
    pub fn ready_threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.ready.iter().copied()
    }

    /// Sleeping threads and their remaining ticks, soonest first.
    pub fn sleepers(&self) -> impl Iterator<Item = (ThreadId, u64)> + '_ {
        self.sleeping.iter().map(|s| (s.thread, s.ticks_left))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy)
            .field("ready", &self.ready)
            .field(
                "sleeping",
                &self
                    .sleeping
                    .iter()
                    .map(|s| (s.thread, s.ticks_left))
                    .collect::<Vec<_>>(),
            )
            .field("to_be_destroyed", &self.to_be_destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;
    use charon::MachineConfig;

    fn machine() -> Machine {
        let mut mch = Machine::new(MachineConfig::default());
        mch.interrupt.set_level(Level::Off);
        mch
    }

    fn spawn(threads: &mut ThreadTable, name: &str) -> ThreadId {
        threads.insert(Thread::new(name))
    }

    /// Ready/sleeping membership must always match thread status.
    fn check_membership(sched: &Scheduler, threads: &ThreadTable) {
        for th in threads.iter() {
            let in_ready = sched.ready_threads().any(|t| t == th.id());
            let in_sleeping = sched.sleepers().any(|(t, _)| t == th.id());
            assert_eq!(in_ready, th.status() == ThreadStatus::Ready);
            assert_eq!(in_sleeping, th.status() == ThreadStatus::Sleeping);
        }
    }

    #[test]
    fn fcfs_keeps_insertion_order() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (t1, t2, t3) = (
            spawn(&mut threads, "t1"),
            spawn(&mut threads, "t2"),
            spawn(&mut threads, "t3"),
        );
        // Give the later arrivals smaller estimates; FCFS must ignore them.
        sched.bursts.insert(
            t3,
            BurstRecord {
                hist_burst: 1,
                new_burst: 0,
            },
        );
        for t in [t1, t2, t3] {
            sched.ready_to_run(&mch, &mut threads, t);
        }
        check_membership(&sched, &threads);

        assert_eq!(sched.find_next_to_run(&mch), Some(t1));
        assert_eq!(sched.find_next_to_run(&mch), Some(t2));
        assert_eq!(sched.find_next_to_run(&mch), Some(t3));
        assert_eq!(sched.find_next_to_run(&mch), None);
    }

    #[test]
    fn nsjf_sorts_by_estimate_with_fifo_ties() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Nsjf);

        let (t1, t2, t3) = (
            spawn(&mut threads, "t1"),
            spawn(&mut threads, "t2"),
            spawn(&mut threads, "t3"),
        );
        for (t, esti) in [(t1, 10), (t2, 5), (t3, 5)] {
            sched.bursts.insert(
                t,
                BurstRecord {
                    hist_burst: esti,
                    new_burst: 0,
                },
            );
        }
        for t in [t1, t2, t3] {
            sched.ready_to_run(&mch, &mut threads, t);
        }

        // Equal estimates dispatch in arrival order: t2 before t3.
        assert_eq!(sched.find_next_to_run(&mch), Some(t2));
        assert_eq!(sched.find_next_to_run(&mch), Some(t3));
        assert_eq!(sched.find_next_to_run(&mch), Some(t1));
    }

    #[test]
    fn sorted_ready_list_accounts_for_consumed_burst() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Sjf);

        let (a, b) = (spawn(&mut threads, "a"), spawn(&mut threads, "b"));
        // a estimates 10 but has already consumed 8; b estimates 5 whole.
        sched.bursts.insert(
            a,
            BurstRecord {
                hist_burst: 10,
                new_burst: 8,
            },
        );
        sched.bursts.insert(
            b,
            BurstRecord {
                hist_burst: 5,
                new_burst: 0,
            },
        );
        sched.ready_to_run(&mch, &mut threads, b);
        sched.ready_to_run(&mch, &mut threads, a);

        assert_eq!(sched.rest_burst_time(a), 2);
        assert_eq!(sched.find_next_to_run(&mch), Some(a));
        assert_eq!(sched.find_next_to_run(&mch), Some(b));
    }

    #[test]
    fn rest_burst_time_floors_at_zero() {
        let mut sched = Scheduler::new(SchedPolicy::Sjf);
        let t = Thread::new("t").id();
        sched.bursts.insert(
            t,
            BurstRecord {
                hist_burst: 3,
                new_burst: 7,
            },
        );
        assert_eq!(sched.rest_burst_time(t), 0);
        // Unknown threads estimate to zero as well.
        assert_eq!(sched.rest_burst_time(Thread::new("u").id()), 0);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn ready_to_run_requires_interrupts_off() {
        let mch = Machine::new(MachineConfig::default());
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);
        let t = spawn(&mut threads, "t");
        sched.ready_to_run(&mch, &mut threads, t);
    }

    #[test]
    fn sleep_then_alarm_wakes_in_order() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (a, b) = (spawn(&mut threads, "a"), spawn(&mut threads, "b"));
        sched.set_to_sleep(&mch, &mut threads, a, 5);
        sched.set_to_sleep(&mch, &mut threads, b, 3);
        check_membership(&sched, &threads);

        for _ in 0..3 {
            sched.alarm_ticks(&mch, &mut threads);
        }
        // The 3-tick sleeper is ready; the 5-tick sleeper has 2 left.
        assert_eq!(threads.get(b).status(), ThreadStatus::Ready);
        assert_eq!(threads.get(a).status(), ThreadStatus::Sleeping);
        assert_eq!(sched.sleepers().collect::<Vec<_>>(), vec![(a, 2)]);
        check_membership(&sched, &threads);

        for _ in 0..2 {
            sched.alarm_ticks(&mch, &mut threads);
        }
        assert_eq!(threads.get(a).status(), ThreadStatus::Ready);
        assert!(sched.no_one_sleeping());
        check_membership(&sched, &threads);
    }

    #[test]
    fn equal_sleep_times_wake_in_arrival_order() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (a, b, c) = (
            spawn(&mut threads, "a"),
            spawn(&mut threads, "b"),
            spawn(&mut threads, "c"),
        );
        sched.set_to_sleep(&mch, &mut threads, a, 2);
        sched.set_to_sleep(&mch, &mut threads, b, 2);
        sched.set_to_sleep(&mch, &mut threads, c, 1);

        sched.alarm_ticks(&mch, &mut threads);
        sched.alarm_ticks(&mch, &mut threads);
        let order: Vec<_> = sched.ready_threads().collect();
        assert_eq!(order, vec![c, a, b]);
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn zero_sleep_is_rejected() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);
        let t = spawn(&mut threads, "t");
        sched.set_to_sleep(&mch, &mut threads, t, 0);
    }

    #[test]
    fn account_halves_toward_new_burst() {
        let mut mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Nsjf);
        let t = spawn(&mut threads, "t");
        sched.ready_to_run(&mch, &mut threads, t);

        // Run 8 user ticks, then account (sleep entry).
        mch.stats.advance_user(8);
        sched.account(&mch, t);
        assert_eq!(
            sched.burst_record(t).unwrap(),
            BurstRecord {
                hist_burst: 4,
                new_burst: 0
            }
        );

        // Run 4 more, account again: (0.5 * 4 + 0.5 * 4) = 4.
        mch.stats.advance_user(4);
        sched.account(&mch, t);
        assert_eq!(
            sched.burst_record(t).unwrap(),
            BurstRecord {
                hist_burst: 4,
                new_burst: 0
            }
        );
    }

    #[test]
    fn accum_new_burst_restarts_the_slice_clock() {
        let mut mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Sjf);
        let t = spawn(&mut threads, "t");
        sched.ready_to_run(&mch, &mut threads, t);

        mch.stats.advance_user(3);
        sched.accum_new_burst(&mch, t);
        assert_eq!(sched.burst_record(t).unwrap().new_burst, 3);

        // No further user ticks: accumulating again adds nothing.
        sched.accum_new_burst(&mch, t);
        assert_eq!(sched.burst_record(t).unwrap().new_burst, 3);
    }

    #[test]
    fn dispatch_switches_and_requeues_via_caller() {
        let mut mch = machine();
        let mut threads = ThreadTable::new();
        let mut spaces = SpaceTable::new();
        let mut cpu = Cpu::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (t1, t2) = (spawn(&mut threads, "t1"), spawn(&mut threads, "t2"));
        cpu.set_current(Some(t1));
        threads.get_mut(t1).set_status(ThreadStatus::Running);
        sched.ready_to_run(&mch, &mut threads, t2);

        // t1 yields: requeue first, then dispatch whatever is at the head.
        sched.ready_to_run(&mch, &mut threads, t1);
        let next = sched.find_next_to_run(&mch).unwrap();
        assert_eq!(next, t2);
        sched.run(&mut mch, &mut threads, &mut spaces, &mut cpu, next, false);

        assert_eq!(cpu.current(), Some(t2));
        assert_eq!(threads.get(t2).status(), ThreadStatus::Running);
        assert_eq!(threads.get(t1).status(), ThreadStatus::Ready);
        assert_eq!(cpu.switch_trace(), &[(t1, t2)]);
        check_membership(&sched, &threads);
    }

    #[test]
    fn finishing_thread_is_destroyed_by_successor() {
        let mut mch = machine();
        let mut threads = ThreadTable::new();
        let mut spaces = SpaceTable::new();
        let mut cpu = Cpu::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (t1, t2) = (spawn(&mut threads, "t1"), spawn(&mut threads, "t2"));
        cpu.set_current(Some(t1));
        threads.get_mut(t1).set_status(ThreadStatus::Running);
        sched.ready_to_run(&mch, &mut threads, t2);

        let next = sched.find_next_to_run(&mch).unwrap();
        sched.run(&mut mch, &mut threads, &mut spaces, &mut cpu, next, true);

        // The successor buried the carcass during its own dispatch.
        assert!(!threads.contains(t1));
        assert_eq!(sched.to_be_destroyed(), None);
        assert_eq!(cpu.current(), Some(t2));
    }

    #[test]
    #[should_panic(expected = "already awaiting destruction")]
    fn two_unburied_carcasses_are_fatal() {
        let mut mch = machine();
        let mut threads = ThreadTable::new();
        let mut spaces = SpaceTable::new();
        let mut cpu = Cpu::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        let (t1, t2, t3) = (
            spawn(&mut threads, "t1"),
            spawn(&mut threads, "t2"),
            spawn(&mut threads, "t3"),
        );
        cpu.set_current(Some(t1));
        threads.get_mut(t1).set_status(ThreadStatus::Running);
        sched.to_be_destroyed = Some(t3);
        sched.run(&mut mch, &mut threads, &mut spaces, &mut cpu, t2, true);
    }

    #[test]
    fn alarm_wakes_shorter_sleep_no_later() {
        let mch = machine();
        let mut threads = ThreadTable::new();
        let mut sched = Scheduler::new(SchedPolicy::Fcfs);

        // B sleeps first with the longer duration, A after with the
        // shorter one; A must still wake first.
        let (a, b) = (spawn(&mut threads, "a"), spawn(&mut threads, "b"));
        sched.set_to_sleep(&mch, &mut threads, b, 7);
        sched.set_to_sleep(&mch, &mut threads, a, 2);

        let mut wake_tick = BTreeMap::new();
        for tick in 1..=7u64 {
            sched.alarm_ticks(&mch, &mut threads);
            for t in [a, b] {
                if threads.get(t).status() == ThreadStatus::Ready {
                    wake_tick.entry(t).or_insert(tick);
                }
            }
        }
        assert_eq!(wake_tick[&a], 2);
        assert_eq!(wake_tick[&b], 7);
    }
}

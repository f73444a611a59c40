//! Demand-paged memory management.
//!
//! Physical memory is a fixed pool of frames backed by a swap area on
//! disk; at any moment a virtual page lives in exactly one of the two
//! tiers. The [`MemoryManager`] tracks both tiers with one table each,
//! resolves page faults by pulling pages back from swap, and picks
//! eviction victims by approximate LRU: frames are kept on a recency
//! stack, appended on acquisition and on use, and the victim is the
//! oldest frame not currently pinned by a transfer.
//!
//! ## Pinning
//!
//! A frame or sector with its `lock` flag set has a disk transfer in
//! flight. The flag is pinning metadata, not a blocking primitive: it is
//! raised under disabled interrupts, held across the synchronous transfer,
//! and cleared when the transfer completes. Any thread that finds a slot
//! pinned cooperatively yields and re-checks; it never proceeds against a
//! pinned slot.
//!
//! ## Failure
//!
//! Every assertion here guards a kernel invariant — a page missing from
//! both tiers, an exhausted swap area, a double release. Violations are
//! fatal; there is no partial-state rollback.

pub mod addrspace;

use crate::thread::Yield;
use addrspace::{SpaceId, SpaceTable};
use charon::{Machine, SwapDisk};
use log::debug;
use std::collections::VecDeque;

/// Bookkeeping for one physical frame or one swap sector.
///
/// The same shape serves both tiers: `valid` means the slot is *free*;
/// an in-use slot records which `(space, vpn)` it holds.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfoEntry {
    /// The slot is free.
    pub valid: bool,
    /// A disk transfer against this slot is in flight; the slot is
    /// pinned.
    pub lock: bool,
    /// Owning address space of the held page, when in use.
    pub space: Option<SpaceId>,
    /// Virtual page number of the held page, when in use.
    pub vpn: usize,
}

impl FrameInfoEntry {
    fn free() -> Self {
        FrameInfoEntry {
            valid: true,
            lock: false,
            space: None,
            vpn: 0,
        }
    }

    /// Whether this slot is in use and holds `(space, vpn)`.
    pub fn holds(&self, space: SpaceId, vpn: usize) -> bool {
        !self.valid && self.space == Some(space) && self.vpn == vpn
    }
}

/// The frame and swap tables plus the LRU recency stack.
pub struct MemoryManager {
    frame_table: Vec<FrameInfoEntry>,
    swap_table: Vec<FrameInfoEntry>,
    /// In-use frame indices, least recently acquired or used at the
    /// front.
    lru_stack: VecDeque<usize>,
}

impl MemoryManager {
    /// A manager for `num_phys_pages` frames and `num_sectors` swap
    /// sectors, all free.
    pub fn new(num_phys_pages: usize, num_sectors: usize) -> Self {
        MemoryManager {
            frame_table: vec![FrameInfoEntry::free(); num_phys_pages],
            swap_table: vec![FrameInfoEntry::free(); num_sectors],
            lru_stack: VecDeque::new(),
        }
    }

    /// Translate `virt_addr` in `space` to a physical address, faulting
    /// the page in from swap if it is not resident.
    ///
    /// `space` must be the running thread's address space.
    pub fn trans_addr(
        &mut self,
        mch: &mut Machine,
        disk: &mut dyn SwapDisk,
        spaces: &mut SpaceTable,
        yielder: &mut dyn Yield,
        space: SpaceId,
        virt_addr: usize,
        load_time: bool,
    ) -> usize {
        let page_size = mch.page_size();
        let vpn = virt_addr / page_size;
        let offset = virt_addr % page_size;

        let frame = match (0..self.frame_table.len())
            .find(|&i| self.frame_table[i].holds(space, vpn))
        {
            Some(frame) => frame,
            // Not resident, so the page is out on the swap disk.
            None => self.page_fault_handler(mch, disk, spaces, yielder, space, vpn, load_time),
        };
        frame * page_size + offset
    }

    /// Claim a frame for `(space, vpn)` and return its index.
    ///
    /// Free unpinned frames are claimed in ascending index order; when
    /// none exists, the LRU victim is evicted to swap first. Either way
    /// the frame ends up at the back of the recency stack. The caller is
    /// responsible for filling the frame and mapping the page.
    pub fn acquire_page(
        &mut self,
        mch: &mut Machine,
        disk: &mut dyn SwapDisk,
        spaces: &mut SpaceTable,
        space: SpaceId,
        vpn: usize,
        load_time: bool,
    ) -> usize {
        for i in 0..self.frame_table.len() {
            let entry = &mut self.frame_table[i];
            if entry.valid && !entry.lock {
                entry.valid = false;
                entry.space = Some(space);
                entry.vpn = vpn;
                self.lru_stack.push_back(i);
                debug!("acquiring frame {i}");
                return i;
            }
        }

        let frame = self.kick_victim(mch, disk, spaces, load_time);
        let entry = &mut self.frame_table[frame];
        assert!(!entry.valid, "evicted frame came back free");
        entry.space = Some(space);
        entry.vpn = vpn;
        self.lru_stack.push_back(frame);
        debug!("acquiring frame {frame}");
        frame
    }

    /// Free every slot, in either tier, holding `(space, vpn)`.
    ///
    /// Both tiers are swept because the page may have migrated between
    /// them during its lifetime. Callers must ensure no transfer is in
    /// flight against the released page.
    pub fn release_page(&mut self, space: SpaceId, vpn: usize) {
        for i in 0..self.frame_table.len() {
            if self.frame_table[i].holds(space, vpn) {
                assert!(!self.frame_table[i].lock, "releasing a pinned frame");
                self.frame_table[i].valid = true;
                if let Some(pos) = self.lru_stack.iter().position(|&p| p == i) {
                    self.lru_stack.remove(pos);
                }
            }
        }
        for entry in self.swap_table.iter_mut() {
            if entry.holds(space, vpn) {
                assert!(!entry.lock, "releasing a pinned sector");
                entry.valid = true;
            }
        }
    }

    /// Resolve a fault on `vpn` of `space` (the running thread's space):
    /// find the page in the swap area, pull it into a frame, and map it.
    ///
    /// The page must be in swap — a page absent from both tiers has been
    /// lost, which is fatal. If its sector is pinned by a transfer still
    /// in flight, the fault yields until the pin clears.
    pub fn page_fault_handler(
        &mut self,
        mch: &mut Machine,
        disk: &mut dyn SwapDisk,
        spaces: &mut SpaceTable,
        yielder: &mut dyn Yield,
        vpn_space: SpaceId,
        vpn: usize,
        load_time: bool,
    ) -> usize {
        mch.stats.num_page_faults += 1;

        let sector = (0..self.swap_table.len())
            .find(|&i| self.swap_table[i].holds(vpn_space, vpn))
            .expect("page fault on a page that is not in the swap area");
        while self.swap_table[sector].lock {
            yielder.yield_now();
        }

        let frame = self.acquire_page(mch, disk, spaces, vpn_space, vpn, load_time);

        debug!("reading sector {sector} into frame {frame}");
        assert!(!self.frame_table[frame].lock);
        assert!(!self.swap_table[sector].lock);
        self.frame_table[frame].lock = true;
        self.swap_table[sector].lock = true;
        disk.read_sector(sector, mch.memory.frame_mut(frame), load_time);
        if !load_time {
            mch.stats.num_disk_reads += 1;
        }
        self.frame_table[frame].lock = false;
        self.swap_table[sector].lock = false;

        spaces.get_mut(vpn_space).update_phys_page(vpn, frame);
        self.swap_table[sector].valid = true;

        frame
    }

    /// Note a use of `page`: move it to the recently-used end of the
    /// stack. Invoked by the translation machinery on access.
    pub fn update_lru_stack(&mut self, page: usize) {
        assert!(!self.frame_table[page].valid, "touching a free frame");
        if let Some(pos) = self.lru_stack.iter().position(|&p| p == page) {
            self.lru_stack.remove(pos);
        }
        self.lru_stack.push_back(page);
    }

    /// Yield until no transfer is pinning `page`.
    pub fn check_lock(&mut self, yielder: &mut dyn Yield, page: usize) {
        while self.frame_table[page].lock {
            yielder.yield_now();
        }
        assert!(!self.frame_table[page].lock);
    }

    /// Evict the least recently used unpinned frame to the swap area and
    /// return its index.
    ///
    /// The victim's page-table mapping is invalidated and its bytes are
    /// written to a free sector; the frame entry keeps its in-use mark
    /// and the *caller* records the new occupant. Running out of swap
    /// sectors is fatal: this design assumes swap capacity is sufficient.
    fn kick_victim(
        &mut self,
        mch: &mut Machine,
        disk: &mut dyn SwapDisk,
        spaces: &mut SpaceTable,
        load_time: bool,
    ) -> usize {
        let pos = self
            .lru_stack
            .iter()
            .position(|&p| !self.frame_table[p].lock)
            .expect("every frame is pinned by a transfer");
        let victim = self.lru_stack.remove(pos).unwrap();

        let entry = self.frame_table[victim];
        assert!(!entry.lock);
        assert!(!entry.valid, "victim frame is not in use");
        let victim_space = entry.space.expect("in-use frame with no owner");
        let victim_vpn = entry.vpn;

        spaces.get_mut(victim_space).set_invalid(victim_vpn);

        let sector = (0..self.swap_table.len())
            .find(|&i| self.swap_table[i].valid && !self.swap_table[i].lock)
            .expect("swap area exhausted");
        self.swap_table[sector].valid = false;
        self.swap_table[sector].space = Some(victim_space);
        self.swap_table[sector].vpn = victim_vpn;

        debug!("writing frame {victim} to sector {sector}");
        assert!(!self.frame_table[victim].lock);
        assert!(!self.swap_table[sector].lock);
        self.frame_table[victim].lock = true;
        self.swap_table[sector].lock = true;
        disk.write_sector(sector, mch.memory.frame(victim), load_time);
        if !load_time {
            mch.stats.num_disk_writes += 1;
        }
        self.frame_table[victim].lock = false;
        self.swap_table[sector].lock = false;

        victim
    }

    /// The frame table.
    pub fn frame_table(&self) -> &[FrameInfoEntry] {
        &self.frame_table
    }

    /// The swap sector table.
    pub fn swap_table(&self) -> &[FrameInfoEntry] {
        &self.swap_table
    }

    /// In-use frames in recency order, oldest first.
    pub fn lru_stack(&self) -> impl Iterator<Item = usize> + '_ {
        self.lru_stack.iter().copied()
    }
}

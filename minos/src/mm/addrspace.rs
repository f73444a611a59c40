//! Address spaces and their software page tables.
//!
//! An address space is the per-process translation state: one
//! [`TranslationEntry`] per virtual page, saying whether the page is
//! resident and in which frame. The memory manager drives these tables —
//! mapping a page when it is brought into a frame, invalidating it when
//! the frame is stolen — and the dispatcher installs a space's
//! translations into the machine when a thread of that space takes the
//! CPU.
//!
//! Spaces are owned by a [`SpaceTable`] and referred to everywhere else by
//! [`SpaceId`] handle, the same ownership discipline the thread registry
//! uses.

use bitflags::bitflags;
use charon::Machine;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable, opaque identity of an address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SpaceId(u64);

impl SpaceId {
    /// The raw identity value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Flags of a page-table entry.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PteFlags: u8 {
        /// The page is resident; the entry's frame number is meaningful.
        const VALID = 1 << 0;
        /// Writes to the page are permitted.
        const WRITABLE = 1 << 1;
        /// The page has been referenced since the flag was last cleared.
        const USED = 1 << 2;
        /// The page has been written since it was brought in.
        const DIRTY = 1 << 3;
    }
}

/// One virtual page's translation.
#[derive(Clone, Copy, Debug)]
pub struct TranslationEntry {
    /// Physical frame holding the page. Meaningful only while
    /// [`PteFlags::VALID`] is set.
    pub frame: usize,
    /// Entry flags.
    pub flags: PteFlags,
}

impl Default for TranslationEntry {
    fn default() -> Self {
        TranslationEntry {
            frame: 0,
            flags: PteFlags::empty(),
        }
    }
}

/// A process address space: identity plus software page table.
pub struct AddrSpace {
    id: SpaceId,
    page_table: Vec<TranslationEntry>,
}

impl AddrSpace {
    /// A space of `num_pages` virtual pages, none resident, with a fresh
    /// identity.
    pub fn new(num_pages: usize) -> Self {
        static SID: AtomicU64 = AtomicU64::new(0);
        AddrSpace {
            id: SpaceId(SID.fetch_add(1, Ordering::SeqCst)),
            page_table: vec![TranslationEntry::default(); num_pages],
        }
    }

    /// This space's identity.
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Number of virtual pages.
    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// The translation of `vpn`. A vpn beyond the space is fatal.
    pub fn entry(&self, vpn: usize) -> &TranslationEntry {
        assert!(vpn < self.page_table.len(), "vpn {vpn} out of range");
        &self.page_table[vpn]
    }

    /// Whether `vpn` is currently resident in a frame.
    pub fn is_resident(&self, vpn: usize) -> bool {
        self.entry(vpn).flags.contains(PteFlags::VALID)
    }

    /// Map `vpn` to `frame` and mark the entry valid.
    ///
    /// Invoked by the memory manager once the page's bytes are in the
    /// frame.
    pub fn update_phys_page(&mut self, vpn: usize, frame: usize) {
        assert!(vpn < self.page_table.len(), "vpn {vpn} out of range");
        let entry = &mut self.page_table[vpn];
        entry.frame = frame;
        entry.flags.insert(PteFlags::VALID);
    }

    /// Invalidate `vpn`'s mapping. Invoked when the backing frame is
    /// stolen for eviction.
    pub fn set_invalid(&mut self, vpn: usize) {
        assert!(vpn < self.page_table.len(), "vpn {vpn} out of range");
        self.page_table[vpn].flags.remove(PteFlags::VALID);
    }

    /// Detach this space's translations from the machine. Invoked on the
    /// outgoing thread's space at a context switch.
    pub fn save_state(&self, mch: &mut Machine) {
        if mch.active_space == Some(self.id.as_u64()) {
            mch.active_space = None;
        }
    }

    /// Install this space's translations as the machine's active ones.
    /// Invoked on the incoming thread's space at a context switch.
    pub fn restore_state(&self, mch: &mut Machine) {
        mch.active_space = Some(self.id.as_u64());
    }
}

/// The owning registry of all live address spaces.
pub struct SpaceTable {
    map: BTreeMap<SpaceId, AddrSpace>,
}

impl SpaceTable {
    /// An empty table.
    pub fn new() -> Self {
        SpaceTable {
            map: BTreeMap::new(),
        }
    }

    /// Add `space` to the table, returning its identity.
    pub fn insert(&mut self, space: AddrSpace) -> SpaceId {
        let id = space.id();
        let prev = self.map.insert(id, space);
        assert!(prev.is_none(), "space identity reused");
        id
    }

    /// Look up a live space. A dangling handle is fatal.
    pub fn get(&self, id: SpaceId) -> &AddrSpace {
        self.map.get(&id).expect("dangling space handle")
    }

    /// Mutable lookup. A dangling handle is fatal.
    pub fn get_mut(&mut self, id: SpaceId) -> &mut AddrSpace {
        self.map.get_mut(&id).expect("dangling space handle")
    }

    /// Remove (destroy) a space.
    pub fn remove(&mut self, id: SpaceId) -> AddrSpace {
        self.map.remove(&id).expect("destroying a dead space")
    }
}

impl Default for SpaceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon::MachineConfig;

    #[test]
    fn mapping_and_invalidating() {
        let mut space = AddrSpace::new(4);
        assert!(!space.is_resident(2));

        space.update_phys_page(2, 7);
        assert!(space.is_resident(2));
        assert_eq!(space.entry(2).frame, 7);

        space.set_invalid(2);
        assert!(!space.is_resident(2));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn vpn_beyond_space_is_fatal() {
        let space = AddrSpace::new(4);
        let _ = space.entry(4);
    }

    #[test]
    fn state_hooks_track_the_active_space() {
        let mut mch = Machine::new(MachineConfig::default());
        let a = AddrSpace::new(1);
        let b = AddrSpace::new(1);

        a.restore_state(&mut mch);
        assert_eq!(mch.active_space, Some(a.id().as_u64()));

        // Saving a space that is not installed changes nothing.
        b.save_state(&mut mch);
        assert_eq!(mch.active_space, Some(a.id().as_u64()));

        a.save_state(&mut mch);
        assert_eq!(mch.active_space, None);

        b.restore_state(&mut mch);
        assert_eq!(mch.active_space, Some(b.id().as_u64()));
    }
}

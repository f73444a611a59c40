//! Physical main memory.
//!
//! Main memory is a flat byte array carved into fixed-size frames. The
//! kernel addresses it only at frame granularity; byte-level layout inside
//! a frame belongs to whoever owns the page stored there.

/// The machine's physical memory: `num_frames` frames of `page_size`
/// bytes each.
pub struct MainMemory {
    page_size: usize,
    data: Vec<u8>,
}

impl MainMemory {
    /// Allocate zero-filled memory of `num_frames * page_size` bytes.
    pub fn new(page_size: usize, num_frames: usize) -> Self {
        MainMemory {
            page_size,
            data: vec![0; page_size * num_frames],
        }
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.data.len() / self.page_size
    }

    /// Read-only view of frame `index`.
    ///
    /// Panics if `index` is out of range; a bad frame index is a kernel
    /// bug, not a recoverable condition.
    pub fn frame(&self, index: usize) -> &[u8] {
        assert!(index < self.num_frames(), "frame {index} out of range");
        let start = index * self.page_size;
        &self.data[start..start + self.page_size]
    }

    /// Mutable view of frame `index`. Panics if `index` is out of range.
    pub fn frame_mut(&mut self, index: usize) -> &mut [u8] {
        assert!(index < self.num_frames(), "frame {index} out of range");
        let start = index * self.page_size;
        &mut self.data[start..start + self.page_size]
    }
}

//! Particle chain: a linked sequence of fixed-size cells exposed as a
//! contiguous logical byte stream through a seek cursor, matching the
//! `nsvc_pcl_*` chain API the original dispatcher called into. A chain here
//! is a flat `Vec` of same-size cells rather than a real linked list of
//! pool-owned nodes — allocation granularity (`chain_capacity(num_cells)`)
//! is still cell-by-cell, but nothing above this module ever follows a
//! `flink` pointer, matching the "no intrusive linked list" design note.

use crate::error::{DiscardCode, DiscardResult};

#[derive(Debug, Clone)]
pub struct PclChain {
    cell_size: usize,
    cells: Vec<Vec<u8>>,
}

impl PclChain {
    pub fn new(cell_size: usize, num_cells: usize) -> Self {
        Self {
            cell_size,
            cells: vec![vec![0u8; cell_size]; num_cells],
        }
    }

    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn capacity(&self) -> usize {
        self.cell_size * self.cells.len()
    }

    /// Capacity of a chain built from `num_cells` cells of this chain's cell
    /// size — the bounds check callers use before growing a chain.
    pub fn chain_capacity(&self, num_cells: usize) -> usize {
        self.cell_size * num_cells
    }

    pub fn read_at(&self, pos: usize, buf: &mut [u8]) -> DiscardResult<()> {
        let mut cursor = PclCursor::new(pos);
        cursor.read(self, buf)
    }

    pub fn write_at(&mut self, pos: usize, buf: &[u8]) -> DiscardResult<()> {
        let mut cursor = PclCursor::new(pos);
        cursor.write(self, buf)
    }
}

/// A seekable read/write position into a [`PclChain`]. Mirrors
/// `nsvc_pcl_chain_seek_t`: `set_seek` repositions, `read`/`write` walk
/// across cell boundaries, advancing the cursor as they go.
pub struct PclCursor {
    pos: usize,
}

impl PclCursor {
    pub fn new(pos: usize) -> Self {
        Self { pos }
    }

    pub fn set_seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read(&mut self, chain: &PclChain, buf: &mut [u8]) -> DiscardResult<()> {
        let mut written = 0;
        while written < buf.len() {
            if self.pos >= chain.capacity() {
                return Err(DiscardCode::PclOpFailed);
            }
            let cell_idx = self.pos / chain.cell_size;
            let cell_off = self.pos % chain.cell_size;
            let cell = &chain.cells[cell_idx];
            let take = (chain.cell_size - cell_off).min(buf.len() - written);
            buf[written..written + take].copy_from_slice(&cell[cell_off..cell_off + take]);
            written += take;
            self.pos += take;
        }
        Ok(())
    }

    pub fn write(&mut self, chain: &mut PclChain, buf: &[u8]) -> DiscardResult<()> {
        let mut read = 0;
        while read < buf.len() {
            if self.pos >= chain.capacity() {
                return Err(DiscardCode::PclOpFailed);
            }
            let cell_idx = self.pos / chain.cell_size;
            let cell_off = self.pos % chain.cell_size;
            let cell = &mut chain.cells[cell_idx];
            let take = (chain.cell_size - cell_off).min(buf.len() - read);
            cell[cell_off..cell_off + take].copy_from_slice(&buf[read..read + take]);
            read += take;
            self.pos += take;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_walks_across_cell_boundary() {
        let mut chain = PclChain::new(4, 3); // 12 bytes total, cells of 4
        chain.write_at(2, &[1, 2, 3, 4, 5, 6]).unwrap(); // straddles cells 0/1/2... actually 0 and 1
        let mut out = [0u8; 6];
        chain.read_at(2, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn read_past_capacity_fails() {
        let chain = PclChain::new(4, 2);
        let mut out = [0u8; 2];
        assert_eq!(
            chain.read_at(7, &mut out),
            Err(DiscardCode::PclOpFailed)
        );
    }

    #[test]
    fn chain_capacity_scales_with_cell_count() {
        let chain = PclChain::new(16, 4);
        assert_eq!(chain.capacity(), 64);
        assert_eq!(chain.chain_capacity(6), 96);
    }
}

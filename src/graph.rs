//! Graph storage: a fixed max-degree adjacency list with a per-row spin
//! lock for concurrent edits during build.
//!
//! There are no node objects and no cyclic ownership: only `(row, offset)`
//! indices into one flat buffer.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// A lightweight spin lock suitable for the low-contention, few-nanosecond
/// critical sections of a per-row graph edit. Not reentrant.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false) }
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn lock(&self) {
        while !self.try_lock() {
            std::hint::spin_loop();
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Run `f` while holding the lock.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        let r = f();
        self.unlock();
        r
    }
}

/// Fixed-stride adjacency storage: row `i` occupies `(max_degree + 1)`
/// `u32` slots — one count prefix followed by up to `max_degree` neighbor
/// ids — plus a dirty flag used during build to mark rows that received
/// new candidates not yet pruned.
pub struct Graph {
    max_degree: usize,
    num_nodes: usize,
    adjacency: Vec<u32>,
    locks: Vec<SpinLock>,
    dirty: Vec<AtomicBool>,
}

impl Graph {
    pub fn new(num_nodes: usize, max_degree: usize) -> Self {
        let stride = max_degree + 1;
        Self {
            max_degree,
            num_nodes,
            adjacency: vec![0u32; num_nodes * stride],
            locks: (0..num_nodes).map(|_| SpinLock::new()).collect(),
            dirty: (0..num_nodes).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Append `additional` empty rows, used by dynamic insert (§4.7) to
    /// extend the graph when no tombstoned slot is being reused.
    pub fn grow(&mut self, additional: usize) {
        let stride = self.stride();
        self.num_nodes += additional;
        self.adjacency.resize(self.num_nodes * stride, 0);
        self.locks.extend((0..additional).map(|_| SpinLock::new()));
        self.dirty.extend((0..additional).map(|_| AtomicBool::new(false)));
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    fn stride(&self) -> usize {
        self.max_degree + 1
    }

    fn check_bounds(&self, i: usize) -> Result<()> {
        if i >= self.num_nodes {
            return Err(Error::OutOfBounds { index: i, size: self.num_nodes });
        }
        Ok(())
    }

    /// Read-only view of `i`'s out-neighbors. Safe to call without holding
    /// the per-row lock once the graph is in steady state (post-build, or
    /// between build rounds with no concurrent writer on this row).
    pub fn get_neighbors(&self, i: usize) -> Result<&[u32]> {
        self.check_bounds(i)?;
        let stride = self.stride();
        let base = i * stride;
        let count = self.adjacency[base] as usize;
        Ok(&self.adjacency[base + 1..base + 1 + count])
    }

    /// Replace `i`'s neighbor list under its per-row spin lock.
    pub fn set_neighbors(&mut self, i: usize, list: &[u32]) -> Result<()> {
        self.check_bounds(i)?;
        if list.len() > self.max_degree {
            return Err(Error::invalid_input(format!(
                "neighbor list length {} exceeds max degree {}",
                list.len(),
                self.max_degree
            )));
        }
        debug_assert!(!list.contains(&(i as u32)), "self-loop on node {i}");
        debug_assert!(
            { let mut sorted = list.to_vec(); sorted.sort_unstable(); sorted.windows(2).all(|w| w[0] != w[1]) },
            "duplicate neighbor in list for node {i}"
        );
        let stride = self.stride();
        let base = i * stride;
        self.locks[i].lock();
        self.adjacency[base] = list.len() as u32;
        self.adjacency[base + 1..base + 1 + list.len()].copy_from_slice(list);
        self.locks[i].unlock();
        self.dirty[i].store(true, Ordering::Release);
        Ok(())
    }

    /// Same as [`Self::set_neighbors`] but usable through a shared
    /// reference: the per-row lock plus interior access to the raw slice
    /// is what actually guards the row, so concurrent `set_neighbors_shared`
    /// calls on *different* rows never contend. Concurrent calls on the
    /// *same* row serialize through that row's lock.
    ///
    /// # Safety
    /// Callers must not call this concurrently with [`Self::get_neighbors`]
    /// on the same row without external synchronization, since
    /// `get_neighbors` takes `&self` and does not itself take the lock
    /// (post-build reads are assumed to be free of concurrent writers).
    pub unsafe fn set_neighbors_shared(&self, i: usize, list: &[u32]) -> Result<()> {
        self.check_bounds(i)?;
        if list.len() > self.max_degree {
            return Err(Error::invalid_input(format!(
                "neighbor list length {} exceeds max degree {}",
                list.len(),
                self.max_degree
            )));
        }
        let stride = self.stride();
        let base = i * stride;
        self.locks[i].lock();
        let ptr = self.adjacency.as_ptr() as *mut u32;
        std::ptr::write(ptr.add(base), list.len() as u32);
        std::ptr::copy_nonoverlapping(list.as_ptr(), ptr.add(base + 1), list.len());
        self.locks[i].unlock();
        self.dirty[i].store(true, Ordering::Release);
        Ok(())
    }

    /// Read-modify-write `i`'s neighbor list under its per-row lock, so
    /// concurrent builders extending `i`'s edge list (e.g. two other nodes
    /// both accepting `i` as a neighbor in the same build round) never
    /// lose an update to an interleaved read.
    ///
    /// # Safety
    /// Same contract as [`Self::set_neighbors_shared`]: callers must not
    /// call this concurrently with [`Self::get_neighbors`] on the same row
    /// without external synchronization.
    pub unsafe fn edit_neighbors_locked(
        &self,
        i: usize,
        edit: impl FnOnce(&[u32]) -> Vec<u32>,
    ) -> Result<()> {
        self.check_bounds(i)?;
        let stride = self.stride();
        let base = i * stride;
        self.locks[i].lock();
        let current_len = self.adjacency[base] as usize;
        let current = &self.adjacency[base + 1..base + 1 + current_len];
        let updated = edit(current);
        if updated.len() > self.max_degree {
            self.locks[i].unlock();
            return Err(Error::invalid_input(format!(
                "neighbor list length {} exceeds max degree {}",
                updated.len(),
                self.max_degree
            )));
        }
        let ptr = self.adjacency.as_ptr() as *mut u32;
        std::ptr::write(ptr.add(base), updated.len() as u32);
        std::ptr::copy_nonoverlapping(updated.as_ptr(), ptr.add(base + 1), updated.len());
        self.locks[i].unlock();
        self.dirty[i].store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_dirty(&self, i: usize) -> bool {
        self.dirty[i].load(Ordering::Acquire)
    }

    pub fn clear_dirty(&self, i: usize) {
        self.dirty[i].store(false, Ordering::Release);
    }

    pub fn clear_all_dirty(&self) {
        for d in &self.dirty {
            d.store(false, Ordering::Release);
        }
    }

    /// Out-degree of row `i`.
    pub fn degree(&self, i: usize) -> usize {
        let stride = self.stride();
        self.adjacency[i * stride] as usize
    }

    /// The raw count-prefixed adjacency buffer, for the save/load
    /// framework's binary blob encoding.
    pub fn raw_adjacency(&self) -> &[u32] {
        &self.adjacency
    }

    /// Reconstruct a graph from a raw count-prefixed adjacency buffer
    /// (the save/load framework's inverse of [`Self::raw_adjacency`]).
    pub fn from_raw_parts(num_nodes: usize, max_degree: usize, adjacency: Vec<u32>) -> Result<Self> {
        let stride = max_degree + 1;
        if adjacency.len() != num_nodes * stride {
            return Err(Error::invalid_input(format!(
                "adjacency buffer length {} does not match num_nodes ({num_nodes}) * stride ({stride})",
                adjacency.len()
            )));
        }
        Ok(Self {
            max_degree,
            num_nodes,
            adjacency,
            locks: (0..num_nodes).map(|_| SpinLock::new()).collect(),
            dirty: (0..num_nodes).map(|_| AtomicBool::new(false)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_neighbors_roundtrips() {
        let mut g = Graph::new(4, 2);
        g.set_neighbors(0, &[1, 2]).unwrap();
        assert_eq!(g.get_neighbors(0).unwrap(), &[1, 2]);
        assert_eq!(g.degree(0), 2);
    }

    #[test]
    fn degree_never_exceeds_max() {
        let mut g = Graph::new(4, 2);
        let err = g.set_neighbors(0, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn out_of_bounds_row_errors() {
        let g = Graph::new(4, 2);
        assert!(matches!(g.get_neighbors(10), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn dirty_flag_tracks_writes() {
        let mut g = Graph::new(2, 2);
        assert!(!g.is_dirty(0));
        g.set_neighbors(0, &[1]).unwrap();
        assert!(g.is_dirty(0));
        g.clear_dirty(0);
        assert!(!g.is_dirty(0));
    }

    #[test]
    fn edit_neighbors_locked_appends_under_lock() {
        let g = Graph::new(4, 4);
        unsafe {
            g.edit_neighbors_locked(0, |cur| {
                let mut v = cur.to_vec();
                v.push(1);
                v
            })
            .unwrap();
            g.edit_neighbors_locked(0, |cur| {
                let mut v = cur.to_vec();
                v.push(2);
                v
            })
            .unwrap();
        }
        assert_eq!(g.get_neighbors(0).unwrap(), &[1, 2]);
    }

    #[test]
    fn grow_preserves_existing_rows_and_adds_empty_ones() {
        let mut g = Graph::new(2, 4);
        g.set_neighbors(0, &[1]).unwrap();
        g.grow(2);
        assert_eq!(g.num_nodes(), 4);
        assert_eq!(g.get_neighbors(0).unwrap(), &[1]);
        assert_eq!(g.get_neighbors(2).unwrap(), &[] as &[u32]);
        g.set_neighbors(3, &[0]).unwrap();
        assert_eq!(g.get_neighbors(3).unwrap(), &[0]);
    }

    #[test]
    fn spinlock_excludes_concurrent_holders() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(lock.try_lock());
    }
}

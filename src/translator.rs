//! Bidirectional external<->internal id mapping.
//!
//! The two maps are bundled behind this one type and never exposed
//! independently — every mutation goes through `insert`/`delete_*`/
//! `remap_internal`, each of which keeps both maps in sync or leaves the
//! translator untouched on failure.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::narrow::narrow;

pub type ExternalId = u64;
pub type InternalId = u32;

#[derive(Debug, Clone, Default)]
pub struct IdTranslator {
    external_to_internal: HashMap<ExternalId, InternalId>,
    internal_to_external: HashMap<InternalId, ExternalId>,
}

impl IdTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity translation over `[0, n)`.
    pub fn identity(n: usize) -> Self {
        let mut t = Self::new();
        let ids: Vec<u64> = (0..n as u64).collect();
        let internal: Vec<u32> = (0..n as u32).collect();
        t.insert(&ids, &internal, false).expect("identity ids are unique by construction");
        t
    }

    pub fn size(&self) -> usize {
        debug_assert_eq!(self.external_to_internal.len(), self.internal_to_external.len());
        self.external_to_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn has_external(&self, e: ExternalId) -> bool {
        self.external_to_internal.contains_key(&e)
    }

    pub fn has_internal(&self, i: InternalId) -> bool {
        self.internal_to_external.contains_key(&i)
    }

    pub fn get_internal(&self, e: ExternalId) -> Result<InternalId> {
        self.external_to_internal.get(&e).copied().ok_or(Error::UnknownId(e))
    }

    pub fn get_external(&self, i: InternalId) -> Result<ExternalId> {
        self.internal_to_external.get(&i).copied().ok_or(Error::UnknownId(i as u64))
    }

    /// Bulk-register `(external[k], internal[k])` pairs. When `check` is
    /// true, verifies both slices are internally unique and absent from
    /// the existing maps before mutating anything; on any failure the
    /// translator is left unchanged.
    pub fn insert(&mut self, external: &[ExternalId], internal: &[InternalId], check: bool) -> Result<()> {
        if external.len() != internal.len() {
            return Err(Error::invalid_input(format!(
                "external ids length {} != internal ids length {}",
                external.len(),
                internal.len()
            )));
        }

        if check {
            all_unique(external).map_err(|e| Error::DuplicateId(e))?;
            all_unique(internal).map_err(|i| Error::DuplicateId(i as u64))?;
            for &e in external {
                if self.has_external(e) {
                    return Err(Error::DuplicateId(e));
                }
            }
            for &i in internal {
                if self.has_internal(i) {
                    return Err(Error::DuplicateId(i as u64));
                }
            }
        }

        for (&e, &i) in external.iter().zip(internal.iter()) {
            self.external_to_internal.insert(e, i);
            self.internal_to_external.insert(i, e);
        }
        Ok(())
    }

    /// Remove the pair associated with external id `e`. Errors leave the
    /// translator unchanged.
    pub fn delete_external(&mut self, e: ExternalId) -> Result<InternalId> {
        let i = self.get_internal(e)?;
        self.external_to_internal.remove(&e);
        self.internal_to_external.remove(&i);
        Ok(i)
    }

    /// Remove the pair associated with internal id `i`.
    pub fn delete_internal(&mut self, i: InternalId) -> Result<ExternalId> {
        let e = self.get_external(i)?;
        self.external_to_internal.remove(&e);
        self.internal_to_external.remove(&i);
        Ok(e)
    }

    /// Update the internal side of a binding, preserving the external id.
    /// Preconditions: `from` exists, `to` does not.
    pub fn remap_internal(&mut self, from: InternalId, to: InternalId) -> Result<()> {
        if !self.has_internal(from) {
            return Err(Error::UnknownId(from as u64));
        }
        if self.has_internal(to) {
            return Err(Error::DuplicateId(to as u64));
        }
        let e = self.internal_to_external.remove(&from).expect("checked above");
        self.internal_to_external.insert(to, e);
        self.external_to_internal.insert(e, to);
        Ok(())
    }

    /// Iterate `(external, internal)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (ExternalId, InternalId)> + '_ {
        self.external_to_internal.iter().map(|(&e, &i)| (e, i))
    }

    /// Allocate the next unused internal id as `narrow(size())`, the
    /// convention dynamic insert uses when not reusing a tombstoned slot.
    pub fn next_internal_id(&self) -> Result<InternalId> {
        narrow::<u32, usize>(self.size())
    }
}

fn all_unique<T: Eq + std::hash::Hash + Copy>(items: &[T]) -> std::result::Result<(), T> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    for &item in items {
        if !seen.insert(item) {
            return Err(item);
        }
    }
    Ok(())
}

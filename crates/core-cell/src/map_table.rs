//! Storage for `MAP!` values: [`Map`] itself has no lifecycle of its own
//! (it's a bare pairlist+hashlist), so this table gives it the same
//! unmanaged→managed, mark-and-sweep lifecycle every other aggregate in
//! the runtime has, via a [`core_mem::Pool`] exactly like
//! `core_series::SeriesTable` does for series.

use core_mem::Pool;

use crate::map::Map;
use crate::payload::MapHandle;

/// A `Map` plus the bookkeeping the GC needs: whether it has been handed
/// to the GC yet, and whether this cycle's mark phase has reached it.
pub struct ManagedMap {
    map: Map,
    managed: bool,
    marked: bool,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MapTableError {
    #[error("handle does not refer to a live map")]
    StaleHandle,
    #[error("map is managed by the GC and cannot be freed directly")]
    ManagedMapFreedDirectly,
    #[error("map is not managed and cannot be handed to the GC again")]
    AlreadyUnmanaged,
}

#[derive(Default)]
pub struct MapTable {
    pool: Pool<ManagedMap>,
    manuals: Vec<MapHandle>,
}

impl MapTable {
    pub fn new() -> Self {
        Self {
            pool: Pool::new(),
            manuals: Vec::new(),
        }
    }

    pub fn make(&mut self) -> MapHandle {
        let handle = self.pool.alloc(ManagedMap {
            map: Map::new(),
            managed: false,
            marked: false,
        });
        self.manuals.push(handle);
        handle
    }

    pub fn get(&self, handle: MapHandle) -> Option<&Map> {
        self.pool.get(handle).map(|m| &m.map)
    }

    pub fn get_mut(&mut self, handle: MapHandle) -> Option<&mut Map> {
        self.pool.get_mut(handle).map(|m| &mut m.map)
    }

    pub fn manage(&mut self, handle: MapHandle) -> Result<(), MapTableError> {
        let pos = self
            .manuals
            .iter()
            .position(|h| *h == handle)
            .ok_or(MapTableError::AlreadyUnmanaged)?;
        self.manuals.swap_remove(pos);
        let entry = self
            .pool
            .get_mut(handle)
            .ok_or(MapTableError::StaleHandle)?;
        entry.managed = true;
        Ok(())
    }

    pub fn free(&mut self, handle: MapHandle) -> Result<(), MapTableError> {
        let entry = self.pool.get(handle).ok_or(MapTableError::StaleHandle)?;
        if entry.managed {
            return Err(MapTableError::ManagedMapFreedDirectly);
        }
        self.manuals.retain(|h| *h != handle);
        self.pool.free(handle);
        Ok(())
    }

    pub fn mark(&mut self, handle: MapHandle) {
        if let Some(entry) = self.pool.get_mut(handle) {
            entry.marked = true;
        }
    }

    pub fn is_marked(&self, handle: MapHandle) -> bool {
        self.pool.get(handle).map(|m| m.marked).unwrap_or(false)
    }

    /// Same contract as `SeriesTable::sweep_unmarked`: frees every
    /// unmarked managed map, clears the mark bit on survivors, leaves
    /// unmanaged maps untouched.
    pub fn sweep_unmarked(&mut self) -> usize {
        let managed: Vec<MapHandle> = self
            .pool
            .iter()
            .filter(|(_, m)| m.managed)
            .map(|(h, _)| h)
            .collect();
        let mut freed = 0;
        for handle in managed {
            let marked = self.pool.get(handle).map(|m| m.marked).unwrap_or(false);
            if marked {
                if let Some(m) = self.pool.get_mut(handle) {
                    m.marked = false;
                }
            } else {
                self.pool.free(handle);
                freed += 1;
            }
        }
        freed
    }

    pub fn manuals(&self) -> &[MapHandle] {
        &self.manuals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cell;

    #[test]
    fn make_is_unmanaged_until_managed() {
        let mut t = MapTable::new();
        let h = t.make();
        assert_eq!(t.manuals(), &[h]);
        t.manage(h).unwrap();
        assert!(t.manuals().is_empty());
    }

    #[test]
    fn sweep_frees_unmarked_managed_only() {
        let mut t = MapTable::new();
        let kept = t.make();
        let freed = t.make();
        let manual = t.make();
        t.manage(kept).unwrap();
        t.manage(freed).unwrap();
        t.get_mut(kept)
            .unwrap()
            .insert(Cell::integer(1), Cell::integer(1), 1, |a, b| {
                a.as_integer().ok() == b.as_integer().ok()
            });
        t.mark(kept);
        let reclaimed = t.sweep_unmarked();
        assert_eq!(reclaimed, 1);
        assert!(t.get(kept).is_some());
        assert!(t.get(freed).is_none());
        assert!(t.get(manual).is_some());
    }
}

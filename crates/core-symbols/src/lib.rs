//! Case-insensitive symbol interning.
//!
//! Every spelling (`foo`, `Foo`, `FOO`, …) interns to its own [`Handle`],
//! but all spellings that differ only by case share a *canon*: the
//! representative symbol other subsystems compare identities against.
//! `intern("FOO") != intern("foo")` as handles, but
//! `canon(intern("FOO")) == canon(intern("foo"))`.
//!
//! The probing strategy (spec 4.3) is open addressing with a step
//! co-prime to the table length: `step = hash % (len - 1) + 1` — since
//! `len` is kept prime, that step can never itself divide `len`, so
//! every probe sequence visits every slot before repeating. [`probe`]
//! is exposed separately because `core-cell`'s MAP! hash table (spec
//! 4.4) reuses the identical scheme over a different key/value shape.

pub mod probe;

use ahash::AHasher;
use core_mem::{Handle, Pool};
use std::hash::{Hash, Hasher};

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut h = AHasher::default();
    bytes.hash(&mut h);
    h.finish()
}

fn lower_into(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.clear();
    buf.extend(bytes.iter().map(|b| b.to_ascii_lowercase()));
}

struct SymbolNode {
    spelling: Box<str>,
    canon: Handle<SymbolNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId(Handle<SymbolNode>);

impl std::hash::Hash for SymbolId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Spec Design Note: long-lived hashes must be of spelling bytes,
        // not of canon/handle identity, because a canon's identity can
        // migrate to a surviving synonym. `SymbolId::hash` is therefore
        // deliberately NOT exposed for use as a cache key across a
        // `recycle()`; callers needing a stable key should hash the
        // spelling (`SymbolTable::spelling`) instead. This impl exists
        // only so `SymbolId` can sit in a `HashSet` for a single eval
        // cycle's duration, never persisted past one.
        self.0.index().hash(state);
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Zombie,
    Occupied(Handle<SymbolNode>),
}

struct OpenTable {
    slots: Vec<Slot>,
    occupied: usize,
}

impl OpenTable {
    fn with_capacity(min_prime: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; next_prime(min_prime)],
            occupied: 0,
        }
    }

    fn load_exceeds_half(&self) -> bool {
        self.occupied * 2 > self.slots.len()
    }
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

/// Interns spellings and resolves their case-insensitive canon.
pub struct SymbolTable {
    pool: Pool<SymbolNode>,
    exact: OpenTable,
    canon: OpenTable,
    scratch_lower: Vec<u8>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            pool: Pool::new(),
            exact: OpenTable::with_capacity(17),
            canon: OpenTable::with_capacity(17),
            scratch_lower: Vec::new(),
        }
    }

    fn spelling_of(&self, handle: Handle<SymbolNode>) -> &str {
        &self.pool.get(handle).expect("interned handle is live").spelling
    }

    pub fn spelling(&self, id: SymbolId) -> &str {
        self.spelling_of(id.0)
    }

    fn find_exact(&self, bytes: &[u8]) -> Option<Handle<SymbolNode>> {
        let hash = hash_bytes(bytes);
        Self::probe_table(&self.exact, hash, |h| self.spelling_of(h).as_bytes() == bytes)
    }

    fn find_canon(&self, lower_bytes: &[u8]) -> Option<Handle<SymbolNode>> {
        let hash = hash_bytes(lower_bytes);
        Self::probe_table(&self.canon, hash, |h| {
            self.spelling_of(h).as_bytes().eq_ignore_ascii_case(lower_bytes)
        })
    }

    fn probe_table(
        table: &OpenTable,
        hash: u64,
        matches: impl Fn(Handle<SymbolNode>) -> bool,
    ) -> Option<Handle<SymbolNode>> {
        let len = table.slots.len();
        let step = probe::step(hash, len);
        let mut idx = (hash as usize) % len;
        for _ in 0..len {
            match table.slots[idx] {
                Slot::Empty => return None,
                Slot::Zombie => {}
                Slot::Occupied(h) if matches(h) => return Some(h),
                Slot::Occupied(_) => {}
            }
            idx = (idx + step) % len;
        }
        None
    }

    fn insert_into(table: &mut OpenTable, hash: u64, handle: Handle<SymbolNode>) {
        let len = table.slots.len();
        let step = probe::step(hash, len);
        let mut idx = (hash as usize) % len;
        loop {
            match table.slots[idx] {
                Slot::Empty | Slot::Zombie => {
                    table.slots[idx] = Slot::Occupied(handle);
                    table.occupied += 1;
                    return;
                }
                Slot::Occupied(_) => {}
            }
            idx = (idx + step) % len;
        }
    }

    /// `intern`: return the canonical handle for this *exact* spelling,
    /// creating it (and its canon, if this is the first spelling in its
    /// case-insensitive class) on first sight.
    pub fn intern(&mut self, bytes: &[u8]) -> SymbolId {
        if let Some(existing) = self.find_exact(bytes) {
            return SymbolId(existing);
        }

        lower_into(bytes, &mut self.scratch_lower);
        let lower = std::mem::take(&mut self.scratch_lower);
        let canon_handle = match self.find_canon(&lower) {
            Some(c) => c,
            None => {
                // First sighting of this case-insensitive class: this
                // spelling becomes its own canon.
                let spelling: Box<str> = Box::from(std::str::from_utf8(bytes).unwrap_or(""));
                let placeholder = self
                    .pool
                    .alloc_with(|handle| SymbolNode { spelling, canon: handle });
                let hash = hash_bytes(&lower);
                if self.canon.load_exceeds_half() {
                    self.grow_canon();
                }
                Self::insert_into(&mut self.canon, hash, placeholder);
                let exact_hash = hash_bytes(bytes);
                if self.exact.load_exceeds_half() {
                    self.grow_exact();
                }
                Self::insert_into(&mut self.exact, exact_hash, placeholder);
                self.scratch_lower = lower;
                return SymbolId(placeholder);
            }
        };
        self.scratch_lower = lower;

        let handle = self.pool.alloc(SymbolNode {
            spelling: Box::from(std::str::from_utf8(bytes).unwrap_or("")),
            canon: canon_handle,
        });
        let exact_hash = hash_bytes(bytes);
        if self.exact.load_exceeds_half() {
            self.grow_exact();
        }
        Self::insert_into(&mut self.exact, exact_hash, handle);
        SymbolId(handle)
    }

    fn grow_exact(&mut self) {
        let new_len = next_prime(self.exact.slots.len() * 2);
        let mut fresh = OpenTable {
            slots: vec![Slot::Empty; new_len],
            occupied: 0,
        };
        let handles: Vec<Handle<SymbolNode>> = self
            .exact
            .slots
            .iter()
            .filter_map(|s| match s {
                Slot::Occupied(h) => Some(*h),
                _ => None,
            })
            .collect();
        for h in handles {
            let hash = hash_bytes(self.spelling_of(h).as_bytes());
            Self::insert_into(&mut fresh, hash, h);
        }
        self.exact = fresh;
    }

    fn grow_canon(&mut self) {
        let new_len = next_prime(self.canon.slots.len() * 2);
        let mut fresh = OpenTable {
            slots: vec![Slot::Empty; new_len],
            occupied: 0,
        };
        let handles: Vec<Handle<SymbolNode>> = self
            .canon
            .slots
            .iter()
            .filter_map(|s| match s {
                Slot::Occupied(h) => Some(*h),
                _ => None,
            })
            .collect();
        for h in handles {
            let mut lower = Vec::new();
            lower_into(self.spelling_of(h).as_bytes(), &mut lower);
            let hash = hash_bytes(&lower);
            Self::insert_into(&mut fresh, hash, h);
        }
        self.canon = fresh;
    }

    /// `canon`: the case-insensitive representative for `id`.
    pub fn canon(&self, id: SymbolId) -> SymbolId {
        SymbolId(self.pool.get(id.0).expect("live handle").canon)
    }

    pub fn len(&self) -> usize {
        self.pool.live_count()
    }
    pub fn is_empty(&self) -> bool {
        self.pool.live_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_spelling_interns_to_same_handle() {
        let mut t = SymbolTable::new();
        let a = t.intern(b"foo");
        let b = t.intern(b"foo");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_case_shares_canon_but_not_identity() {
        let mut t = SymbolTable::new();
        let lower = t.intern(b"foo");
        let mixed = t.intern(b"Foo");
        let upper = t.intern(b"FOO");
        assert_ne!(lower, mixed);
        assert_ne!(lower, upper);
        assert_eq!(t.canon(lower), t.canon(mixed));
        assert_eq!(t.canon(lower), t.canon(upper));
    }

    #[test]
    fn canon_of_first_sighting_is_itself() {
        let mut t = SymbolTable::new();
        let first = t.intern(b"bar");
        assert_eq!(t.canon(first), first);
    }

    #[test]
    fn spelling_round_trips() {
        let mut t = SymbolTable::new();
        let id = t.intern(b"Quux");
        assert_eq!(t.spelling(id), "Quux");
    }

    #[test]
    fn rehash_survives_many_inserts() {
        let mut t = SymbolTable::new();
        let mut ids = Vec::new();
        for i in 0..5000 {
            let s = format!("sym-{i}");
            ids.push((s.clone(), t.intern(s.as_bytes())));
        }
        for (s, id) in &ids {
            assert_eq!(t.spelling(*id), s.as_str());
            // re-interning must still resolve to the same handle after growth
            assert_eq!(t.intern(s.as_bytes()), *id);
        }
    }

    #[test]
    fn canon_equivalence_matches_lowercase_equality() {
        let mut t = SymbolTable::new();
        let pairs = [("Set-Word", "set-word"), ("ABC", "abc"), ("x", "X")];
        for (a, b) in pairs {
            let ia = t.intern(a.as_bytes());
            let ib = t.intern(b.as_bytes());
            assert_eq!(
                t.canon(ia) == t.canon(ib),
                a.to_ascii_lowercase() == b.to_ascii_lowercase()
            );
        }
    }
}

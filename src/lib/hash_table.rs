//! Open-addressing k-mer table with cooperative resizing.
//!
//! Double hashing over a power-of-two arena: the key's primary hash picks
//! the first bucket, the secondary hash (forced odd, hence coprime with
//! the capacity) supplies the probe step. When the load factor crosses
//! [`LOAD_NUMERATOR`]/[`LOAD_DENOMINATOR`] a larger arena is allocated and
//! entries migrate in bounded steps, so a rank embedded in a cooperative
//! scheduler can interleave the rehash with message draining instead of
//! paying for it in one turn. Lookups and inserts consult both arenas
//! while a migration is pending.
//!
//! Running out of room with no growth allowed is fatal: the process
//! aborts with a diagnostic naming the rank and table, never silently
//! dropping records.

use braid_kmer::Kmer;

/// Default slot count for a fresh table.
pub const INITIAL_CAPACITY: usize = 4096;

/// Entries migrated per [`KmerTable::complete_resizing`] call.
const RESIZE_BATCH: usize = 4096;

/// Entries migrated opportunistically on each mutating operation.
const MIGRATE_PER_OP: usize = 32;

/// Grow once `len / capacity` exceeds 7/10.
const LOAD_NUMERATOR: usize = 7;
const LOAD_DENOMINATOR: usize = 10;

#[derive(Default)]
struct Slot<V> {
    occupied: bool,
    key: Kmer,
    value: V,
}

struct Arena<V> {
    slots: Box<[Slot<V>]>,
    mask: usize,
}

enum Probe {
    Found(usize),
    Empty(usize),
}

impl<V: Default> Arena<V> {
    fn new(capacity: usize) -> Arena<V> {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Arena { slots: slots.into_boxed_slice(), mask: capacity - 1 }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Walk the probe sequence until the key or an empty slot appears.
    /// Returns `None` only when the arena is completely full.
    fn probe(&self, key: &Kmer) -> Option<Probe> {
        let step = (key.hash_secondary() as usize) | 1;
        let mut index = (key.hash_primary() as usize) & self.mask;
        for _ in 0..self.slots.len() {
            let slot = &self.slots[index];
            if !slot.occupied {
                return Some(Probe::Empty(index));
            }
            if slot.key == *key {
                return Some(Probe::Found(index));
            }
            index = (index + step) & self.mask;
        }
        None
    }
}

struct ResizeState<V> {
    arena: Arena<V>,
    /// Next old-arena slot to migrate.
    cursor: usize,
}

/// Rank-local hash table mapping k-mers to fixed-size records.
///
/// Insertion is idempotent on the key; whether the last insert created a
/// new slot is reported through [`KmerTable::inserted`] so callers can
/// maintain counters spanning several logical tables.
pub struct KmerTable<V> {
    label: &'static str,
    rank: u16,
    main: Arena<V>,
    resize: Option<ResizeState<V>>,
    len: usize,
    inserted: bool,
    max_capacity: usize,
}

impl<V: Default> KmerTable<V> {
    /// Create a table with the default initial capacity.
    #[must_use]
    pub fn new(label: &'static str, rank: u16) -> KmerTable<V> {
        Self::with_capacity(label, rank, INITIAL_CAPACITY)
    }

    /// Create a table with a chosen initial capacity (rounded up to a
    /// power of two).
    #[must_use]
    pub fn with_capacity(label: &'static str, rank: u16, capacity: usize) -> KmerTable<V> {
        let capacity = capacity.next_power_of_two().max(8);
        KmerTable {
            label,
            rank,
            main: Arena::new(capacity),
            resize: None,
            len: 0,
            inserted: false,
            max_capacity: 1 << 40,
        }
    }

    /// Cap the largest arena this table may allocate, in slots.
    #[must_use]
    pub fn with_max_capacity(mut self, max_capacity: usize) -> KmerTable<V> {
        self.max_capacity = max_capacity;
        self
    }

    /// Number of records stored across both arenas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the last [`KmerTable::insert`] created a new slot.
    #[must_use]
    pub fn inserted(&self) -> bool {
        self.inserted
    }

    /// Whether a migration to a larger arena is pending.
    #[must_use]
    pub fn is_resizing(&self) -> bool {
        self.resize.is_some()
    }

    /// Look up a record.
    #[must_use]
    pub fn find(&self, key: &Kmer) -> Option<&V> {
        if let Some(resize) = &self.resize {
            if let Some(Probe::Found(index)) = resize.arena.probe(key) {
                return Some(&resize.arena.slots[index].value);
            }
        }
        match self.main.probe(key) {
            Some(Probe::Found(index)) => Some(&self.main.slots[index].value),
            _ => None,
        }
    }

    /// Look up a record for mutation.
    pub fn find_mut(&mut self, key: &Kmer) -> Option<&mut V> {
        if let Some(resize) = &mut self.resize {
            if let Some(Probe::Found(index)) = resize.arena.probe(key) {
                return Some(&mut resize.arena.slots[index].value);
            }
        }
        match self.main.probe(key) {
            Some(Probe::Found(index)) => Some(&mut self.main.slots[index].value),
            _ => None,
        }
    }

    /// Insert a key, returning its record. An existing record is returned
    /// untouched; a new one starts from `V::default()`.
    pub fn insert(&mut self, key: &Kmer) -> &mut V {
        self.inserted = false;
        self.migrate(MIGRATE_PER_OP);
        self.maybe_grow();

        // The key lives in at most one arena; check the newer one first.
        if self.resize.is_some() {
            if let Some(Probe::Found(index)) = self.resize.as_ref().unwrap().arena.probe(key) {
                return &mut self.resize.as_mut().unwrap().arena.slots[index].value;
            }
            if let Some(Probe::Found(index)) = self.main.probe(key) {
                return &mut self.main.slots[index].value;
            }
            // New records always land in the destination arena.
            let probe = self.resize.as_ref().unwrap().arena.probe(key);
            let Some(Probe::Empty(index)) = probe else { self.fail_capacity() };
            self.len += 1;
            self.inserted = true;
            let slot = &mut self.resize.as_mut().unwrap().arena.slots[index];
            slot.occupied = true;
            slot.key = *key;
            slot.value = V::default();
            return &mut slot.value;
        }

        let index = match self.main.probe(key) {
            Some(Probe::Found(index)) => return &mut self.main.slots[index].value,
            Some(Probe::Empty(index)) => index,
            None => self.fail_capacity(),
        };
        let slot = &mut self.main.slots[index];
        slot.occupied = true;
        slot.key = *key;
        slot.value = V::default();
        self.len += 1;
        self.inserted = true;
        &mut self.main.slots[index].value
    }

    /// Run one bounded slice of a pending migration.
    ///
    /// Returns `true` once no migration remains; callers embedded in a
    /// scheduler invoke this every turn until it settles.
    pub fn complete_resizing(&mut self) -> bool {
        self.migrate(RESIZE_BATCH);
        self.resize.is_none()
    }

    /// Rebuild every record at its shortest probe position.
    ///
    /// Finishes any pending migration first, then re-probes all entries
    /// into a fresh arena of the same capacity.
    pub fn defragment(&mut self) {
        while !self.complete_resizing() {}
        let capacity = self.main.capacity();
        let old = std::mem::replace(&mut self.main, Arena::new(capacity));
        for slot in old.slots.into_vec() {
            if !slot.occupied {
                continue;
            }
            let Some(Probe::Empty(index)) = self.main.probe(&slot.key) else {
                self.fail_capacity()
            };
            self.main.slots[index] = slot;
        }
    }

    /// Visit every record, in no particular order. The iterator is finite
    /// and cheap to recreate, so walks can be restarted at will.
    pub fn iter(&self) -> impl Iterator<Item = (&Kmer, &V)> {
        let pending = self.resize.iter().flat_map(|r| r.arena.slots.iter());
        self.main
            .slots
            .iter()
            .chain(pending)
            .filter(|slot| slot.occupied)
            .map(|slot| (&slot.key, &slot.value))
    }

    /// Drop every record, keeping the current main arena allocation.
    pub fn clear(&mut self) {
        while !self.complete_resizing() {}
        for slot in &mut self.main.slots {
            slot.occupied = false;
            slot.value = V::default();
        }
        self.len = 0;
        self.inserted = false;
    }

    fn migrate(&mut self, budget: usize) {
        let Some(resize) = &mut self.resize else { return };
        let mut moved = 0;
        while resize.cursor < self.main.slots.len() && moved < budget {
            let cursor = resize.cursor;
            resize.cursor += 1;
            if !self.main.slots[cursor].occupied {
                continue;
            }
            let slot = std::mem::take(&mut self.main.slots[cursor]);
            match resize.arena.probe(&slot.key) {
                Some(Probe::Empty(index)) => resize.arena.slots[index] = slot,
                // Keys are unique across arenas and the destination is
                // strictly larger, so only Empty can match.
                _ => unreachable!("migration lost a slot"),
            }
            moved += 1;
        }
        if resize.cursor >= self.main.slots.len() {
            let finished = self.resize.take().unwrap();
            self.main = finished.arena;
        }
    }

    fn maybe_grow(&mut self) {
        let capacity = match &self.resize {
            Some(resize) => resize.arena.capacity(),
            None => self.main.capacity(),
        };
        if (self.len + 1) * LOAD_DENOMINATOR <= capacity * LOAD_NUMERATOR {
            return;
        }
        // Finish any half-done migration before opening the next arena.
        while !self.complete_resizing() {}
        let grown = self.main.capacity() * 2;
        if grown > self.max_capacity {
            self.fail_capacity();
        }
        self.resize = Some(ResizeState { arena: Arena::new(grown), cursor: 0 });
    }

    fn fail_capacity(&self) -> ! {
        panic!(
            "rank {}: {} table exhausted at {} records (max capacity {} slots); \
             increase the memory budget",
            self.rank,
            self.label,
            self.len,
            self.max_capacity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_kmer::Strand;

    fn kmer(text: &str) -> Kmer {
        Kmer::from_sequence(text.as_bytes(), 0, text.len(), Strand::Forward).unwrap()
    }

    /// Deterministic distinct keys: every 12-mer over positions of a
    /// rotating alphabet.
    fn keys(n: usize) -> Vec<Kmer> {
        let alphabet = [b'A', b'C', b'G', b'T'];
        (0..n)
            .map(|i| {
                let text: Vec<u8> =
                    (0..12).map(|j| alphabet[(i >> (2 * (j % 8))) & 3 ^ (j / 8)]).collect();
                Kmer::from_sequence(&text, 0, 12, Strand::Forward).unwrap()
            })
            .collect()
    }

    #[test]
    fn insert_then_find() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        *table.insert(&kmer("ACGT")) = 7;
        assert!(table.inserted());
        assert_eq!(table.find(&kmer("ACGT")), Some(&7));
        assert_eq!(table.find(&kmer("TTTT")), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_is_idempotent_on_key() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        *table.insert(&kmer("ACGT")) = 3;
        let record = table.insert(&kmer("ACGT"));
        assert_eq!(*record, 3);
        assert!(!table.inserted());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_keys_all_found() {
        let keys: Vec<Kmer> = keys(500).into_iter().collect();
        let distinct: Vec<Kmer> = {
            let mut seen = Vec::new();
            for k in keys {
                if !seen.contains(&k) {
                    seen.push(k);
                }
            }
            seen
        };
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        for (index, key) in distinct.iter().enumerate() {
            *table.insert(key) = index as u32;
        }
        assert_eq!(table.len(), distinct.len());
        for (index, key) in distinct.iter().enumerate() {
            assert_eq!(table.find(key), Some(&(index as u32)), "key {index} lost");
        }
    }

    #[test]
    fn growth_is_resumable() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        let keys = keys(2000);
        for key in &keys {
            table.insert(key);
        }
        // Drive any pending migration in bounded steps.
        let mut turns = 0;
        while !table.complete_resizing() {
            turns += 1;
            assert!(turns < 1_000_000);
        }
        assert!(!table.is_resizing());
        for key in &keys {
            assert!(table.find(key).is_some());
        }
    }

    #[test]
    fn lookups_work_mid_migration() {
        let mut table: KmerTable<u64> = KmerTable::with_capacity("test", 0, 8);
        let keys = keys(300);
        for (index, key) in keys.iter().enumerate() {
            *table.insert(key) = index as u64;
            // Interleave lookups of everything inserted so far.
            if index % 37 == 0 {
                for (j, earlier) in keys[..=index].iter().enumerate() {
                    assert_eq!(table.find(earlier), Some(&(j as u64)), "key {j} lost mid-resize");
                }
            }
        }
    }

    #[test]
    fn defragment_preserves_contents() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        let keys = keys(200);
        for key in &keys {
            table.insert(key);
        }
        let before = table.len();
        table.defragment();
        assert_eq!(table.len(), before);
        for key in &keys {
            assert!(table.find(key).is_some());
        }
    }

    #[test]
    fn iter_visits_every_record_once() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        for key in keys(150) {
            table.insert(&key);
        }
        assert_eq!(table.iter().count(), table.len());
        // Restartable: a second walk sees the same population.
        assert_eq!(table.iter().count(), table.len());
    }

    #[test]
    fn clear_empties_the_table() {
        let mut table: KmerTable<u32> = KmerTable::with_capacity("test", 0, 8);
        for key in keys(50) {
            table.insert(&key);
        }
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exceeding_the_memory_budget_is_fatal() {
        let mut table: KmerTable<u32> =
            KmerTable::with_capacity("test", 3, 8).with_max_capacity(16);
        for key in keys(1000) {
            table.insert(&key);
        }
    }
}

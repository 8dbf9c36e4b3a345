//! Cuckoo filter: approximate membership with four bits-per-tag
//! parameterisations (§4.1).

const TAGS_PER_BUCKET: usize = 4;
const MAX_ITERATION: usize = 500;
const BUCKETS_EXPANSION: usize = 4;
const MAX_TABLES: usize = 8;
const TABLE_MIN_BUCKETS: usize = 16;
const TAG_NULL: u32 = 0;

/// The four supported tag widths. Each determines the filter's target
/// false-positive rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsPerTag {
    /// 8 bits/tag, target FPR <= 0.03. `contains()` is disabled for this
    /// variant by contract — callers may only rely on absence.
    Eight,
    /// 12 bits/tag, target FPR <= 0.003.
    Twelve,
    /// 16 bits/tag, target FPR <= 0.0003.
    Sixteen,
    /// 32 bits/tag, target FPR <= 0.0001.
    ThirtyTwo,
}

impl BitsPerTag {
    fn bits(self) -> usize {
        match self {
            BitsPerTag::Eight => 8,
            BitsPerTag::Twelve => 12,
            BitsPerTag::Sixteen => 16,
            BitsPerTag::ThirtyTwo => 32,
        }
    }

    /// Target false-positive rate for this tag width (§4.1).
    pub fn target_fpr(self) -> f64 {
        match self {
            BitsPerTag::Eight => 0.03,
            BitsPerTag::Twelve => 0.003,
            BitsPerTag::Sixteen => 0.0003,
            BitsPerTag::ThirtyTwo => 0.0001,
        }
    }
}

fn read_bits(data: &[u8], bit_offset: usize, width: usize) -> u32 {
    let mut value: u64 = 0;
    for i in 0..width {
        let bit = bit_offset + i;
        let byte = data[bit / 8];
        let b = (byte >> (bit % 8)) & 1;
        value |= (b as u64) << i;
    }
    value as u32
}

fn write_bits(data: &mut [u8], bit_offset: usize, width: usize, value: u32) {
    for i in 0..width {
        let bit = bit_offset + i;
        let b = ((value >> i) & 1) as u8;
        let byte = &mut data[bit / 8];
        if b == 1 {
            *byte |= 1 << (bit % 8);
        } else {
            *byte &= !(1 << (bit % 8));
        }
    }
}

struct Victim {
    used: bool,
    tag: u32,
    index: usize,
}

struct Table {
    bits_per_tag: usize,
    nbuckets: usize,
    bytes_per_bucket: usize,
    data: Vec<u8>,
    victim: Victim,
}

impl Table {
    fn new(nbuckets: usize, bits_per_tag: usize) -> Self {
        let bytes_per_bucket = (TAGS_PER_BUCKET * bits_per_tag + 7) / 8;
        Table {
            bits_per_tag,
            nbuckets,
            bytes_per_bucket,
            data: vec![0u8; bytes_per_bucket * nbuckets],
            victim: Victim { used: false, tag: TAG_NULL, index: 0 },
        }
    }

    fn bucket_offset_bits(&self, bucket: usize, slot: usize) -> usize {
        (bucket * self.bytes_per_bucket) * 8 + slot * self.bits_per_tag
    }

    fn read_slot(&self, bucket: usize, slot: usize) -> u32 {
        read_bits(&self.data, self.bucket_offset_bits(bucket, slot), self.bits_per_tag)
    }

    fn write_slot(&mut self, bucket: usize, slot: usize, tag: u32) {
        let off = self.bucket_offset_bits(bucket, slot);
        write_bits(&mut self.data, off, self.bits_per_tag, tag);
    }

    fn find_empty_slot(&self, bucket: usize) -> Option<usize> {
        (0..TAGS_PER_BUCKET).find(|&s| self.read_slot(bucket, s) == TAG_NULL)
    }

    fn find_tag_slot(&self, bucket: usize, tag: u32) -> Option<usize> {
        (0..TAGS_PER_BUCKET).find(|&s| self.read_slot(bucket, s) == tag)
    }

    fn used_memory(&self) -> usize {
        self.bytes_per_bucket * self.nbuckets
    }

    fn load_factor(&self) -> f64 {
        let mut used = 0usize;
        for b in 0..self.nbuckets {
            for s in 0..TAGS_PER_BUCKET {
                if self.read_slot(b, s) != TAG_NULL {
                    used += 1;
                }
            }
        }
        used as f64 / (self.nbuckets * TAGS_PER_BUCKET) as f64
    }
}

/// Per-table stats, plus totals (§4.1: "Reported stats: tags, memory, load
/// factor per table").
pub struct CuckooStat {
    /// Total number of occupied tag slots across all tables.
    pub ntags: usize,
    /// Total memory used, in bytes, across all tables
    /// (`cuckooFilterUsedMemory` — sum over tables of bytes_per_bucket *
    /// nbuckets, per SPEC_FULL.md §9 open question).
    pub used_memory: usize,
    /// Number of tables.
    pub ntables: usize,
    /// Load factor (occupied / capacity) per table, oldest first.
    pub load_factors: Vec<f64>,
}

/// A cuckoo filter: one or more tables of exponentially growing size, a
/// fixed bits-per-tag width, and a simple xor-shift RNG for kick-out
/// victim selection (deterministic given a seed, which keeps tests
/// reproducible).
pub struct CuckooFilter {
    bits_per_tag: BitsPerTag,
    tables: Vec<Table>,
    rng_state: u64,
}

fn fingerprint(hash: u64, bits_per_tag: usize) -> u32 {
    let mask = if bits_per_tag >= 32 { u32::MAX } else { (1u32 << bits_per_tag) - 1 };
    let tag = (hash as u32) & mask;
    if tag == TAG_NULL {
        1
    } else {
        tag
    }
}

fn hash_key(key: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(key)
}

impl CuckooFilter {
    /// Creates a new filter sized for `estimated_keys` entries.
    pub fn new(bits_per_tag: BitsPerTag, estimated_keys: usize) -> Self {
        let min_buckets = (estimated_keys / TAGS_PER_BUCKET).max(1);
        let nbuckets = min_buckets.next_power_of_two().max(TABLE_MIN_BUCKETS);
        CuckooFilter {
            bits_per_tag,
            tables: vec![Table::new(nbuckets, bits_per_tag.bits())],
            rng_state: 0x9e3779b97f4a7c15,
        }
    }

    fn next_rand(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn indices(hash: u64, tag: u32, nbuckets: usize) -> (usize, usize) {
        let i1 = ((hash >> 32) as usize) % nbuckets;
        let i2 = (i1 ^ ((tag.wrapping_mul(0x5bd1e995)) as usize)) % nbuckets;
        (i1, i2)
    }

    /// Inserts `key`. Returns `false` only if the filter could not place
    /// the key even after expanding to the table cap — the caller should
    /// treat this as the "permanent insert failure" of §4.2.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let hash = hash_key(key);
        let tag = fingerprint(hash, self.bits_per_tag.bits());
        self.insert_tag(hash, tag)
    }

    fn insert_tag(&mut self, hash: u64, mut tag: u32) -> bool {
        loop {
            let last = self.tables.len() - 1;
            let nbuckets = self.tables[last].nbuckets;
            let (i1, i2) = Self::indices(hash, tag, nbuckets);

            if let Some(s) = self.tables[last].find_empty_slot(i1) {
                self.tables[last].write_slot(i1, s, tag);
                return true;
            }
            if let Some(s) = self.tables[last].find_empty_slot(i2) {
                self.tables[last].write_slot(i2, s, tag);
                return true;
            }

            // Both candidate buckets are full: kick out.
            let mut index = if self.next_rand() & 1 == 0 { i1 } else { i2 };
            let mut placed = false;
            for _ in 0..MAX_ITERATION {
                let slot = (self.next_rand() as usize) % TAGS_PER_BUCKET;
                let victim_tag = self.tables[last].read_slot(index, slot);
                self.tables[last].write_slot(index, slot, tag);
                tag = victim_tag;
                let nbuckets = self.tables[last].nbuckets;
                index = (index ^ ((tag.wrapping_mul(0x5bd1e995)) as usize)) % nbuckets;
                if let Some(s) = self.tables[last].find_empty_slot(index) {
                    self.tables[last].write_slot(index, s, tag);
                    placed = true;
                    break;
                }
            }
            if placed {
                return true;
            }

            if !self.tables[last].victim.used {
                self.tables[last].victim = Victim { used: true, tag, index };
                return true;
            }

            // Victim slot already occupied: expand, unless at the cap.
            if self.tables.len() >= MAX_TABLES {
                return false;
            }
            let new_buckets = (nbuckets.saturating_mul(BUCKETS_EXPANSION)).min(u32::MAX as usize);
            self.tables.push(Table::new(new_buckets, self.bits_per_tag.bits()));
            // retry the kicked-out tag against the freshly appended table
        }
    }

    /// Reports whether `key` may be present. Returns `None` for the 8-bit
    /// variant, which disables `contains()` by contract (§4.1).
    pub fn contains(&self, key: &[u8]) -> Option<bool> {
        if self.bits_per_tag == BitsPerTag::Eight {
            return None;
        }
        let hash = hash_key(key);
        let tag = fingerprint(hash, self.bits_per_tag.bits());
        Some(self.contains_tag(hash, tag))
    }

    fn contains_tag(&self, hash: u64, tag: u32) -> bool {
        for t in self.tables.iter().rev() {
            let (i1, i2) = Self::indices(hash, tag, t.nbuckets);
            if t.find_tag_slot(i1, tag).is_some() || t.find_tag_slot(i2, tag).is_some() {
                return true;
            }
            if t.victim.used && t.victim.tag == tag && (t.victim.index == i1 || t.victim.index == i2) {
                return true;
            }
        }
        false
    }

    /// Deletes `key`, which must have been previously inserted. Clears one
    /// matching slot and attempts to reinsert a parked victim.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let hash = hash_key(key);
        let tag = fingerprint(hash, self.bits_per_tag.bits());
        for idx in (0..self.tables.len()).rev() {
            let nbuckets = self.tables[idx].nbuckets;
            let (i1, i2) = Self::indices(hash, tag, nbuckets);
            if let Some(s) = self.tables[idx].find_tag_slot(i1, tag) {
                self.tables[idx].write_slot(i1, s, TAG_NULL);
                self.try_reinsert_victim(idx);
                return true;
            }
            if let Some(s) = self.tables[idx].find_tag_slot(i2, tag) {
                self.tables[idx].write_slot(i2, s, TAG_NULL);
                self.try_reinsert_victim(idx);
                return true;
            }
            if self.tables[idx].victim.used && self.tables[idx].victim.tag == tag {
                self.tables[idx].victim.used = false;
                return true;
            }
        }
        false
    }

    fn try_reinsert_victim(&mut self, idx: usize) {
        if !self.tables[idx].victim.used {
            return;
        }
        let v_index = self.tables[idx].victim.index;
        let v_tag = self.tables[idx].victim.tag;
        if let Some(s) = self.tables[idx].find_empty_slot(v_index) {
            self.tables[idx].write_slot(v_index, s, v_tag);
            self.tables[idx].victim.used = false;
        }
    }

    /// Collects per-table and aggregate stats (§4.1).
    pub fn stats(&self) -> CuckooStat {
        let mut ntags = 0usize;
        let mut used_memory = 0usize;
        let mut load_factors = Vec::with_capacity(self.tables.len());
        for t in &self.tables {
            used_memory += t.used_memory();
            let lf = t.load_factor();
            ntags += (lf * (t.nbuckets * TAGS_PER_BUCKET) as f64).round() as usize;
            load_factors.push(lf);
        }
        CuckooStat { ntags, used_memory, ntables: self.tables.len(), load_factors }
    }
}

use std::hash::{Hash, Hasher};

/// Extendible hash table used as the buffer pool's page table. The directory
/// holds `2^global_depth` slots, each pointing at a bucket of at most
/// `bucket_max_size` entries; a slot's key is the low `global_depth` bits of
/// the key hash. Overflowing a bucket splits it (doubling the directory when
/// the bucket's depth has caught up with the global depth); shrinking and
/// coalescing are not supported.
///
/// The table carries no lock of its own: it is only ever touched under the
/// buffer pool's mutex.
pub struct ExtendibleHashTable<K, V> {
    global_depth: u32,
    bucket_max_size: usize,
    /// Directory slot -> bucket index. Several slots may share a bucket
    /// while its local depth trails the global depth.
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

/// Hasher that passes integer keys through unchanged, so a key's low bits
/// are its own low bits. Page ids hash to themselves, which keeps directory
/// placement predictable.
#[derive(Default)]
struct PassThroughHasher(u64);

impl Hasher for PassThroughHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.rotate_left(8) ^ u64::from(b);
        }
    }

    fn write_u32(&mut self, n: u32) {
        self.0 = u64::from(n);
    }

    fn write_i32(&mut self, n: i32) {
        self.0 = n as u32 as u64;
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }

    fn write_i64(&mut self, n: i64) {
        self.0 = n as u64;
    }

    fn write_usize(&mut self, n: usize) {
        self.0 = n as u64;
    }
}

impl<K: Hash + Eq + Clone, V: Clone> ExtendibleHashTable<K, V> {
    pub fn new(bucket_max_size: usize) -> Self {
        Self {
            global_depth: 0,
            bucket_max_size,
            directory: vec![0],
            buckets: vec![Bucket {
                local_depth: 0,
                items: Vec::new(),
            }],
        }
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = PassThroughHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn directory_index(&self, key: &K) -> usize {
        (Self::hash_of(key) & ((1u64 << self.global_depth) - 1)) as usize
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Local depth of the bucket behind a directory slot.
    pub fn local_depth(&self, directory_index: usize) -> u32 {
        self.buckets[self.directory[directory_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = &self.buckets[self.directory[self.directory_index(key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let slot = self.directory_index(key);
        let bucket = &mut self.buckets[self.directory[slot]];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite. A full bucket splits (possibly repeatedly, when
    /// every resident key shares the new distinguishing bit) until the new
    /// key fits.
    pub fn insert(&mut self, key: K, value: V) {
        loop {
            let bucket_id = self.directory[self.directory_index(&key)];
            let bucket = &mut self.buckets[bucket_id];

            if let Some(item) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                item.1 = value;
                return;
            }
            if bucket.items.len() < self.bucket_max_size {
                bucket.items.push((key, value));
                return;
            }

            self.split_bucket(bucket_id);
        }
    }

    fn split_bucket(&mut self, bucket_id: usize) {
        let local_depth = self.buckets[bucket_id].local_depth;

        if local_depth == self.global_depth {
            // Double the directory: the upper half mirrors the lower.
            self.directory.extend_from_within(..);
            self.global_depth += 1;
        }

        // Partition by the newly significant bit. The zero half reuses the
        // old bucket slot; the one half becomes a fresh bucket.
        let mask = 1u64 << local_depth;
        let items = std::mem::take(&mut self.buckets[bucket_id].items);
        let (one_items, zero_items): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|(k, _)| Self::hash_of(k) & mask != 0);

        let one_bucket_id = self.buckets.len();
        self.buckets[bucket_id].local_depth = local_depth + 1;
        self.buckets[bucket_id].items = zero_items;
        self.buckets.push(Bucket {
            local_depth: local_depth + 1,
            items: one_items,
        });

        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == bucket_id && slot as u64 & mask != 0 {
                *target = one_bucket_id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let mut table: ExtendibleHashTable<i32, String> = ExtendibleHashTable::new(4);
        table.insert(1, "a".to_string());
        table.insert(2, "b".to_string());

        assert_eq!(table.find(&1), Some("a".to_string()));
        assert_eq!(table.find(&2), Some("b".to_string()));
        assert_eq!(table.find(&3), None);

        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(2);
        table.insert(7, 1);
        table.insert(7, 2);
        assert_eq!(table.find(&7), Some(2));
        assert_eq!(table.num_buckets(), 1);
    }

    #[test]
    fn test_split_on_overflow() {
        // Bucket size 2, depth 0. The third key forces one split.
        let mut table: ExtendibleHashTable<i32, char> = ExtendibleHashTable::new(2);
        table.insert(1, 'a');
        table.insert(2, 'b');
        table.insert(3, 'c');

        assert_eq!(table.global_depth(), 1);
        assert_eq!(table.num_buckets(), 2);
        assert_eq!(table.find(&1), Some('a'));
        assert_eq!(table.find(&2), Some('b'));
        assert_eq!(table.find(&3), Some('c'));
    }

    #[test]
    fn test_repeated_splits_keep_all_keys() {
        let mut table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(4);
        for i in 0..256 {
            table.insert(i, i * 10);
        }
        for i in 0..256 {
            assert_eq!(table.find(&i), Some(i * 10));
        }
        assert!(table.global_depth() >= 6);
    }

    #[test]
    fn test_bucket_placement_invariant() {
        // Every key in a bucket agrees with its directory slot on the low
        // local_depth bits.
        let mut table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(2);
        for i in 0..64 {
            table.insert(i, i);
        }
        for slot in 0..table.directory.len() {
            let local = table.local_depth(slot);
            let mask = (1u64 << local) - 1;
            for (k, _) in &table.buckets[table.directory[slot]].items {
                assert_eq!(
                    ExtendibleHashTable::<i32, i32>::hash_of(k) & mask,
                    slot as u64 & mask
                );
            }
        }
    }

    #[test]
    fn test_local_depth_bounded_by_global() {
        let mut table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(2);
        for i in 0..64 {
            table.insert(i, i);
        }
        for slot in 0..table.directory.len() {
            assert!(table.local_depth(slot) <= table.global_depth());
        }
    }
}

use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory in bytes which is accounted against the limits of a cache.
    ///
    /// For byte buffers and strings this is simply their length. Note that the key of an entry
    /// is accounted for by the cache itself.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Describes a callback which is invoked once an entry is evicted due to memory pressure.
///
/// The callback receives the key and the value of the evicted entry.
pub type EvictionListener<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, once
/// the accounted memory (the length of all keys and values) is above the given limit, old (least
/// recently used) entries will be evicted - hence the name LRU cache. Note that a limit of
/// **0** disables this constraint and turns the cache into an unbounded map.
///
/// Both reading and writing an entry marks it as recently used.
///
/// # Examples
/// ```
/// # use zcache::lru::LRUCache;
/// // Specifies a cache which can store up to 16 bytes of keys and values...
/// let mut lru = LRUCache::new(16);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "X".repeat(6));
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the max memory constraint...
/// lru.put("Foo2".to_owned(), "X".repeat(8));
/// // ..and therefore will throw the two others out:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), false);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    evictions: usize,
    map: LinkedHashMap<String, Entry<V>>,
    eviction_listener: Option<EvictionListener<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which can store entries until they allocated **max_memory** bytes.
    ///
    /// A **max_memory** of **0** creates an unbounded cache.
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            evictions: 0,
            map: LinkedHashMap::new(),
            eviction_listener: None,
        }
    }

    /// Creates a new cache which reports each evicted entry to the given listener.
    ///
    /// # Examples
    /// ```
    /// # use zcache::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let evicted_keys = evicted.clone();
    /// let mut lru = LRUCache::with_eviction_listener(
    ///     8,
    ///     Box::new(move |key: &str, _value: &String| evicted_keys.lock().unwrap().push(key.to_owned())),
    /// );
    ///
    /// lru.put("A".to_owned(), "123".to_owned());
    /// lru.put("B".to_owned(), "123".to_owned());
    /// lru.put("C".to_owned(), "123".to_owned());
    ///
    /// assert_eq!(evicted.lock().unwrap().as_slice(), &["A".to_owned()]);
    /// ```
    pub fn with_eviction_listener(max_memory: usize, listener: EvictionListener<V>) -> Self {
        let mut cache = LRUCache::new(max_memory);
        cache.eviction_listener = Some(listener);
        cache
    }

    /// Installs (or replaces) the listener which is notified about evicted entries.
    pub fn set_eviction_listener(&mut self, listener: EvictionListener<V>) {
        self.eviction_listener = Some(listener);
    }

    /// Stores the given value for the given key.
    ///
    /// If a value is already present for this key, it is replaced and the accounted memory is
    /// corrected accordingly. Afterwards, the least recently used entries are evicted until the
    /// cache fits into its **max_memory** again. Note that an entry which is larger than the whole
    /// cache will therefore be evicted right away.
    pub fn put(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        let mut delta_mem: isize = entry.mem_size as isize;

        // Note that LinkedHashMap::insert also moves an existing entry to the back...
        if let Some(stale_entry) = self.map.insert(key, entry) {
            delta_mem -= stale_entry.mem_size as isize;
        }

        self.writes += 1;
        self.allocated_memory = (self.allocated_memory as isize + delta_mem) as usize;

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            match self.map.pop_front() {
                Some((key, lru_entry)) => {
                    self.allocated_memory -= lru_entry.mem_size;
                    self.evictions += 1;
                    log::debug!("Evicted {} ({} bytes) from the cache.", key, lru_entry.mem_size);
                    if let Some(listener) = self.eviction_listener.as_mut() {
                        listener(&key, &lru_entry.value);
                    }
                }
                None => return,
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit marks the entry as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Removes the entry for the given key if present.
    ///
    /// Note that the eviction listener isn't notified, as the entry wasn't evicted due to
    /// memory pressure.
    pub fn remove(&mut self, key: &str) {
        self.writes += 1;

        if let Some(entry) = self.map.remove(key) {
            self.allocated_memory -= entry.mem_size;
        }
    }

    /// Removes all entries in this cache.
    ///
    /// Note that this will also zero all metrics (reads, writes, cache hits, evictions).
    pub fn flush(&mut self) {
        self.map.clear();
        self.allocated_memory = 0;
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
        self.evictions = 0;
    }

    /// Returns the number of elements in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximal amount of memory to be occupied by this cache (0 = unbounded).
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Specifies the maximal amount of memory to be occupied by this cache.
    ///
    /// Shrinking the limit immediately evicts entries (and notifies the eviction listener).
    ///
    /// # Examples
    /// ```
    /// # use zcache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// // Add some entries...
    /// lru.put("Foo0".to_owned(), "Bar".to_owned());
    /// lru.put("Foo1".to_owned(), "Bar".to_owned());
    /// lru.put("Foo2".to_owned(), "Bar".to_owned());
    /// lru.put("Foo3".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.len(), 4);
    ///
    /// // Now request that the cache is reduced to only 14 bytes...
    /// lru.set_max_memory(14);
    /// assert_eq!(lru.max_memory(), 14);
    ///
    /// // .. this will kick each but the last two entries out of the cache..
    /// assert_eq!(lru.len(), 2);
    /// ```
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints();
    }

    /// Returns the amount of memory allocated by the keys and values of this cache.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent (or 0 for an unbounded cache).
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            n => self.allocated_memory as f32 / n as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value since the last flush.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the number of entries evicted due to memory pressure since the last flush.
    pub fn evictions(&self) -> usize {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LRUCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn an_unbounded_cache_keeps_everything() {
        let mut lru = LRUCache::new(0);
        lru.put("key1".to_owned(), "1234".to_owned());
        assert_eq!(lru.get("key1").unwrap(), "1234");
        assert_eq!(lru.get("key2"), None);

        for index in 0..1000 {
            lru.put(format!("key-{}", index), "X".repeat(64));
        }
        assert_eq!(lru.len(), 1001);
        assert_eq!(lru.evictions(), 0);
    }

    #[test]
    fn the_least_recently_used_entry_is_evicted() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let max_memory = k1.len() + k2.len() + v1.len() + v2.len();

        let mut lru = LRUCache::new(max_memory);
        lru.put(k1.to_owned(), v1.to_owned());
        lru.put(k2.to_owned(), v2.to_owned());
        lru.put(k3.to_owned(), v3.to_owned());

        assert_eq!(lru.get(k1), None);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.evictions(), 1);
    }

    #[test]
    fn reading_an_entry_protects_it() {
        let mut lru = LRUCache::new(12 * 3);
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());

        // "use" the oldest entry so that the next one in line is evicted...
        let _ = lru.get("Hello0");
        lru.put("Hello3".to_owned(), "World3".to_owned());

        assert_eq!(lru.get("Hello0").unwrap(), "World0");
        assert_eq!(lru.get("Hello1"), None);
        assert_eq!(lru.get("Hello2").unwrap(), "World2");
        assert_eq!(lru.get("Hello3").unwrap(), "World3");
    }

    #[test]
    fn evicted_entries_are_reported_in_lru_order() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted_keys = evicted.clone();
        let mut lru = LRUCache::with_eviction_listener(
            10,
            Box::new(move |key: &str, _value: &String| {
                evicted_keys.lock().unwrap().push(key.to_owned())
            }),
        );

        // Exactly fills the cache...
        lru.put("key1".to_owned(), "123456".to_owned());
        assert_eq!(evicted.lock().unwrap().len(), 0);

        // ...therefore adding this pushes "key1" out...
        lru.put("k2".to_owned(), "v2".to_owned());
        lru.put("k3".to_owned(), "v3".to_owned());

        // ...and this one pushes "k2" out.
        lru.put("K4".to_owned(), "v4".to_owned());

        assert_eq!(
            evicted.lock().unwrap().as_slice(),
            &["key1".to_owned(), "k2".to_owned()]
        );
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LRUCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the cache....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we remove an entry, the used memory is corrected...
        lru.remove("Hello0");
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3 - 6);

        // Restore the original entry, so that the cache has three entries with 12 bytes each...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // Adding another 12 and then 13 bytes pushes the two oldest entries out...
        lru.put("Hello4".to_owned(), "World0".to_owned());
        lru.put("Hello0".to_owned(), "World01".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3 + 1);
        assert_eq!(lru.len(), 3);
        // "Hello2" was the least recently touched entry...
        assert_eq!(lru.get("Hello2"), None);
        assert_eq!(lru.get("Hello3"), None);
    }

    #[test]
    fn overwriting_does_not_notify_the_listener() {
        let evicted = Arc::new(Mutex::new(0));
        let counter = evicted.clone();
        let mut lru = LRUCache::with_eviction_listener(
            100,
            Box::new(move |_key: &str, _value: &String| *counter.lock().unwrap() += 1),
        );

        lru.put("Foo".to_owned(), "Bar".to_owned());
        lru.put("Foo".to_owned(), "Bar1".to_owned());
        lru.put("Foo".to_owned(), "Bar".to_owned());

        assert_eq!(*evicted.lock().unwrap(), 0);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.allocated_memory(), 6);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);

        // Write 3 values into the cache...
        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // The cache contains 6 bytes of data and has a max memory of 10 -> 60% memory utilization..
        assert_eq!(lru.allocated_memory(), 6);
        assert_eq!(lru.memory_utilization().round() as i32, 60);

        // Flushing wipes all contents and metrics...
        lru.flush();
        assert_eq!(lru.is_empty(), true);
        assert_eq!(lru.reads(), 0);
        assert_eq!(lru.allocated_memory(), 0);
    }
}

//! Open-addressed hash table with per-bucket chaining.
//!
//! The table keeps a power-of-two bucket array and links colliding entries
//! through an explicit `next` pointer, newest first. Growth doubles the bucket
//! array once `len + 1` would exceed `capacity × load_factor`, relinking every
//! entry at the head of its new bucket. Removal unlinks immediately, so there
//! are no tombstones.
//!
//! Hashing and key equality are chosen at the type level through a
//! [`KeyHasher`] policy. Three policies ship with the crate:
//!
//! | Policy | Keys | Hash |
//! |---|---|---|
//! | [`Djb2`] | `String` / `str` | djb2 (`h * 33 + c`) |
//! | [`Fnv1a`] | fixed-width integers | FNV-1a over the little-endian bytes |
//! | [`Identity`] | `&T` | pointer address, no ownership |
//!
//! The table is not internally locked. Share it across threads behind a
//! mutex.
//!
//! ```rust
//! use relaymcp_core::hashmap::StringMap;
//!
//! let mut routes: StringMap<u32> = StringMap::new();
//! routes.put("example://alpha".to_string(), 1)?;
//! assert_eq!(routes.get("example://alpha"), Some(&1));
//! # Ok::<(), relaymcp_core::hashmap::TableError>(())
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

/// Smallest bucket count a table is created with
pub const MIN_CAPACITY: usize = 16;

/// Load-factor threshold used when none (or an out-of-range one) is given
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Result type alias for table operations
pub type TableResult<T> = std::result::Result<T, TableError>;

/// Errors reported by [`HashMap`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TableError {
    /// The bucket array could not be allocated; the table is unchanged.
    #[error("Failed to allocate {requested} buckets")]
    AllocationFailed {
        /// Bucket count that was requested
        requested: usize,
    },

    /// Doubling the capacity would overflow `usize`.
    #[error("Capacity overflow growing from {current} buckets")]
    CapacityOverflow {
        /// Capacity at the time of the failed growth
        current: usize,
    },

    /// A batch insert stopped early.
    #[error("Batch insert stopped after {inserted} entries: {source}")]
    PartialBatch {
        /// Entries inserted before the failure
        inserted: usize,
        /// The failure that stopped the batch
        source: Box<TableError>,
    },
}

/// Hash and equality policy for keys of type `Q`
pub trait KeyHasher<Q: ?Sized> {
    /// Hash a key. Only the low bits selected by the bucket mask are used.
    fn hash(key: &Q) -> u64;

    /// Key equality
    fn eq(a: &Q, b: &Q) -> bool;
}

/// djb2 string hashing with byte-wise equality
#[derive(Debug, Clone, Copy, Default)]
pub struct Djb2;

impl Djb2 {
    /// djb2 over raw bytes
    pub fn hash_bytes(bytes: &[u8]) -> u64 {
        bytes.iter().fold(5381u64, |hash, &b| {
            (hash << 5).wrapping_add(hash).wrapping_add(u64::from(b))
        })
    }
}

impl KeyHasher<str> for Djb2 {
    fn hash(key: &str) -> u64 {
        Self::hash_bytes(key.as_bytes())
    }

    fn eq(a: &str, b: &str) -> bool {
        a == b
    }
}

impl KeyHasher<String> for Djb2 {
    fn hash(key: &String) -> u64 {
        Self::hash_bytes(key.as_bytes())
    }

    fn eq(a: &String, b: &String) -> bool {
        a == b
    }
}

/// 64-bit FNV-1a over a key's little-endian bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a;

impl Fnv1a {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// FNV-1a over raw bytes
    pub fn hash_bytes(bytes: &[u8]) -> u64 {
        bytes.iter().fold(Self::OFFSET_BASIS, |hash, &b| {
            (hash ^ u64::from(b)).wrapping_mul(Self::PRIME)
        })
    }
}

/// Integer types hashable by [`Fnv1a`]
pub trait FixedWidthKey: Copy + Eq {
    /// Visit the key's little-endian byte representation
    fn with_le_bytes<R>(self, f: impl FnOnce(&[u8]) -> R) -> R;
}

macro_rules! fixed_width_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FixedWidthKey for $ty {
                fn with_le_bytes<R>(self, f: impl FnOnce(&[u8]) -> R) -> R {
                    f(&self.to_le_bytes())
                }
            }
        )*
    };
}

fixed_width_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl<K: FixedWidthKey> KeyHasher<K> for Fnv1a {
    fn hash(key: &K) -> u64 {
        key.with_le_bytes(Self::hash_bytes)
    }

    fn eq(a: &K, b: &K) -> bool {
        a == b
    }
}

/// Pointer-identity policy for borrowed, non-owning keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: ?Sized> KeyHasher<&T> for Identity {
    fn hash(key: &&T) -> u64 {
        // murmur3 finalizer spreads the aligned low bits
        let mut h = (*key as *const T).cast::<()>() as usize as u64;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^ (h >> 33)
    }

    fn eq(a: &&T, b: &&T) -> bool {
        std::ptr::eq(*a, *b)
    }
}

type Link<K, V> = Option<Box<Entry<K, V>>>;

struct Entry<K, V> {
    key: K,
    value: V,
    next: Link<K, V>,
}

/// Chained hash table with a power-of-two bucket array
pub struct HashMap<K, V, H> {
    buckets: Vec<Link<K, V>>,
    len: usize,
    load_factor: f32,
    _hasher: PhantomData<fn() -> H>,
}

/// String-keyed table (djb2)
pub type StringMap<V> = HashMap<String, V, Djb2>;

/// Integer-keyed table (FNV-1a)
pub type IntMap<K, V> = HashMap<K, V, Fnv1a>;

/// Pointer-identity table over borrowed keys
pub type IdentityMap<'a, T, V> = HashMap<&'a T, V, Identity>;

impl<K, V, H> HashMap<K, V, H>
where
    H: KeyHasher<K>,
{
    /// Create a table with [`MIN_CAPACITY`] buckets and the default load factor
    pub fn new() -> Self {
        Self {
            buckets: std::iter::repeat_with(|| None).take(MIN_CAPACITY).collect(),
            len: 0,
            load_factor: DEFAULT_LOAD_FACTOR,
            _hasher: PhantomData,
        }
    }

    /// Create a table with at least `capacity` buckets
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AllocationFailed`] if the bucket array cannot be
    /// allocated.
    pub fn with_capacity(capacity: usize) -> TableResult<Self> {
        Self::with_capacity_and_load_factor(capacity, DEFAULT_LOAD_FACTOR)
    }

    /// Create a table with explicit capacity and load-factor threshold
    ///
    /// The capacity is rounded up to a power of two (minimum 16). A load
    /// factor outside `(0, 1)` falls back to 0.75.
    ///
    /// # Errors
    ///
    /// Returns an error if the rounded capacity overflows or cannot be
    /// allocated.
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f32) -> TableResult<Self> {
        let capacity = capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(TableError::CapacityOverflow { current: capacity })?;
        let load_factor = if load_factor > 0.0 && load_factor < 1.0 {
            load_factor
        } else {
            DEFAULT_LOAD_FACTOR
        };

        Ok(Self {
            buckets: allocate_buckets(capacity)?,
            len: 0,
            load_factor,
            _hasher: PhantomData,
        })
    }

    /// Insert or replace
    ///
    /// Replacing an existing key swaps the value in place and returns the old
    /// value; the size does not change. A new key may double the bucket array
    /// first.
    ///
    /// # Errors
    ///
    /// Growth failure aborts the insert and leaves the table (including its
    /// capacity) unchanged.
    pub fn put(&mut self, key: K, value: V) -> TableResult<Option<V>> {
        let index = self.index_of(&key);
        let mut cursor = self.buckets[index].as_deref_mut();
        while let Some(entry) = cursor {
            if H::eq(&entry.key, &key) {
                return Ok(Some(mem::replace(&mut entry.value, value)));
            }
            cursor = entry.next.as_deref_mut();
        }

        if self.exceeds_threshold(self.len + 1) {
            let current = self.capacity();
            let doubled = current
                .checked_mul(2)
                .ok_or(TableError::CapacityOverflow { current })?;
            self.resize(doubled)?;
        }

        let index = self.index_of(&key);
        let head = self.buckets[index].take();
        self.buckets[index] = Some(Box::new(Entry {
            key,
            value,
            next: head,
        }));
        self.len += 1;
        Ok(None)
    }

    /// Insert many pairs, stopping at the first failure
    ///
    /// # Errors
    ///
    /// Returns [`TableError::PartialBatch`] carrying the number of pairs that
    /// were inserted before the failure.
    pub fn put_batch<I>(&mut self, pairs: I) -> TableResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut inserted = 0;
        for (key, value) in pairs {
            if let Err(source) = self.put(key, value) {
                return Err(TableError::PartialBatch {
                    inserted,
                    source: Box::new(source),
                });
            }
            inserted += 1;
        }
        Ok(inserted)
    }

    fn resize(&mut self, new_capacity: usize) -> TableResult<()> {
        let new_buckets = allocate_buckets(new_capacity)?;
        let old = mem::replace(&mut self.buckets, new_buckets);
        let mask = new_capacity - 1;

        for mut link in old {
            while let Some(mut entry) = link {
                link = entry.next.take();
                let index = (H::hash(&entry.key) as usize) & mask;
                entry.next = self.buckets[index].take();
                self.buckets[index] = Some(entry);
            }
        }
        tracing::trace!("Hash table resized to {} buckets", new_capacity);
        Ok(())
    }
}

impl<K, V, H> HashMap<K, V, H> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket count (always a power of two)
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Load-factor threshold that triggers growth
    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    fn exceeds_threshold(&self, size: usize) -> bool {
        size as f64 > self.capacity() as f64 * f64::from(self.load_factor)
    }

    fn index_of<Q: ?Sized>(&self, key: &Q) -> usize
    where
        H: KeyHasher<Q>,
    {
        (H::hash(key) as usize) & (self.buckets.len() - 1)
    }

    /// Look up a value
    pub fn get<Q: ?Sized>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let mut cursor = self.buckets[self.index_of(key)].as_deref();
        while let Some(entry) = cursor {
            if H::eq(entry.key.borrow(), key) {
                return Some(&entry.value);
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    /// Look up a value mutably
    pub fn get_mut<Q: ?Sized>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let index = self.index_of(key);
        let mut cursor = self.buckets[index].as_deref_mut();
        while let Some(entry) = cursor {
            if H::eq(entry.key.borrow(), key) {
                return Some(&mut entry.value);
            }
            cursor = entry.next.as_deref_mut();
        }
        None
    }

    /// Whether a key is present
    pub fn contains_key<Q: ?Sized>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        self.get(key).is_some()
    }

    /// Unlink an entry, returning its value
    pub fn remove<Q: ?Sized>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let index = self.index_of(key);
        let mut link = &mut self.buckets[index];
        while link
            .as_ref()
            .is_some_and(|entry| !H::eq(entry.key.borrow(), key))
        {
            link = &mut link.as_mut()?.next;
        }

        let mut removed = link.take()?;
        *link = removed.next.take();
        self.len -= 1;
        Some(removed.value)
    }

    /// Drop every entry, keeping the current capacity
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            let mut link = bucket.take();
            while let Some(mut entry) = link {
                link = entry.next.take();
            }
        }
        self.len = 0;
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        for bucket in &mut self.buckets {
            let mut link = bucket.take();
            while let Some(mut entry) = link {
                link = entry.next.take();
                if keep(&entry.key, &mut entry.value) {
                    entry.next = bucket.take();
                    *bucket = Some(entry);
                } else {
                    self.len -= 1;
                }
            }
        }
    }

    /// Visit every entry
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self.iter() {
            f(key, value);
        }
    }

    /// Iterate over entries in bucket order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            current: None,
            remaining: self.len,
        }
    }
}

impl<K, V, H> Default for HashMap<K, V, H>
where
    H: KeyHasher<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> Drop for HashMap<K, V, H> {
    fn drop(&mut self) {
        // Iterative unlinking keeps long chains off the stack
        self.clear();
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for HashMap<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, H> IntoIterator for &'a HashMap<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over a [`HashMap`]
pub struct Iter<'a, K, V> {
    buckets: std::slice::Iter<'a, Link<K, V>>,
    current: Option<&'a Entry<K, V>>,
    remaining: usize,
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current {
                self.current = entry.next.as_deref();
                self.remaining -= 1;
                return Some((&entry.key, &entry.value));
            }
            self.current = self.buckets.next()?.as_deref();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

fn allocate_buckets<K, V>(capacity: usize) -> TableResult<Vec<Link<K, V>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|_| TableError::AllocationFailed {
            requested: capacity,
        })?;
    buckets.resize_with(capacity, || None);
    Ok(buckets)
}

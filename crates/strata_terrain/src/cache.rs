//! # Chunk Cache
//!
//! Thread-safe fixed-capacity LRU of decoded chunks.
//!
//! The cache is a doubly-linked list of `(coordinate, chunk)` nodes threaded
//! through a slab, with a side map from coordinate to slab index. The
//! most-recently-used entry sits at the front; inserting past capacity
//! evicts the tail and hands it back to the caller for write-back.
//!
//! ## Locking
//!
//! One reader-writer lock guards the whole structure. `get` takes the
//! *write* side because a hit reorders the recency list; a read lock would
//! race with concurrent reorders.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::chunk::TerrainChunk;
use crate::coord::ChunkCoord;

/// Sentinel slab index for "no node".
const NIL: usize = usize::MAX;

struct Node {
    coord: ChunkCoord,
    chunk: TerrainChunk,
    prev: usize,
    next: usize,
}

struct LruInner {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    map: HashMap<ChunkCoord, usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl LruInner {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity + 1),
            free: Vec::new(),
            map: HashMap::with_capacity(capacity + 1),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    fn detach(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.nodes[index].as_ref().expect("detached a free slot");
            (node.prev, node.next)
        };
        match prev {
            NIL => self.head = next,
            p => self.nodes[p].as_mut().expect("corrupt lru link").next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.nodes[n].as_mut().expect("corrupt lru link").prev = prev,
        }
    }

    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = self.nodes[index].as_mut().expect("pushed a free slot");
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head != NIL {
            self.nodes[old_head].as_mut().expect("corrupt lru link").prev = index;
        }
        self.head = index;
        if self.tail == NIL {
            self.tail = index;
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(index) = self.free.pop() {
            self.nodes[index] = Some(node);
            index
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn pop_tail(&mut self) -> Option<(ChunkCoord, TerrainChunk)> {
        let index = self.tail;
        if index == NIL {
            return None;
        }
        self.detach(index);
        let node = self.nodes[index].take().expect("corrupt lru tail");
        self.free.push(index);
        self.map.remove(&node.coord);
        Some((node.coord, node.chunk))
    }
}

/// Fixed-capacity LRU of decoded chunks keyed by coordinate.
pub struct ChunkCache {
    inner: RwLock<LruInner>,
}

impl ChunkCache {
    /// Creates a cache holding at most `capacity` chunks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk cache capacity must be at least 1");
        Self {
            inner: RwLock::new(LruInner::new(capacity)),
        }
    }

    /// Looks up a chunk, promoting it to most-recently-used on a hit.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<TerrainChunk> {
        let mut inner = self.inner.write();
        let index = *inner.map.get(&coord)?;
        inner.detach(index);
        inner.push_front(index);
        Some(
            inner.nodes[index]
                .as_ref()
                .expect("corrupt lru map entry")
                .chunk
                .clone(),
        )
    }

    /// Inserts or overwrites a chunk at most-recently-used position.
    ///
    /// Overwriting an existing coordinate never evicts. A fresh insert past
    /// capacity removes the least-recently-used entry and returns it for
    /// write-back.
    pub fn put(
        &self,
        coord: ChunkCoord,
        chunk: TerrainChunk,
    ) -> Option<(ChunkCoord, TerrainChunk)> {
        let mut inner = self.inner.write();

        if let Some(&index) = inner.map.get(&coord) {
            inner.nodes[index]
                .as_mut()
                .expect("corrupt lru map entry")
                .chunk = chunk;
            inner.detach(index);
            inner.push_front(index);
            return None;
        }

        let index = inner.alloc(Node {
            coord,
            chunk,
            prev: NIL,
            next: NIL,
        });
        inner.push_front(index);
        inner.map.insert(coord, index);

        if inner.map.len() > inner.capacity {
            inner.pop_tail()
        } else {
            None
        }
    }

    /// Snapshots all entries in MRU-to-LRU order.
    ///
    /// Used by the close path to flush every cached chunk back to disk.
    #[must_use]
    pub fn entries(&self) -> Vec<(ChunkCoord, TerrainChunk)> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(inner.map.len());
        let mut index = inner.head;
        while index != NIL {
            let node = inner.nodes[index].as_ref().expect("corrupt lru walk");
            out.push((node.coord, node.chunk.clone()));
            index = node.next;
        }
        out
    }

    /// Number of cached chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    /// True iff the cache holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of chunks the cache will hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::MaterialPalette;

    fn chunk(base_height: u8) -> TerrainChunk {
        TerrainChunk::new(0, base_height, MaterialPalette::default()).unwrap()
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = ChunkCache::new(2);
        let a = ChunkCoord::new(0, 0);
        let b = ChunkCoord::new(1, 0);
        let c = ChunkCoord::new(2, 0);

        assert!(cache.put(a, chunk(1)).is_none());
        assert!(cache.put(b, chunk(2)).is_none());

        // Touch `a` so `b` becomes least recently used.
        assert!(cache.get(a).is_some());

        let evicted = cache.put(c, chunk(3)).expect("capacity exceeded");
        assert_eq!(evicted.0, b);
        assert_eq!(evicted.1.base_height(), 2);

        assert!(cache.get(a).is_some());
        assert!(cache.get(c).is_some());
        assert!(cache.get(b).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_overwrite_moves_to_front_without_eviction() {
        let cache = ChunkCache::new(2);
        let a = ChunkCoord::new(0, 0);
        let b = ChunkCoord::new(1, 0);

        cache.put(a, chunk(1));
        cache.put(b, chunk(2));

        // Overwrite `a`: no eviction, and `a` is now MRU.
        assert!(cache.put(a, chunk(9)).is_none());
        assert_eq!(cache.entries()[0].0, a);
        assert_eq!(cache.get(a).unwrap().base_height(), 9);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_entries_mru_first() {
        let cache = ChunkCache::new(3);
        for x in 0..3 {
            cache.put(ChunkCoord::new(x, 0), chunk(x as u8));
        }

        let order: Vec<u32> = cache.entries().iter().map(|(c, _)| c.x).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_capacity_one() {
        let cache = ChunkCache::new(1);
        let a = ChunkCoord::new(0, 0);
        let b = ChunkCoord::new(1, 0);

        assert!(cache.put(a, chunk(1)).is_none());
        let evicted = cache.put(b, chunk(2)).expect("tail evicted");
        assert_eq!(evicted.0, a);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_slot_reuse_after_eviction() {
        let cache = ChunkCache::new(2);
        assert_eq!(cache.capacity(), 2);

        for x in 0..10 {
            cache.put(ChunkCoord::new(x, 0), chunk((x % 32) as u8));
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(ChunkCoord::new(9, 0)).is_some());
        assert!(cache.get(ChunkCoord::new(8, 0)).is_some());
    }
}

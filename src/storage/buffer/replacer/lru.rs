use linked_hash_map::LinkedHashMap;

use crate::common::types::FrameId;

/// LRU (Least Recently Used) replacement policy over unpinned frames.
///
/// The map keeps insertion order: the front entry is the LRU victim and
/// new unpins land at the back. All operations are O(1). The replacer
/// tracks candidates only; eviction happens when the buffer pool asks.
pub struct LruReplacer {
    lru_list: LinkedHashMap<FrameId, ()>,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            lru_list: LinkedHashMap::with_capacity(pool_size),
        }
    }

    /// A page in this frame was pinned; it is no longer an eviction candidate.
    pub fn pin(&mut self, frame_id: FrameId) {
        self.lru_list.remove(&frame_id);
    }

    /// The frame's pin count dropped to zero; it becomes the most recently
    /// used candidate. A frame already present keeps its position.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if !self.lru_list.contains_key(&frame_id) {
            self.lru_list.insert(frame_id, ());
        }
    }

    /// Remove and return the least recently used frame, if any.
    pub fn victim(&mut self) -> Option<FrameId> {
        self.lru_list.pop_front().map(|(frame_id, _)| frame_id)
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.lru_list.len()
    }
}

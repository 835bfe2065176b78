use crate::core::event::Event;
use ordered_float::NotNan;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Heap key: event time, then insertion sequence for a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    time: NotNan<f64>,
    seq: u64,
}

/// Time-ordered schedule of pending events with lazy invalidation.
///
/// Events live in a `seq -> Event` map; the heap holds only `(time, seq)`
/// keys. `invalidate_all` cancels through the reverse index by removing the
/// map entries; the matching heap keys die lazily when popped. Removing a
/// key mid-heap is never attempted.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    pending: HashMap<u64, Event>,
    by_particle: HashMap<u32, Vec<u64>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event into the schedule.
    pub fn schedule(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(HeapEntry {
            time: event.time,
            seq,
        }));
        let (i, j) = event.participants();
        self.by_particle.entry(i).or_default().push(seq);
        if let Some(j) = j {
            self.by_particle.entry(j).or_default().push(seq);
        }
        self.pending.insert(seq, event);
    }

    /// Extract the earliest still-live event, skipping cancelled entries.
    ///
    /// Performs no recomputation; a `None` means the schedule is empty.
    pub fn pop_min(&mut self) -> Option<Event> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if let Some(event) = self.pending.remove(&entry.seq) {
                self.unindex(&event, entry.seq);
                return Some(event);
            }
            // cancelled entry; its map slot is already gone
        }
        None
    }

    /// Cancel every pending event referencing `id`.
    ///
    /// Walks the reverse index instead of the heap; heap keys for cancelled
    /// events are discarded lazily by `pop_min`.
    pub fn invalidate_all(&mut self, id: u32) {
        let Some(seqs) = self.by_particle.remove(&id) else {
            return;
        };
        for seq in seqs {
            if let Some(event) = self.pending.remove(&seq) {
                self.unindex_excluding(&event, seq, id);
            }
        }
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
        self.by_particle.clear();
    }

    /// Number of live (non-cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn unindex(&mut self, event: &Event, seq: u64) {
        let (i, j) = event.participants();
        self.drop_index_entry(i, seq);
        if let Some(j) = j {
            self.drop_index_entry(j, seq);
        }
    }

    fn unindex_excluding(&mut self, event: &Event, seq: u64, skip: u32) {
        let (i, j) = event.participants();
        if i != skip {
            self.drop_index_entry(i, seq);
        }
        if let Some(j) = j {
            if j != skip {
                self.drop_index_entry(j, seq);
            }
        }
    }

    fn drop_index_entry(&mut self, id: u32, seq: u64) {
        let emptied = match self.by_particle.get_mut(&id) {
            Some(list) => {
                list.retain(|&s| s != seq);
                list.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_particle.remove(&id);
        }
    }
}

//! Reference-counting heap.
//!
//! Values live in an arena of slots addressed by [`ValueId`] handles;
//! each slot carries its own reference count. There is no mark phase:
//! [`Heap::collect`] reclaims exactly the entries whose count is zero
//! and is expected to run once per executed instruction.

use super::value::{HeapValue, Slot};

/// Handle to a heap-allocated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub usize);

#[derive(Debug)]
struct Entry {
    value: HeapValue,
    refs: usize,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free: Vec::new(),
        }
    }

    /// Allocates a value with a reference count of zero. A fresh value
    /// survives only if something references it before the next sweep.
    pub fn alloc(&mut self, value: HeapValue) -> ValueId {
        let entry = Entry { value, refs: 0 };
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(entry);
                ValueId(i)
            }
            None => {
                self.slots.push(Some(entry));
                ValueId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: ValueId) -> &HeapValue {
        self.slots[id.0]
            .as_ref()
            .map(|e| &e.value)
            .expect("value was garbage collected")
    }

    /// Current reference count; zero for dead handles and the marker.
    pub fn refs(&self, slot: Slot) -> usize {
        slot.and_then(|id| self.slots.get(id.0))
            .and_then(|s| s.as_ref())
            .map_or(0, |e| e.refs)
    }

    /// Number of live values.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Increments the reference count. No-op for the no-value marker.
    pub fn add_ref(&mut self, slot: Slot) {
        if let Some(entry) = slot.and_then(|id| self.slots[id.0].as_mut()) {
            entry.refs += 1;
        }
    }

    /// Decrements the reference count, saturating at zero. No-op for
    /// the no-value marker.
    pub fn remove_ref(&mut self, slot: Slot) {
        if let Some(entry) = slot.and_then(|id| self.slots[id.0].as_mut()) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    /// Frees every entry whose count is zero and returns how many were
    /// reclaimed. Freeing a list releases one reference per element,
    /// so the sweep repeats until it reaches a fixed point.
    pub fn collect(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut freed = 0;
            let mut released: Vec<Slot> = Vec::new();
            for i in 0..self.slots.len() {
                let dead = matches!(&self.slots[i], Some(e) if e.refs == 0);
                if !dead {
                    continue;
                }
                let entry = self.slots[i].take().expect("checked above");
                if let HeapValue::List(items) = entry.value {
                    released.extend(items);
                }
                self.free.push(i);
                freed += 1;
            }
            total += freed;
            for slot in released {
                self.remove_ref(slot);
            }
            if freed == 0 {
                return total;
            }
        }
    }
}

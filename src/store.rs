//! Ordered, handle-addressed container for one record kind.
//!
//! Elements live in a slot arena threaded by a doubly linked list, which
//! gives O(1) append and O(1) erase-by-handle while iteration still follows
//! insertion order. Freed slots are recycled; a generation counter per slot
//! makes handles to erased elements permanently stale.

/// Stable reference to an element of a [`RecordStore`].
///
/// Valid until the element it names is erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Insertion-ordered store of homogeneous records.
///
/// No uniqueness is enforced: callers check for an existing element before
/// appending where a key must be unique.
#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> RecordStore<T> {
    pub fn new() -> Self {
        RecordStore {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `value` at the tail and returns its handle.
    pub fn append(&mut self, value: T) -> Handle {
        let entry = Entry {
            value,
            prev: self.tail,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(prev) = self.entry_mut(tail) {
                    prev.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        Handle {
            slot: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Appends a zero-initialized element.
    pub fn append_default(&mut self) -> Handle
    where
        T: Default,
    {
        self.append(T::default())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.live_index(handle)
            .and_then(|index| self.slots[index].entry.as_ref())
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let index = self.live_index(handle)?;
        self.entry_mut(index).map(|entry| &mut entry.value)
    }

    /// Unlinks the element named by `handle`.
    ///
    /// Returns `false` without touching the store if the handle is stale.
    pub fn erase(&mut self, handle: Handle) -> bool {
        let index = match self.live_index(handle) {
            Some(index) => index,
            None => return false,
        };

        let slot = &mut self.slots[index];
        let entry = match slot.entry.take() {
            Some(entry) => entry,
            None => return false,
        };
        slot.generation = slot.generation.wrapping_add(1);

        match entry.prev {
            Some(prev) => {
                if let Some(prev) = self.entry_mut(prev) {
                    prev.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                if let Some(next) = self.entry_mut(next) {
                    next.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }

        self.free.push(index);
        self.len -= 1;
        true
    }

    /// Returns the first element equal to `target` in every field.
    pub fn find(&self, target: &T) -> Option<Handle>
    where
        T: PartialEq,
    {
        self.match_first(|value| value == target)
    }

    /// Returns the first element for which `predicate` holds.
    pub fn match_first<F>(&self, mut predicate: F) -> Option<Handle>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter()
            .find(|(_, value)| predicate(value))
            .map(|(handle, _)| handle)
    }

    /// Handle of the `n`-th element in insertion order (0-based).
    pub fn nth(&self, n: usize) -> Option<Handle> {
        self.iter().nth(n).map(|(handle, _)| handle)
    }

    /// Iterates `(handle, element)` pairs in insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            store: self,
            cursor: self.head,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.iter().map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn live_index(&self, handle: Handle) -> Option<usize> {
        let index = handle.slot as usize;
        let slot = self.slots.get(index)?;
        if slot.generation == handle.generation && slot.entry.is_some() {
            Some(index)
        } else {
            None
        }
    }

    fn entry_mut(&mut self, index: usize) -> Option<&mut Entry<T>> {
        self.slots.get_mut(index).and_then(|slot| slot.entry.as_mut())
    }
}

impl<T> Default for RecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for RecordStore<T> {
    /// Two stores are equal when they hold equal elements in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.values().eq(other.values())
    }
}

impl<T> FromIterator<T> for RecordStore<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut store = RecordStore::new();
        for value in iter {
            store.append(value);
        }
        store
    }
}

/// Insertion-order iterator over a [`RecordStore`].
pub struct Iter<'a, T> {
    store: &'a RecordStore<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.store.slots[index];
        let entry = slot.entry.as_ref()?;
        self.cursor = entry.next;
        Some((
            Handle {
                slot: index as u32,
                generation: slot.generation,
            },
            &entry.value,
        ))
    }
}

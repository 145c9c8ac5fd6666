/// Fixed-capacity history that overwrites its oldest entry once full.
///
/// Storage is reserved up front, so pushing never allocates.
#[derive(Debug, Clone)]
pub struct RingHistory<T> {
    entries: Vec<T>,
    capacity: usize,
    /// Slot the next push goes into once `entries` is full.
    next: usize,
}

impl<T: Clone> RingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            self.entries[self.next] = entry;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.entries.len() == self.capacity
    }

    pub fn newest(&self) -> Option<&T> {
        if self.entries.is_empty() {
            return None;
        }
        let index = (self.next + self.capacity - 1) % self.capacity;
        self.entries.get(index)
    }

    pub fn oldest(&self) -> Option<&T> {
        if self.is_full() {
            self.entries.get(self.next)
        } else {
            self.entries.first()
        }
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.is_full() { self.next } else { 0 };
        self.entries[split..].iter().chain(self.entries[..split].iter())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }
}

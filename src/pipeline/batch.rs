/// Fixed-capacity accumulator owned by a single fetch worker.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Batch<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`; returns the completed batch once capacity is reached
    /// and starts a fresh one.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.capacity {
            let full = std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity));
            return Some(full);
        }
        None
    }

    /// Drains whatever is left, if anything.
    pub fn take_remaining(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.items))
    }
}

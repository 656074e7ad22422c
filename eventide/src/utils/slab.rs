/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and returns
/// stable indices (tokens) that are reused after removal.
///
/// Internally, it keeps track of:
/// - occupied slots,
/// - free indices,
/// - the number of live entries.
///
/// The event loop uses it to track outstanding I/O registrations: every
/// registration owns exactly one token until its completion message has
/// been received, so a token is never observed twice.
pub(crate) struct Slab<T> {
    /// Storage for items (`None` marks a free slot).
    items: Vec<Option<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| None).collect();
        let free = (0..size).rev().collect();

        Self {
            items,
            free,
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items.extend((len..new_len).map(|_| None));
            self.free.extend(((len + 1)..new_len).rev());

            len
        };

        self.items[index] = Some(item);
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// Returns `None` if the slot is out of range or already free.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;

        self.free.push(index);
        self.len -= 1;

        Some(item)
    }

    /// Returns the number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every value, keeping the allocated slots.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);

        for (index, slot) in self.items.iter_mut().enumerate() {
            if let Some(item) = slot.take() {
                self.free.push(index);
                out.push(item);
            }
        }

        self.len = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn insert_reuses_freed_slots() {
        let mut slab = Slab::new(2);

        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_ne!(a, b);
        assert_eq!(slab.len(), 2);

        assert_eq!(slab.remove(a), Some("a"));
        let c = slab.insert("c");
        assert_eq!(c, a);
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::new(1);
        let tokens: Vec<usize> = (0..5).map(|i| slab.insert(i)).collect();

        assert_eq!(slab.len(), 5);
        for (value, token) in tokens.into_iter().enumerate() {
            assert_eq!(slab.remove(token), Some(value));
        }
        assert!(slab.is_empty());
    }

    #[test]
    fn double_remove_is_none() {
        let mut slab = Slab::new(0);
        let token = slab.insert(7u8);

        assert_eq!(slab.remove(token), Some(7));
        assert_eq!(slab.remove(token), None);
        assert_eq!(slab.remove(99), None);
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = Slab::new(4);
        slab.insert(1);
        slab.insert(2);

        let mut drained = slab.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(slab.is_empty());
    }
}

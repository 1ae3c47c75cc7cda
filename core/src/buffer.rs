/// Fixed-capacity circular buffer of plot samples.
///
/// When the buffer is full, the oldest sample is overwritten.
/// Thread-safe access is provided externally via a `Mutex`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    /// Next index to write to.
    write_pos: usize,
    /// Total samples ever written (used to compute readable range).
    total_written: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer holding at most `capacity` samples.
    ///
    /// A zero capacity is bumped to one so that `push` never divides by zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            total_written: 0,
        }
    }

    /// Append a sample, evicting the oldest one if full.
    pub fn push(&mut self, value: T) {
        self.data[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.total_written += 1;
    }

    /// Copy all buffered samples in order (oldest to newest).
    pub fn to_vec(&self) -> Vec<T> {
        let stored = self.len();
        if stored == 0 {
            return Vec::new();
        }

        if self.total_written <= self.capacity {
            // Not wrapped yet, samples start at index 0
            self.data[..stored].to_vec()
        } else {
            // Wrapped, oldest sample sits at write_pos
            let mut result = Vec::with_capacity(self.capacity);
            result.extend_from_slice(&self.data[self.write_pos..]);
            result.extend_from_slice(&self.data[..self.write_pos]);
            result
        }
    }

    /// Number of samples currently stored.
    pub fn len(&self) -> usize {
        std::cmp::min(self.total_written, self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

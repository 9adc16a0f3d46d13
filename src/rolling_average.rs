/// Fixed-window running mean over the most recent samples.
pub struct RollingAverage {
    capacity: usize,
    data: Vec<f32>,
    cursor: usize,
    count: usize,
    sum: f32,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            data: vec![0.0; capacity],
            cursor: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Add a sample and return the updated average.
    pub fn push(&mut self, value: f32) -> f32 {
        if self.count < self.capacity {
            self.count += 1;
        } else {
            // Window full: the slot under the cursor is the oldest sample.
            self.sum -= self.data[self.cursor];
        }
        self.data[self.cursor] = value;
        self.sum += value;
        self.cursor = (self.cursor + 1) % self.capacity;
        self.average()
    }

    pub fn average(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f32
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.sum = 0.0;
        self.count = 0;
        self.cursor = 0;
    }
}

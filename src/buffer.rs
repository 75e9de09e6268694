/// Bounded FIFO history of timestamped weight samples
use std::collections::VecDeque;

use crate::models::{WeightReading, WeightSample};

pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;

/// Keeps at most `capacity` samples, evicting the oldest first.
///
/// Timestamps pushed into one buffer never go backwards: a sample stamped
/// earlier than its predecessor is clamped to the predecessor's timestamp.
/// `clear()` starts a new session and forgets that bound.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<WeightSample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SampleBuffer {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted one if the buffer was full
    pub fn push(&mut self, mut sample: WeightSample) -> Option<WeightSample> {
        if let Some(last) = self.samples.back() {
            sample.timestamp = sample.timestamp.max(last.timestamp);
        }

        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&WeightSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightSample> {
        self.samples.iter()
    }

    /// Owned copy for readers outside the writer's lock
    pub fn snapshot(&self) -> Vec<WeightSample> {
        self.samples.iter().copied().collect()
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        SampleBuffer::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }
}

/// Everything one acquisition component records from its radio events
#[derive(Debug, Clone)]
pub struct Recording {
    pub reading: WeightReading,
    pub max_weight: f64,
    pub samples: SampleBuffer,
}

impl Recording {
    pub fn new(capacity: usize) -> Self {
        Recording {
            reading: WeightReading::default(),
            max_weight: 0.0,
            samples: SampleBuffer::with_capacity(capacity),
        }
    }

    /// Accept a decoded reading captured at `timestamp`
    pub fn record(&mut self, reading: WeightReading, timestamp: i64) {
        self.reading = reading;
        if reading.weight > self.max_weight {
            self.max_weight = reading.weight;
        }
        self.samples.push(WeightSample {
            weight: reading.weight,
            timestamp,
        });
    }

    pub fn reset(&mut self) {
        self.reading = WeightReading::default();
        self.max_weight = 0.0;
        self.samples.clear();
    }
}

use crate::config::{MAX_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};
use crate::event::EventRecord;

/// Fixed-capacity circular buffer of pending [`EventRecord`]s.
///
/// Holds at most `capacity` records (clamped to
/// [`MIN_QUEUE_CAPACITY`]–[`MAX_QUEUE_CAPACITY`]). Unlike a rolling buffer it
/// never overwrites: pushing into a full queue is rejected and the caller
/// decides what to do with the record. The head stays in place until it is
/// explicitly freed, so a failed delivery can be retried.
#[derive(Debug)]
pub struct EventQueue {
    slots: Box<[Option<EventRecord>]>,
    count: usize,
    head: usize,
    tail: usize,
}

impl EventQueue {
    /// Creates an empty queue. The capacity is clamped to the configured min/max.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY);
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            count: 0,
            head: 0,
            tail: 0,
        }
    }

    /// Appends `record` at the tail. Returns `false` and leaves the queue
    /// untouched if it is full.
    pub fn push(&mut self, record: EventRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.slots[self.tail] = Some(record);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        true
    }

    /// Returns the oldest record without removing it.
    pub fn peek(&self) -> Option<EventRecord> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head]
    }

    /// Removes and returns the oldest record.
    pub fn pop(&mut self) -> Option<EventRecord> {
        let record = self.peek()?;
        self.free();
        Some(record)
    }

    /// Discards the oldest record, if any. Used once the head has been delivered.
    pub fn free(&mut self) {
        if !self.is_empty() {
            self.head = (self.head + 1) % self.capacity();
            self.count -= 1;
        }
    }

    /// Resets the queue to empty. Slots are left as they are; only the first
    /// `len()` records after `head` are ever read.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_QUEUE_CAPACITY)
    }
}

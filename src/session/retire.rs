//! Deferred release of resources the GPU may still be reading

use std::collections::VecDeque;

/// Holds retired resources for a number of presented frames before
/// handing them back
pub struct RetireQueue<T> {
    frames_in_flight: u64,
    frame: u64,
    entries: VecDeque<(u64, T)>,
}

impl<T> RetireQueue<T> {
    pub fn new(frames_in_flight: u64) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            frame: 0,
            entries: VecDeque::new(),
        }
    }

    /// Retire `item` at the current frame
    pub fn retire(&mut self, item: T) {
        self.entries.push_back((self.frame, item));
    }

    /// Mark a frame presented and return everything past its margin
    pub fn advance(&mut self) -> Vec<T> {
        self.frame += 1;
        let mut expired = Vec::new();
        while let Some((retired_at, _)) = self.entries.front() {
            if self.frame < retired_at + self.frames_in_flight {
                break;
            }
            if let Some((_, item)) = self.entries.pop_front() {
                expired.push(item);
            }
        }
        expired
    }

    /// Release everything regardless of age
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The schedule queue (spec C1): a start-time-ordered list of [`Schedule`]s.
//!
//! Grounded on `examples/original_source/src/c/scheduler.c`'s
//! `add_schedule_to_queue`/`remove_schedule_from_queue`: a linear walk from
//! the front inserts before the first entry whose `next_start_ns` is
//! strictly greater, so schedules due at the same instant keep FIFO order.
//! The C version is an intrusive doubly-linked list; `VecDeque` gives the
//! same O(n) insert / O(1) front access without hand-rolled pointers.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::schedule::Schedule;

/// A start-time-ordered queue of schedules.
#[derive(Default)]
pub struct ScheduleQueue {
    items: VecDeque<Arc<Schedule>>,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Inserts `schedule` in sorted position. Equal `next_start_ns` values
    /// insert after existing equal entries (strict `<` comparison), matching
    /// the C reference's FIFO-among-co-due behavior.
    pub fn insert(&mut self, schedule: Arc<Schedule>) {
        let start = schedule.next_start_ns();
        let pos = self
            .items
            .iter()
            .position(|existing| start < existing.next_start_ns());
        match pos {
            Some(idx) => self.items.insert(idx, schedule),
            None => self.items.push_back(schedule),
        }
    }

    /// Removes `schedule` by identity. Returns `true` if it was present.
    pub fn remove(&mut self, schedule: &Arc<Schedule>) -> bool {
        if let Some(idx) = self.items.iter().position(|s| Arc::ptr_eq(s, schedule)) {
            self.items.remove(idx);
            true
        } else {
            false
        }
    }

    /// The schedule with the minimum `next_start_ns`, if any.
    pub fn front(&self) -> Option<&Arc<Schedule>> {
        self.items.front()
    }

    /// Removes and returns the front schedule.
    pub fn pop_front(&mut self) -> Option<Arc<Schedule>> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if `next_start_ns` is non-decreasing front-to-back. Exercised by
    /// tests only; production code never needs to re-check its own
    /// invariant.
    #[cfg(test)]
    pub(crate) fn is_sorted(&self) -> bool {
        self.items
            .iter()
            .zip(self.items.iter().skip(1))
            .all(|(a, b)| a.next_start_ns() <= b.next_start_ns())
    }
}

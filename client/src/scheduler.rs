//! Frame-clock driven timers with synchronous cancellation
//!
//! All timed client behavior (swing frames, cooldowns, grapple timeout,
//! respawn countdown) is scheduled here instead of on ambient timers. The
//! owner pops due events one at a time, so a handler that cancels another
//! timer prevents it from firing even when both were due in the same frame.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer<E> {
    id: TimerId,
    due: f64,
    period: f64,
    /// Firings left after the next one
    repeats_left: u32,
    event: E,
}

/// A timer that came due
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<E> {
    pub id: TimerId,
    pub event: E,
    /// Further firings still scheduled for this timer
    pub remaining: u32,
}

#[derive(Debug)]
pub struct Scheduler<E> {
    timers: Vec<Timer<E>>,
    next_id: u64,
    now: f64,
}

impl<E: Clone> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
            now: 0.0,
        }
    }

    /// Seconds elapsed on the scheduler clock
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Fires `event` once after `delay` seconds
    pub fn once(&mut self, delay: f32, event: E) -> TimerId {
        self.insert(delay, delay, 0, event)
    }

    /// Fires `event` `count` times, every `period` seconds
    pub fn repeat(&mut self, period: f32, count: u32, event: E) -> TimerId {
        self.insert(period, period, count.saturating_sub(1), event)
    }

    fn insert(&mut self, delay: f32, period: f32, repeats_left: u32, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            due: self.now + f64::from(delay.max(0.0)),
            period: f64::from(period.max(0.0)),
            repeats_left,
            event,
        });
        id
    }

    /// Removes a timer; returns false if it already finished or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Moves the clock forward; due timers are collected with [`Scheduler::pop_due`]
    pub fn advance(&mut self, dt: f32) {
        self.now += f64::from(dt.max(0.0));
    }

    /// Earliest timer due at or before the current clock, in schedule order
    pub fn pop_due(&mut self) -> Option<Fired<E>> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= self.now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(i, _)| i)?;

        let timer = &mut self.timers[index];
        let fired = Fired {
            id: timer.id,
            event: timer.event.clone(),
            remaining: timer.repeats_left,
        };

        if timer.repeats_left > 0 {
            timer.repeats_left -= 1;
            timer.due += timer.period;
        } else {
            self.timers.remove(index);
        }
        Some(fired)
    }
}

impl<E: Clone> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-site state kernels for the temporal operators.
//!
//! Times are seconds on the evaluation clock. Every kernel is fed once per evaluation pass.

use crate::value::Value;
use std::collections::VecDeque;

/// State kept between passes for one temporal call site.
#[derive(Debug, Clone)]
pub enum TemporalState {
    Since(SinceState),
    Window(WindowState),
    Always(AlwaysState),
    Last(LastState),
}

#[derive(Debug, Clone, Default)]
pub struct SinceState {
    prev_first: bool,
    anchor: Option<f64>,
}

impl SinceState {
    /// `second` holds and the rising edge of `first` lies `lower..=upper` seconds back,
    /// with `first` true on every pass since.
    ///
    /// A pass where `first` is false drops the anchor.
    pub fn update(&mut self, now: f64, first: bool, second: bool, lower: f64, upper: f64) -> bool {
        if !first {
            self.anchor = None;
        } else if !self.prev_first {
            self.anchor = Some(now);
        }
        self.prev_first = first;
        let Some(anchor) = self.anchor else {
            return false;
        };
        let elapsed = now - anchor;
        second && lower <= elapsed && elapsed <= upper
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowState {
    entries: VecDeque<(f64, Value)>,
}

impl WindowState {
    /// Appends the current observation and evicts entries older than `upper`.
    pub fn push(&mut self, now: f64, value: Value, upper: f64) {
        self.entries.push_back((now, value));
        while let Some((ts, _)) = self.entries.front() {
            if now - ts > upper {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Values whose age lies in `[lower, upper]`, oldest first.
    pub fn values(&self, now: f64, lower: f64, upper: f64) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|(ts, _)| {
                let age = now - ts;
                lower <= age && age <= upper
            })
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlwaysState {
    entries: VecDeque<(f64, bool)>,
}

impl AlwaysState {
    /// True iff every observation within the last `duration` seconds, this one included, held.
    pub fn update(&mut self, now: f64, duration: f64, cond: bool) -> bool {
        self.entries.push_back((now, cond));
        while let Some((ts, _)) = self.entries.front() {
            if now - ts > duration {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries.iter().all(|(_, held)| *held)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LastState {
    value: Value,
}

impl LastState {
    /// Latest non-null observation; null inputs keep the previous value.
    pub fn update(&mut self, value: Value) -> Value {
        if !value.is_null() {
            self.value = value;
        }
        self.value.clone()
    }
}

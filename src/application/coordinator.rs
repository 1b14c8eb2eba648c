//! Process-wide coordination state. The emergency-halt flag and the
//! analyst's per-day review budget live here rather than as module-level
//! globals; the operator surface gets a handle to the same value.

use chrono::NaiveDate;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
struct ReviewWindow {
    date: Option<NaiveDate>,
    used: u32,
}

pub struct Coordinator {
    halted: AtomicBool,
    reviews: Mutex<ReviewWindow>,
    max_reviews_per_day: u32,
}

impl Coordinator {
    pub fn new(max_reviews_per_day: u32) -> Self {
        Self {
            halted: AtomicBool::new(false),
            reviews: Mutex::new(ReviewWindow {
                date: None,
                used: 0,
            }),
            max_reviews_per_day,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    pub fn set_halted(&self, halted: bool) {
        self.halted.store(halted, Ordering::Relaxed);
    }

    /// True when the UTC-day review budget is spent. The counter resets
    /// when the day rolls over.
    pub fn reviews_exhausted(&self, today: NaiveDate) -> bool {
        let mut window = self.reviews.lock().expect("review window poisoned");
        if window.date != Some(today) {
            window.date = Some(today);
            window.used = 0;
        }
        window.used >= self.max_reviews_per_day
    }

    /// Counts one completed model call against today's budget.
    pub fn record_review(&self, today: NaiveDate) -> u32 {
        let mut window = self.reviews.lock().expect("review window poisoned");
        if window.date != Some(today) {
            window.date = Some(today);
            window.used = 0;
        }
        window.used += 1;
        window.used
    }

    pub fn reviews_used(&self, today: NaiveDate) -> u32 {
        let window = self.reviews.lock().expect("review window poisoned");
        if window.date == Some(today) { window.used } else { 0 }
    }
}

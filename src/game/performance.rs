//! Per-room tick budget monitoring
//!
//! Tracks how much of the tick budget each room's simulation consumes. The
//! status gates room admission: a room that keeps overrunning its budget
//! refuses new players, and the lobby stops creating rooms while any room
//! is critical.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples needed before the status moves off its initial value
const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BudgetStatus {
    /// Under 30% of the budget
    Healthy,
    /// 30-70%
    Busy,
    /// 70-100%
    Strained,
    /// Over budget on average
    Overrun,
}

impl BudgetStatus {
    pub fn can_accept_players(&self) -> bool {
        matches!(self, BudgetStatus::Healthy | BudgetStatus::Busy)
    }

    /// Numeric code for metrics
    pub fn code(&self) -> u64 {
        *self as u64
    }
}

pub struct TickBudget {
    durations: VecDeque<Duration>,
    max_samples: usize,
    budget: Duration,
    status: BudgetStatus,
    tick_start: Option<Instant>,
    overruns: u64,
}

impl TickBudget {
    pub fn new(tick_rate: u32) -> Self {
        let max_samples = (tick_rate.max(1) as usize) * 3;
        Self {
            durations: VecDeque::with_capacity(max_samples),
            max_samples,
            budget: Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32),
            status: BudgetStatus::Healthy,
            tick_start: None,
            overruns: 0,
        }
    }

    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Stop timing and record. Returns the measured duration.
    pub fn tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    pub fn record(&mut self, duration: Duration) {
        if duration > self.budget {
            self.overruns += 1;
        }
        self.durations.push_back(duration);
        while self.durations.len() > self.max_samples {
            self.durations.pop_front();
        }
        if self.durations.len() >= MIN_SAMPLES {
            self.status = match self.usage() {
                u if u < 0.3 => BudgetStatus::Healthy,
                u if u < 0.7 => BudgetStatus::Busy,
                u if u < 1.0 => BudgetStatus::Strained,
                _ => BudgetStatus::Overrun,
            };
        }
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.durations.iter().sum();
        sum / self.durations.len() as u32
    }

    pub fn p95(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Average duration as a fraction of the budget
    pub fn usage(&self) -> f32 {
        self.average().as_secs_f32() / self.budget.as_secs_f32()
    }

    pub fn status(&self) -> BudgetStatus {
        self.status
    }

    /// Ticks that individually exceeded the budget
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, p95 {:?}, {} overruns",
            self.status,
            self.usage() * 100.0,
            self.p95(),
            self.overruns
        )
    }
}

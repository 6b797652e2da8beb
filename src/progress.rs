use chrono::NaiveDate;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Validated,
    DataFetched,
    Simulating,
    MetricsComputed,
    Persisted,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn label(self) -> &'static str {
        match self {
            RunPhase::Created => "created",
            RunPhase::Validated => "validated",
            RunPhase::DataFetched => "data fetched",
            RunPhase::Simulating => "simulating",
            RunPhase::MetricsComputed => "metrics computed",
            RunPhase::Persisted => "persisted",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase {
        run: String,
        phase: RunPhase,
    },
    /// Emitted once per simulated date after its equity sample is recorded.
    Day {
        run: String,
        date: NaiveDate,
        index: usize,
        total: usize,
        equity: f64,
        trades: usize,
    },
}

/// Fire-and-forget progress side-channel. Sends never block and a dropped
/// receiver is ignored.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
    status: RunStatus,
}

impl ProgressReporter {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
            status: RunStatus::new(),
        }
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn phase(&self, run: &str, phase: RunPhase) {
        self.status.set_phase(phase);
        self.emit(ProgressEvent::Phase {
            run: run.to_string(),
            phase,
        });
    }

    pub fn day(
        &self,
        run: &str,
        date: NaiveDate,
        index: usize,
        total: usize,
        equity: f64,
        trades: usize,
    ) {
        self.status.set_progress(date, index + 1, total, equity);
        self.emit(ProgressEvent::Day {
            run: run.to_string(),
            date,
            index,
            total,
            equity,
            trades,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

/// Latest known state of a run, readable from other tasks.
#[derive(Clone, Default)]
pub struct RunStatus {
    inner: Arc<Mutex<RunStatusData>>,
}

#[derive(Default)]
struct RunStatusData {
    phase: Option<RunPhase>,
    last_date: Option<NaiveDate>,
    completed_days: usize,
    total_days: usize,
    equity: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunStatusSnapshot {
    pub phase: RunPhase,
    pub last_date: Option<NaiveDate>,
    pub completed_days: usize,
    pub total_days: usize,
    pub equity: Option<f64>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&self, phase: RunPhase) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = Some(phase);
        }
    }

    pub fn set_progress(&self, date: NaiveDate, completed_days: usize, total_days: usize, equity: f64) {
        if let Ok(mut data) = self.inner.lock() {
            data.last_date = Some(date);
            data.completed_days = completed_days;
            data.total_days = total_days;
            data.equity = Some(equity);
        }
    }

    pub fn snapshot(&self) -> RunStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            RunStatusSnapshot {
                phase: data.phase.unwrap_or(RunPhase::Created),
                last_date: data.last_date,
                completed_days: data.completed_days,
                total_days: data.total_days,
                equity: data.equity,
            }
        } else {
            RunStatusSnapshot {
                phase: RunPhase::Failed,
                last_date: None,
                completed_days: 0,
                total_days: 0,
                equity: None,
            }
        }
    }
}

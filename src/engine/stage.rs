use std::fmt;
use std::time::{Duration, Instant};

/// Where a request is in the classify, materialize, compile, run pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Classifying,
    ClassificationFailed,
    Classified,
    Materializing,
    MaterializeFailed,
    Materialized,
    Compiling,
    CompileFailed,
    Compiled,
    Running,
    Completed,
    TimedOut,
    RuntimeFailed,
    Assembled,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Pending, Classifying)
                | (Classifying, ClassificationFailed | Classified)
                | (Classified, Materializing)
                | (Materializing, MaterializeFailed | Materialized)
                | (Materialized, Compiling)
                | (Compiling, CompileFailed | Compiled)
                | (Compiled, Running)
                | (Running, Completed | TimedOut | RuntimeFailed)
                | (Completed | TimedOut | RuntimeFailed, Assembled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::ClassificationFailed
                | Stage::MaterializeFailed
                | Stage::CompileFailed
                | Stage::Completed
                | Stage::TimedOut
                | Stage::RuntimeFailed
                | Stage::Assembled
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Follows one request through its stages, logging every transition
#[derive(Debug)]
pub struct RequestTracker {
    id: String,
    stage: Stage,
    started: Instant,
}

impl RequestTracker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: Stage::Pending,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Moves to `next`; an illegal transition is logged and ignored
    pub fn advance(&mut self, next: Stage) -> bool {
        if !self.stage.can_advance_to(next) {
            log::error!(
                "Request {}: illegal transition {} -> {next}",
                self.id,
                self.stage
            );
            return false;
        }
        log::debug!(
            "Request {}: {} -> {next} after {:?}",
            self.id,
            self.stage,
            self.elapsed()
        );
        self.stage = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = RequestTracker::new("r1");
        for stage in [
            Stage::Classifying,
            Stage::Classified,
            Stage::Materializing,
            Stage::Materialized,
            Stage::Compiling,
            Stage::Compiled,
            Stage::Running,
            Stage::Completed,
            Stage::Assembled,
        ] {
            assert!(tracker.advance(stage), "could not advance to {stage}");
        }
        assert!(tracker.stage().is_terminal());
    }

    #[test]
    fn test_illegal_transitions_are_refused() {
        let mut tracker = RequestTracker::new("r2");
        assert!(!tracker.advance(Stage::Compiling));
        assert_eq!(tracker.stage(), Stage::Pending);

        tracker.advance(Stage::Classifying);
        tracker.advance(Stage::ClassificationFailed);
        assert!(tracker.stage().is_terminal());
        assert!(!tracker.advance(Stage::Materializing));
        assert!(!Stage::CompileFailed.can_advance_to(Stage::Running));
    }
}

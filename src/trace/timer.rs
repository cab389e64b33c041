use crate::models::Measure;
use std::time::Instant;

/// Restartable start/stop stopwatch for one phase
#[derive(Debug, Clone, Default)]
pub struct PhaseTimer {
    started: Option<Instant>,
    span: Option<std::time::Duration>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the phase; any previous span is discarded
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.span = None;
    }

    /// Close the phase. Stopping again extends the span up to now.
    pub fn stop(&mut self) {
        if let Some(started) = self.started {
            self.span = Some(started.elapsed());
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some() && self.span.is_none()
    }

    /// The last completed span, or an invalid measure
    pub fn measure(&self) -> Measure {
        match self.span {
            Some(span) => Measure::new(span),
            None => Measure::INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_never_started_is_invalid() {
        let mut timer = PhaseTimer::new();
        assert!(!timer.measure().is_valid());
        timer.stop();
        assert!(!timer.measure().is_valid());
    }

    #[test]
    fn test_running_is_invalid() {
        let mut timer = PhaseTimer::new();
        timer.start();
        assert!(timer.is_running());
        assert!(!timer.measure().is_valid());
    }

    #[test]
    fn test_start_stop() {
        let mut timer = PhaseTimer::new();
        timer.start();
        sleep(Duration::from_millis(5));
        timer.stop();
        assert!(!timer.is_running());
        let span = timer.measure().duration().unwrap();
        assert!(span >= Duration::from_millis(5));
    }

    #[test]
    fn test_restart_overwrites() {
        let mut timer = PhaseTimer::new();
        timer.start();
        sleep(Duration::from_millis(20));
        timer.stop();
        let first = timer.measure().duration().unwrap();

        timer.start();
        assert!(!timer.measure().is_valid());
        timer.stop();
        let second = timer.measure().duration().unwrap();
        assert!(second < first);
    }
}

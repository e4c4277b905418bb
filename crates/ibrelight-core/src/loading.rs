//! Progress reporting for long-running operations.
//!
//! A [`LoadingMonitor`] receives coarse progress events. Operations drive it
//! through a [`LoadingSession`], which keeps the event stream well formed: one
//! start, non-decreasing progress within `[0, maximum]`, and one completion.
//! [`TrackedMonitor`] sits between a request runner and the user's monitor and
//! reports failures for operations that bailed out before finishing.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiver of progress events. Implementations must tolerate calls from any thread.
pub trait LoadingMonitor: Send + Sync {
    /// A new loading session started.
    fn start_loading(&self);

    /// Sets the progress value that means "done".
    fn set_maximum(&self, maximum: f64);

    /// Reports current progress.
    fn set_progress(&self, progress: f64);

    /// The session finished successfully.
    fn loading_complete(&self);

    /// The session was aborted by an error.
    fn loading_failed(&self, error: &dyn Error);

    /// The session was aborted by a cancellation request.
    fn loading_cancelled(&self) {}
}

/// A monitor that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl LoadingMonitor for NullMonitor {
    fn start_loading(&self) {}
    fn set_maximum(&self, _maximum: f64) {}
    fn set_progress(&self, _progress: f64) {}
    fn loading_complete(&self) {}
    fn loading_failed(&self, _error: &dyn Error) {}
}

/// Scoped driver for one loading session.
pub struct LoadingSession<'a> {
    monitor: &'a dyn LoadingMonitor,
    maximum: f64,
    progress: f64,
}

impl<'a> LoadingSession<'a> {
    /// Starts a session with the given maximum.
    pub fn start(monitor: &'a dyn LoadingMonitor, maximum: f64) -> Self {
        let maximum = if maximum.is_finite() { maximum.max(0.0) } else { 0.0 };
        monitor.start_loading();
        monitor.set_maximum(maximum);
        monitor.set_progress(0.0);
        Self {
            monitor,
            maximum,
            progress: 0.0,
        }
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Current maximum.
    #[must_use]
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Changes the maximum.
    ///
    /// The maximum never drops below the progress already reported, and
    /// non-finite values are ignored.
    pub fn set_maximum(&mut self, maximum: f64) {
        if !maximum.is_finite() {
            log::debug!("ignoring non-finite loading maximum {maximum}");
            return;
        }
        self.maximum = maximum.max(self.progress);
        self.monitor.set_maximum(self.maximum);
    }

    /// Reports progress, clamped to `[current, maximum]`. Non-finite values are ignored.
    pub fn set_progress(&mut self, progress: f64) {
        if !progress.is_finite() {
            log::debug!("ignoring non-finite loading progress {progress}");
            return;
        }
        self.progress = progress.min(self.maximum).max(self.progress);
        self.monitor.set_progress(self.progress);
    }

    /// Advances progress by `delta`.
    pub fn advance(&mut self, delta: f64) {
        self.set_progress(self.progress + delta);
    }

    /// Ends the session successfully.
    pub fn complete(self) {
        self.monitor.loading_complete();
    }
}

/// Wraps a monitor and records whether a terminal event was delivered.
pub struct TrackedMonitor {
    inner: Arc<dyn LoadingMonitor>,
    started: AtomicBool,
    finished: AtomicBool,
}

impl TrackedMonitor {
    /// Starts tracking events sent to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn LoadingMonitor>) -> Self {
        Self {
            inner,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Whether a session was started.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the session already reported completion, failure, or cancellation.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Reports `error` unless a terminal event has already been delivered.
    pub fn fail_unfinished(&self, error: &dyn Error) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.inner.loading_failed(error);
        }
    }

    /// Reports cancellation unless a terminal event has already been delivered.
    pub fn cancel_unfinished(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.inner.loading_cancelled();
        }
    }
}

impl LoadingMonitor for TrackedMonitor {
    fn start_loading(&self) {
        self.started.store(true, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        self.inner.start_loading();
    }

    fn set_maximum(&self, maximum: f64) {
        self.inner.set_maximum(maximum);
    }

    fn set_progress(&self, progress: f64) {
        self.inner.set_progress(progress);
    }

    fn loading_complete(&self) {
        self.finished.store(true, Ordering::Release);
        self.inner.loading_complete();
    }

    fn loading_failed(&self, error: &dyn Error) {
        self.finished.store(true, Ordering::Release);
        self.inner.loading_failed(error);
    }

    fn loading_cancelled(&self) {
        self.finished.store(true, Ordering::Release);
        self.inner.loading_cancelled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start,
        Maximum(f64),
        Progress(f64),
        Complete,
        Failed(String),
        Cancelled,
    }

    #[derive(Default)]
    struct RecordingMonitor {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingMonitor {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LoadingMonitor for RecordingMonitor {
        fn start_loading(&self) {
            self.events.lock().unwrap().push(Event::Start);
        }
        fn set_maximum(&self, maximum: f64) {
            self.events.lock().unwrap().push(Event::Maximum(maximum));
        }
        fn set_progress(&self, progress: f64) {
            self.events.lock().unwrap().push(Event::Progress(progress));
        }
        fn loading_complete(&self) {
            self.events.lock().unwrap().push(Event::Complete);
        }
        fn loading_failed(&self, error: &dyn Error) {
            self.events.lock().unwrap().push(Event::Failed(error.to_string()));
        }
        fn loading_cancelled(&self) {
            self.events.lock().unwrap().push(Event::Cancelled);
        }
    }

    #[test]
    fn test_session_clamps_progress() {
        let monitor = RecordingMonitor::default();
        let mut session = LoadingSession::start(&monitor, 10.0);
        session.set_progress(4.0);
        session.set_progress(2.0);
        session.set_progress(25.0);
        session.complete();

        assert_eq!(
            monitor.events(),
            vec![
                Event::Start,
                Event::Maximum(10.0),
                Event::Progress(0.0),
                Event::Progress(4.0),
                Event::Progress(4.0),
                Event::Progress(10.0),
                Event::Complete,
            ]
        );
    }

    fn reported_progress(monitor: &RecordingMonitor) -> Vec<f64> {
        monitor
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_maximum_stays_at_or_above_progress() {
        let monitor = RecordingMonitor::default();
        let mut session = LoadingSession::start(&monitor, 10.0);
        session.advance(8.0);
        session.set_maximum(5.0);
        assert!((session.progress() - 8.0).abs() < f64::EPSILON);
        assert!((session.maximum() - 8.0).abs() < f64::EPSILON);

        session.set_maximum(20.0);
        session.set_progress(15.0);
        assert!((session.maximum() - 20.0).abs() < f64::EPSILON);
        assert_eq!(reported_progress(&monitor), vec![0.0, 8.0, 15.0]);
    }

    #[test]
    fn test_progress_never_decreases_or_goes_non_finite() {
        let monitor = RecordingMonitor::default();
        let mut session = LoadingSession::start(&monitor, 10.0);
        session.set_progress(8.0);
        session.set_maximum(5.0);
        session.set_progress(f64::NAN);
        session.set_progress(3.0);
        session.set_maximum(f64::INFINITY);
        session.advance(f64::NAN);
        session.complete();

        let progress = reported_progress(&monitor);
        assert_eq!(progress, vec![0.0, 8.0, 8.0]);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(!monitor
            .events()
            .iter()
            .any(|e| matches!(e, Event::Maximum(m) if !m.is_finite())));
    }

    #[test]
    fn test_non_finite_start_maximum_is_zero() {
        let monitor = RecordingMonitor::default();
        let mut session = LoadingSession::start(&monitor, f64::NAN);
        session.set_progress(1.0);
        assert_eq!(session.maximum(), 0.0);
        assert_eq!(reported_progress(&monitor), vec![0.0, 0.0]);
    }

    #[test]
    fn test_tracked_monitor_reports_failure_once() {
        let recording = Arc::new(RecordingMonitor::default());
        let tracked = TrackedMonitor::new(recording.clone());
        {
            let mut session = LoadingSession::start(&tracked, 3.0);
            session.advance(1.0);
            // Dropped without completing, as when an error propagates.
        }
        assert!(tracked.started());
        assert!(!tracked.finished());
        tracked.fail_unfinished(&CoreError::EmptyViewSet);
        tracked.fail_unfinished(&CoreError::EmptyViewSet);

        let failures = recording
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Failed(_)))
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_tracked_monitor_skips_completed_sessions() {
        let recording = Arc::new(RecordingMonitor::default());
        let tracked = TrackedMonitor::new(recording.clone());
        LoadingSession::start(&tracked, 1.0).complete();
        tracked.cancel_unfinished();
        assert_eq!(recording.events().last(), Some(&Event::Complete));
    }
}

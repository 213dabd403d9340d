//! Progress Listener Port - receives reply text as it streams in.

/// Receives decoded reply deltas in arrival order.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, text: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_progress(&self, text: &str) {
        self(text)
    }
}

/// Listener that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressListener for NoopProgress {
    fn on_progress(&self, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_are_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = move |text: &str| sink.lock().unwrap().push(text.to_string());

        listener.on_progress("Hel");
        listener.on_progress("lo");

        assert_eq!(*seen.lock().unwrap(), vec!["Hel", "lo"]);
    }

    #[test]
    fn noop_listener_accepts_text() {
        NoopProgress.on_progress("ignored");
    }
}

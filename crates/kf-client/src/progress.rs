//! Console progress for waits
//!
//! [`WaitProgress`] prints the messages a wait reports to stderr, one styled
//! line per change, with the time elapsed since the wait started.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use console::style;

use crate::error::ClientError;
use crate::wait::{ConditionReporter, WaitContext};

/// Prints wait progress for one object
#[derive(Clone)]
pub struct WaitProgress {
    kind: String,
    name: String,
    start_time: Instant,
    /// Last printed message, used to skip repeats between polls
    last: Arc<Mutex<Option<String>>>,
}

impl WaitProgress {
    /// Create a new progress printer for `kind/name`
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            start_time: Instant::now(),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach this printer to a context as its reporter
    pub fn attach(&self, ctx: WaitContext) -> WaitContext {
        let progress = self.clone();
        ctx.with_reporter(move |msg| progress.update(msg))
    }

    /// Print a status line unless it repeats the previous one
    pub fn update(&self, msg: &str) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(msg) {
            return;
        }
        *last = Some(msg.to_string());

        let _ = writeln!(
            io::stderr(),
            "  {} {}/{} - {} ({:.1}s)",
            style("◕").yellow(),
            self.kind,
            self.name,
            style(msg).dim(),
            self.elapsed().as_secs_f64()
        );
    }

    /// Print the final line for a finished wait
    pub fn finish(&self, result: std::result::Result<(), &ClientError>) {
        let elapsed = self.elapsed().as_secs_f64();
        let _ = match result {
            Ok(()) => writeln!(
                io::stderr(),
                "  {} {}/{} ({:.1}s)",
                style("●").green(),
                self.kind,
                self.name,
                elapsed
            ),
            Err(err) => writeln!(
                io::stderr(),
                "  {} {}/{} - {} ({:.1}s)",
                style("✗").red(),
                self.kind,
                self.name,
                style(err).red(),
                elapsed
            ),
        };
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Reporter that appends every message to `messages`
pub fn report_to(messages: Arc<Mutex<Vec<String>>>) -> ConditionReporter {
    Arc::new(move |msg: &str| {
        messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.to_string());
    })
}

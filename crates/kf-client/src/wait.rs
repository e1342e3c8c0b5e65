//! Polling waits
//!
//! A wait repeatedly fetches one object and hands the outcome to a condition,
//! which decides whether to keep polling. Waits are bounded by a
//! [`WaitContext`]: a deadline, any number of cancellation handles, and an
//! optional reporter that receives human-readable progress messages.

use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ClientError;
use crate::functional::{Object, Predicate, extract_conditions, observed_generation_matches};

/// Callback receiving progress messages while waiting
pub type ConditionReporter = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of one fetch, as seen by a condition
pub type Fetched<'a, R> = std::result::Result<&'a R, &'a ClientError>;

/// Verdict of a condition after one poll
#[derive(Debug)]
pub enum Check {
    /// Keep polling
    Pending,

    /// Stop and return the fetched object (none if the fetch failed)
    Done,

    /// Stop and return the fetch error
    FetchFailed,

    /// Stop with this error
    Failed(ClientError),
}

impl Check {
    /// `Done` if `done`, else `Pending`
    pub fn done_if(done: bool) -> Self {
        if done { Check::Done } else { Check::Pending }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Check::Pending)
    }
}

// ========== Context ==========

/// Bounds a wait: deadline, cancellation, and progress reporting.
///
/// Contexts are cheap to clone; derived contexts keep the limits of their
/// parent and can only add tighter ones.
#[derive(Clone, Default)]
pub struct WaitContext {
    deadline: Option<Instant>,
    cancels: Vec<watch::Receiver<bool>>,
    reporter: Option<ConditionReporter>,
}

impl std::fmt::Debug for WaitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitContext")
            .field("deadline", &self.deadline)
            .field("cancels", &self.cancels.len())
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

impl WaitContext {
    /// A context that is never done
    pub fn background() -> Self {
        Self::default()
    }

    /// Finish after `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Finish at `deadline`, or earlier if the context already has a sooner one
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context that also finishes when the returned handle is cancelled
    pub fn with_cancellation(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancels.push(rx);
        (self, CancelHandle(tx))
    }

    /// Attach a progress reporter, replacing any existing one
    pub fn with_reporter(self, reporter: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.with_shared_reporter(Arc::new(reporter))
    }

    /// Attach an already shared reporter
    pub fn with_shared_reporter(mut self, reporter: ConditionReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn reporter(&self) -> Option<&ConditionReporter> {
        self.reporter.as_ref()
    }

    /// Send a progress message to the reporter, if any
    pub fn report(&self, message: &str) {
        if let Some(reporter) = &self.reporter {
            reporter(message);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed or a handle was cancelled
    pub fn is_done(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
            || self.cancels.iter().any(|rx| *rx.borrow())
    }

    /// Resolve once the context is done; never resolves for a background context
    pub async fn done(&self) {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            _ = deadline => {}
            _ = any_cancelled(&self.cancels) => {}
        }
    }
}

fn any_cancelled(
    receivers: &[watch::Receiver<bool>],
) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
    Box::pin(async move {
        match receivers {
            [] => pending::<()>().await,
            [first, rest @ ..] => {
                tokio::select! {
                    _ = cancelled(first.clone()) => {}
                    _ = any_cancelled(rest) => {}
                }
            }
        }
    })
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    let cancelled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
    if !cancelled {
        // Handle dropped without cancelling
        pending::<()>().await;
    }
}

/// Cancels the context it was created with
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Mark the context done; waits observe it at their next suspension point
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

// ========== Conditions ==========

/// Lift a predicate into a condition; any fetch error stops the wait
pub fn wrap_predicate<R: 'static>(
    predicate: Predicate<R>,
) -> impl Fn(&WaitContext, Fetched<'_, R>) -> Check + Send + Sync {
    move |_ctx, fetched| match fetched {
        Ok(obj) => Check::done_if(predicate.test(obj)),
        Err(_) => Check::FetchFailed,
    }
}

/// Done once the object no longer exists; other fetch errors stop the wait
pub fn condition_deleted<R>(_ctx: &WaitContext, fetched: Fetched<'_, R>) -> Check {
    match fetched {
        Ok(_) => Check::Pending,
        Err(err) if err.is_not_found() => Check::Done,
        Err(_) => Check::FetchFailed,
    }
}

/// Done once the status condition `condition_type` is `True`.
///
/// Waits while the controller has not observed the latest generation or the
/// condition is absent or `Unknown`; any other status fails the wait.
pub fn condition_true<R: Object>(
    condition_type: impl Into<String>,
) -> impl Fn(&WaitContext, Fetched<'_, R>) -> Check + Send + Sync {
    let condition_type = condition_type.into();
    move |ctx, fetched| {
        let obj = match fetched {
            Ok(obj) => obj,
            Err(_) => return Check::FetchFailed,
        };

        // Conditions from an older generation are stale
        if !observed_generation_matches(obj) {
            ctx.report("waiting for the latest generation to be observed");
            return Check::Pending;
        }

        let Some(cond) = extract_conditions(obj)
            .into_iter()
            .find(|c| c.type_ == condition_type)
        else {
            ctx.report(&format!("waiting for {} to be reported", condition_type));
            return Check::Pending;
        };

        if cond.is_true() {
            return Check::Done;
        }

        if cond.is_unknown() {
            let detail = if cond.message.is_empty() {
                cond.reason.as_str()
            } else {
                cond.message.as_str()
            };
            if detail.is_empty() {
                ctx.report(&format!("{}: {}", cond.type_, cond.status));
            } else {
                ctx.report(&format!("{}: {} ({})", cond.type_, cond.status, detail));
            }
            return Check::Pending;
        }

        Check::Failed(ClientError::ConditionFailed {
            condition: cond.type_,
            status: cond.status,
            message: cond.message,
            reason: cond.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::DynamicObject;
    use std::sync::Mutex;

    fn app(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    fn with_conditions(conditions: serde_json::Value) -> DynamicObject {
        app(serde_json::json!({
            "apiVersion": "kf.dev/v1alpha1",
            "kind": "App",
            "metadata": { "name": "web", "generation": 2 },
            "status": { "observedGeneration": 2, "conditions": conditions }
        }))
    }

    fn not_found() -> ClientError {
        ClientError::NotFound {
            kind: "App".to_string(),
            name: "web".to_string(),
        }
    }

    fn collecting() -> (WaitContext, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        let ctx = WaitContext::background()
            .with_reporter(move |msg| sink.lock().unwrap().push(msg.to_string()));
        (ctx, messages)
    }

    #[test]
    fn test_background_context_is_never_done() {
        assert!(!WaitContext::background().is_done());
    }

    #[tokio::test]
    async fn test_cancel_handle() {
        let (ctx, handle) = WaitContext::background().with_cancellation();
        assert!(!ctx.is_done());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(ctx.is_done());
        ctx.done().await;
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_child() {
        let (parent, handle) = WaitContext::background().with_cancellation();
        let (child, _child_handle) = parent.with_cancellation();

        handle.cancel();
        assert!(child.is_done());
        child.done().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = WaitContext::background().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());

        let start = Instant::now();
        ctx.done().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_tightens() {
        let ctx = WaitContext::background()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60));

        let start = Instant::now();
        ctx.done().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = WaitContext::background().with_cancellation();
        drop(handle);

        let finished = tokio::time::timeout(Duration::from_secs(3600), ctx.done()).await;
        assert!(finished.is_err());
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_wrap_predicate() {
        let ctx = WaitContext::background();
        let condition = wrap_predicate(Predicate::new(|obj: &DynamicObject| {
            obj.metadata.name.as_deref() == Some("web")
        }));

        let web = with_conditions(serde_json::json!([]));
        assert!(matches!(condition(&ctx, Ok(&web)), Check::Done));
        assert!(matches!(condition(&ctx, Err(&not_found())), Check::FetchFailed));
    }

    #[test]
    fn test_condition_deleted() {
        let ctx = WaitContext::background();
        let web = with_conditions(serde_json::json!([]));
        let other = ClientError::Validation("boom".to_string());

        assert!(condition_deleted(&ctx, Ok(&web)).is_pending());
        assert!(matches!(
            condition_deleted::<DynamicObject>(&ctx, Err(&not_found())),
            Check::Done
        ));
        assert!(matches!(
            condition_deleted::<DynamicObject>(&ctx, Err(&other)),
            Check::FetchFailed
        ));
    }

    #[test]
    fn test_condition_true_states() {
        let ctx = WaitContext::background();
        let ready = condition_true::<DynamicObject>("Ready");

        let obj = with_conditions(serde_json::json!([{ "type": "Ready", "status": "True" }]));
        assert!(matches!(ready(&ctx, Ok(&obj)), Check::Done));

        let obj = with_conditions(serde_json::json!([{ "type": "Ready", "status": "Unknown" }]));
        assert!(ready(&ctx, Ok(&obj)).is_pending());

        let obj = with_conditions(serde_json::json!([{ "type": "Other", "status": "True" }]));
        assert!(ready(&ctx, Ok(&obj)).is_pending());

        assert!(matches!(ready(&ctx, Err(&not_found())), Check::FetchFailed));
    }

    #[test]
    fn test_condition_true_failure_message() {
        let ctx = WaitContext::background();
        let obj = with_conditions(serde_json::json!([{
            "type": "Ready",
            "status": "False",
            "message": "SomeMessage",
            "reason": "SomeReason"
        }]));

        let Check::Failed(err) = condition_true::<DynamicObject>("Ready")(&ctx, Ok(&obj)) else {
            panic!("expected failure");
        };
        assert_eq!(
            err.to_string(),
            "checking Ready failed, status: False message: SomeMessage reason: SomeReason"
        );
    }

    #[test]
    fn test_condition_true_ignores_stale_status() {
        let (ctx, messages) = collecting();
        let obj = app(serde_json::json!({
            "apiVersion": "kf.dev/v1alpha1",
            "kind": "App",
            "metadata": { "name": "web", "generation": 3 },
            "status": {
                "observedGeneration": 2,
                "conditions": [{ "type": "Ready", "status": "False" }]
            }
        }));

        assert!(condition_true::<DynamicObject>("Ready")(&ctx, Ok(&obj)).is_pending());
        assert_eq!(
            messages.lock().unwrap().as_slice(),
            ["waiting for the latest generation to be observed"]
        );
    }

    #[test]
    fn test_condition_true_reports_unknown() {
        let (ctx, messages) = collecting();
        let obj = with_conditions(serde_json::json!([{
            "type": "Ready",
            "status": "Unknown",
            "reason": "Deploying"
        }]));

        assert!(condition_true::<DynamicObject>("Ready")(&ctx, Ok(&obj)).is_pending());
        assert_eq!(
            messages.lock().unwrap().as_slice(),
            ["Ready: Unknown (Deploying)"]
        );
    }
}

//! Readiness polling with exponential backoff.
//!
//! The daemon takes a while to clean an upload, so the CLI polls
//! `GET /check-json` until the response satisfies the readiness predicate
//! (success status and non-empty content). A transport failure and a
//! well-formed "not ready yet" reply are the same thing here: both consume
//! one retry and double the delay before the next attempt. The session
//! ends in `Succeeded` or, once the retry budget is spent, in `Failed`.
//!
//! One session, one task, at most one request in flight. Consumers watch
//! the [`Snapshot`] channel; dropping the [`PollHandle`] aborts the task,
//! so no scheduled retry can fire after the caller has moved on.

use spinlog_proto::config::PollConfig;
use spinlog_proto::history::RawPlay;
use spinlog_proto::protocol::{FetchStatus, HistoryResponse};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Terminal status line once the retry budget is exhausted.
pub const FAILURE_MESSAGE: &str = "Failed to fetch data after multiple attempts";

/// Where the poller gets its responses. The daemon client implements this;
/// tests script it.
pub trait Source: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = anyhow::Result<HistoryResponse>> + Send;
}

/// Invoked exactly once, with the payload, when a session reaches
/// `Succeeded`.
pub type OnReady = Box<dyn FnOnce(Vec<RawPlay>) + Send>;

/// Latest known state of the session.
///
/// `payload` is set only in `Succeeded`; a success reply with empty
/// content never lands here, it goes back around the retry loop.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub status: FetchStatus,
    /// Most recent server-supplied status line, or [`FAILURE_MESSAGE`].
    pub message: String,
    pub payload: Option<Vec<RawPlay>>,
    /// Last transport error, kept for display alongside `message`.
    pub last_error: Option<String>,
}

/// A running poll session. Dropping it cancels any scheduled retry.
pub struct PollHandle {
    task: tokio::task::JoinHandle<()>,
    rx: watch::Receiver<Snapshot>,
}

impl PollHandle {
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.rx.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Run until the session reaches a terminal status and return it.
    pub async fn wait(mut self) -> Snapshot {
        loop {
            let snap = self.rx.borrow().clone();
            if snap.status.is_terminal() {
                return snap;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a poll session against `source`.
///
/// The first request goes out after the configured startup delay (one
/// base interval unless overridden); retry `k` waits `interval * 2^k`.
pub fn start_poll<S: Source>(
    source: S,
    config: &PollConfig,
    on_ready: Option<OnReady>,
) -> PollHandle {
    let (tx, rx) = watch::channel(Snapshot::default());
    let interval = config.interval();
    let max_retries = config.max_retries;
    let startup_delay = config.startup_delay();
    let task = tokio::spawn(run(
        source,
        interval,
        max_retries,
        startup_delay,
        tx,
        on_ready,
    ));
    PollHandle { task, rx }
}

async fn run<S: Source>(
    source: S,
    interval: Duration,
    max_retries: u32,
    startup_delay: Duration,
    tx: watch::Sender<Snapshot>,
    mut on_ready: Option<OnReady>,
) {
    tx.send_modify(|s| s.status = FetchStatus::Loading);
    debug!("[poll] session started, first request in {:?}", startup_delay);
    tokio::time::sleep(startup_delay).await;

    let mut retries: u32 = 0;
    loop {
        debug!("[poll] attempt {}", retries + 1);
        match source.fetch().await {
            Ok(resp) => {
                // The predicate runs on every response; a success status
                // alone does not end the session.
                let message = resp.message.clone();
                if resp.is_ready() {
                    let records = resp.into_records();
                    info!("[poll] history ready: {} records", records.len());
                    tx.send_modify(|s| {
                        s.status = FetchStatus::Succeeded;
                        s.message = message;
                        s.payload = Some(records.clone());
                        s.last_error = None;
                    });
                    if let Some(callback) = on_ready.take() {
                        callback(records);
                    }
                    return;
                }
                debug!("[poll] not ready: {}", message);
                tx.send_modify(|s| s.message = message);
            }
            Err(e) => {
                warn!("[poll] request failed: {:#}", e);
                tx.send_modify(|s| s.last_error = Some(e.to_string()));
            }
        }

        retries += 1;
        if retries > max_retries {
            warn!("[poll] giving up after {} retries", max_retries);
            tx.send_modify(|s| {
                s.status = FetchStatus::Failed;
                s.message = FAILURE_MESSAGE.to_string();
            });
            return;
        }
        let delay = interval.saturating_mul(2u32.saturating_pow(retries));
        debug!("[poll] retry {} of {} in {:?}", retries, max_retries, delay);
        tokio::time::sleep(delay).await;
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    enum Step {
        Transport,
        NotReady(&'static str),
        EmptySuccess,
        Ready(usize),
    }

    /// Plays back a fixed script; an exhausted script keeps failing at the
    /// transport level.
    struct Scripted {
        script: Arc<Mutex<VecDeque<Step>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: Arc::new(Mutex::new(steps.into_iter().collect())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Arc<Mutex<Vec<Instant>>> {
            self.calls.clone()
        }
    }

    impl Source for Scripted {
        fn fetch(&self) -> impl Future<Output = anyhow::Result<HistoryResponse>> + Send {
            let script = self.script.clone();
            let calls = self.calls.clone();
            async move {
                calls.lock().unwrap().push(Instant::now());
                let step = script.lock().unwrap().pop_front();
                match step {
                    None | Some(Step::Transport) => Err(anyhow::anyhow!("connection refused")),
                    Some(Step::NotReady(msg)) => Ok(HistoryResponse::not_ready(msg)),
                    Some(Step::EmptySuccess) => {
                        Ok(HistoryResponse::ready("JSON file found.", Vec::new()))
                    }
                    Some(Step::Ready(n)) => Ok(HistoryResponse::ready("JSON file found.", raw(n))),
                }
            }
        }
    }

    fn raw(n: usize) -> Vec<RawPlay> {
        (0..n)
            .map(|i| {
                RawPlay::new(
                    format!("t{i}"),
                    "A",
                    "x",
                    1_600_000_000_000 + i as i64 * 60_000,
                )
            })
            .collect()
    }

    fn config(interval_ms: u64) -> PollConfig {
        PollConfig {
            interval_ms,
            max_retries: 5,
            startup_delay_ms: None,
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let source = Scripted::new([
            Step::Transport,
            Step::Transport,
            Step::Transport,
            Step::Ready(2),
        ]);
        let calls = source.calls();
        let fired = Arc::new(AtomicUsize::new(0));
        let delivered = Arc::new(AtomicUsize::new(0));
        let (fired_cb, delivered_cb) = (fired.clone(), delivered.clone());

        let start = Instant::now();
        let handle = start_poll(
            source,
            &config(1_000),
            Some(Box::new(move |records| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
                delivered_cb.store(records.len(), Ordering::SeqCst);
            })),
        );
        let snap = handle.wait().await;

        assert_eq!(snap.status, FetchStatus::Succeeded);
        assert_eq!(snap.message, "JSON file found.");
        assert_eq!(snap.payload.map(|p| p.len()), Some(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);

        // First request after one startup interval, then three retries
        // with strictly doubling delays.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0] - start, secs(1));
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![secs(2), secs(4), secs(8)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_when_retry_budget_exhausted() {
        let source = Scripted::new([]);
        let calls = source.calls();

        let handle = start_poll(source, &config(1_000), None);
        let snap = handle.wait().await;

        assert_eq!(snap.status, FetchStatus::Failed);
        assert_eq!(snap.message, FAILURE_MESSAGE);
        assert!(snap.payload.is_none());
        assert!(snap.last_error.is_some());

        // Initial attempt plus five retries, then nothing more.
        assert_eq!(calls.lock().unwrap().len(), 6);
        tokio::time::sleep(secs(3_600)).await;
        assert_eq!(calls.lock().unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_replies_share_the_retry_path() {
        let source = Scripted::new([
            Step::NotReady("still processing"),
            Step::Transport,
            Step::Ready(1),
        ]);
        let calls = source.calls();

        let handle = start_poll(source, &config(1_000), None);

        // After the first response the server's own status line is visible.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let mid = handle.snapshot();
        assert_eq!(mid.status, FetchStatus::Loading);
        assert_eq!(mid.message, "still processing");

        let snap = handle.wait().await;
        assert_eq!(snap.status, FetchStatus::Succeeded);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_with_empty_content_keeps_polling() {
        let source = Scripted::new([Step::EmptySuccess, Step::EmptySuccess, Step::Ready(1)]);
        let calls = source.calls();

        let handle = start_poll(source, &config(1_000), None);
        let snap = handle.wait().await;

        assert_eq!(snap.status, FetchStatus::Succeeded);
        assert_eq!(snap.payload.map(|p| p.len()), Some(1));
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scheduled_retry() {
        let source = Scripted::new([]);
        let calls = source.calls();

        let mut config = config(1_000);
        config.startup_delay_ms = Some(0);
        let handle = start_poll(source, &config, None);

        // Let the first attempt fail; its retry is now scheduled 2s out.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        handle.cancel();
        tokio::time::sleep(secs(3_600)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Completion core shared by every wait strategy
//!
//! A [`WaitSink`] records the signals a tracker receives, replays them to
//! progress subscribers and resolves exactly one terminal outcome. Signals
//! arriving after the outcome are dropped.

use super::propagation::Materialized;
use super::signal::{SignalResult, WaitSignal};
use crate::errors::{codes, ErrorInfo, ErrorInfoCapable};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Errors resolving or managing a wait
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    /// A signal carried an error that terminates the wait
    #[error("Command {} failed at {}: {}", .0.command_id, .0.stage, .0.error_info())]
    Failed(Box<WaitSignal>),

    /// The wait did not complete before its deadline
    #[error("Waiting for command {wait_command_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// Tracked command
        wait_command_id: String,
        /// Deadline that elapsed
        timeout_ms: u64,
    },

    /// The caller stopped waiting before the wait resolved
    #[error("Waiting for command {0} was cancelled")]
    Cancelled(String),

    /// Another strategy is already registered for the command
    #[error("Wait strategy already registered for command {0}")]
    AlreadyRegistered(String),

    /// Misuse of a tracker
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A signal could not be delivered to its endpoint
    #[error("Signal transport error: {0}")]
    Transport(String),
}

impl WaitError {
    /// The failing signal, for [`WaitError::Failed`]
    pub fn signal(&self) -> Option<&WaitSignal> {
        match self {
            WaitError::Failed(signal) => Some(signal),
            _ => None,
        }
    }
}

impl ErrorInfoCapable for WaitError {
    fn error_code(&self) -> &'static str {
        match self {
            WaitError::Timeout { .. } | WaitError::Cancelled(_) => codes::REQUEST_TIMEOUT,
            WaitError::AlreadyRegistered(_) | WaitError::IllegalState(_) => codes::ILLEGAL_STATE,
            WaitError::Failed(_) | WaitError::Transport(_) => codes::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_error_info(&self) -> ErrorInfo {
        match self {
            WaitError::Failed(signal) => signal.error_info(),
            other => ErrorInfo::of(other.error_code(), other.to_string()),
        }
    }
}

/// Terminal outcome of a wait
pub type WaitOutcome = Result<WaitSignal, WaitError>;

/// Progress stream of the signals a tracker received; ends on completion
pub type WaitingStream = UnboundedReceiverStream<WaitSignal>;

/// Hook run exactly once when a tracker completes
pub type FinallyHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SinkState {
    signals: Vec<WaitSignal>,
    subscribers: Vec<mpsc::UnboundedSender<WaitSignal>>,
    finally: Option<FinallyHook>,
    finally_set: bool,
    completed: bool,
}

/// Signal buffer plus single-resolution outcome of a tracker
pub struct WaitSink {
    state: Mutex<SinkState>,
    outcome: watch::Sender<Option<WaitOutcome>>,
}

impl Default for WaitSink {
    fn default() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            state: Mutex::new(SinkState::default()),
            outcome,
        }
    }
}

impl fmt::Debug for WaitSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("WaitSink")
            .field("signals", &state.signals.len())
            .field("completed", &state.completed)
            .finish()
    }
}

impl WaitSink {
    /// Create a pending sink
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a signal; `false` when the sink already completed
    pub fn record(&self, signal: &WaitSignal) -> bool {
        let mut state = self.lock();
        if state.completed {
            debug!(
                wait_command_id = %signal.wait_command_id,
                stage = %signal.stage,
                "Wait already completed, signal ignored"
            );
            return false;
        }
        state.signals.push(signal.clone());
        state
            .subscribers
            .retain(|subscriber| subscriber.send(signal.clone()).is_ok());
        true
    }

    /// Resolve the outcome; only the first call has an effect
    pub fn complete(&self, outcome: WaitOutcome) -> bool {
        let (hook, subscribers) = {
            let mut state = self.lock();
            if state.completed {
                return false;
            }
            state.completed = true;
            (state.finally.take(), std::mem::take(&mut state.subscribers))
        };
        self.outcome.send_replace(Some(outcome));
        drop(subscribers);
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    /// Whether the outcome is resolved
    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// The resolved outcome, if any
    pub fn outcome(&self) -> Option<WaitOutcome> {
        self.outcome.borrow().clone()
    }

    /// Signals received so far, in arrival order
    pub fn signals(&self) -> Vec<WaitSignal> {
        self.lock().signals.clone()
    }

    /// Install the completion hook; may be called once
    ///
    /// The hook runs immediately when the sink is already completed.
    pub fn on_finally(&self, hook: FinallyHook) -> Result<(), WaitError> {
        let mut state = self.lock();
        if state.finally_set {
            return Err(WaitError::IllegalState("finally hook already set".to_string()));
        }
        state.finally_set = true;
        if state.completed {
            drop(state);
            hook();
        } else {
            state.finally = Some(hook);
        }
        Ok(())
    }

    /// Stream replaying the received signals, then following new ones until completion
    pub fn waiting(&self) -> WaitingStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        for signal in &state.signals {
            if sender.send(signal.clone()).is_err() {
                warn!("Progress subscriber dropped during replay");
                break;
            }
        }
        if !state.completed {
            state.subscribers.push(sender);
        }
        UnboundedReceiverStream::new(receiver)
    }

    /// Wait for the terminal outcome
    pub async fn wait(&self) -> WaitOutcome {
        let mut receiver = self.outcome.subscribe();
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| WaitError::IllegalState("wait outcome channel closed".to_string()))?
            .clone();
        outcome.unwrap_or_else(|| Err(WaitError::IllegalState("missing wait outcome".to_string())))
    }

    /// Wait for completion, then fold the result payloads of every received
    /// signal, ordered by signal time, into the latest signal
    pub async fn wait_last(&self) -> WaitOutcome {
        let completion = self.wait().await?;
        let mut signals = self.signals();
        signals.sort_by_key(|signal| signal.signal_time);
        let mut result = SignalResult::new();
        for signal in &signals {
            result.extend(signal.result.clone());
        }
        match signals.last() {
            Some(last) => Ok(last.with_result(result)),
            None => Ok(completion),
        }
    }
}

/// A process-local tracker for one command
#[async_trait]
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// Command whose signals this tracker receives
    fn wait_command_id(&self) -> &str;

    /// Serializable descriptor of what is awaited
    fn materialized(&self) -> Materialized;

    /// Feed a signal to the tracker
    fn next(&self, signal: WaitSignal);

    /// Completion core of the tracker
    fn sink(&self) -> &WaitSink;

    /// Resolve the tracker with an error, e.g. on timeout
    fn fail(&self, error: WaitError) -> bool {
        self.sink().complete(Err(error))
    }

    /// Whether the tracker resolved
    fn completed(&self) -> bool {
        self.sink().is_completed()
    }

    /// Install the completion hook; may be called once
    fn on_finally(&self, hook: FinallyHook) -> Result<(), WaitError> {
        self.sink().on_finally(hook)
    }

    /// Progress stream of received signals
    fn waiting(&self) -> WaitingStream {
        self.sink().waiting()
    }

    /// Terminal outcome
    async fn wait(&self) -> WaitOutcome {
        self.sink().wait().await
    }

    /// Terminal outcome with merged result payloads
    async fn wait_last(&self) -> WaitOutcome {
        self.sink().wait_last().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NamedAggregate;
    use crate::wait::CommandStage;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn signal(stage: CommandStage, time: i64, key: &str) -> WaitSignal {
        WaitSignal::builder("cmd", NamedAggregate::new("t", "a").aggregate_id("1"), stage)
            .result(key, serde_json::json!(time))
            .signal_time(time)
            .build()
    }

    #[tokio::test]
    async fn test_single_resolution() {
        let sink = WaitSink::new();
        assert!(sink.record(&signal(CommandStage::Sent, 1, "a")));
        assert!(sink.complete(Ok(signal(CommandStage::Processed, 2, "b"))));
        assert!(!sink.complete(Err(WaitError::IllegalState("late".into()))));
        assert!(!sink.record(&signal(CommandStage::Processed, 3, "c")));

        let outcome = sink.wait().await.unwrap();
        assert_eq!(outcome.stage, CommandStage::Processed);
        assert_eq!(sink.signals().len(), 1);
    }

    #[tokio::test]
    async fn test_waiting_replays_then_ends() {
        let sink = Arc::new(WaitSink::new());
        sink.record(&signal(CommandStage::Sent, 1, "a"));
        let stream = sink.waiting();
        sink.record(&signal(CommandStage::Processed, 2, "b"));
        sink.complete(Ok(signal(CommandStage::Processed, 2, "b")));

        let stages: Vec<_> = stream.map(|s| s.stage).collect().await;
        assert_eq!(stages, vec![CommandStage::Sent, CommandStage::Processed]);
    }

    #[tokio::test]
    async fn test_wait_last_merges_results_by_time() {
        let sink = WaitSink::new();
        let late = signal(CommandStage::Processed, 20, "late");
        sink.record(&late);
        sink.record(&signal(CommandStage::Sent, 10, "early"));
        sink.complete(Ok(late));

        let last = sink.wait_last().await.unwrap();
        assert_eq!(last.stage, CommandStage::Processed);
        assert_eq!(last.result.len(), 2);
        assert_eq!(last.result["early"], 10);
    }

    #[tokio::test]
    async fn test_finally_hook_runs_once_and_is_set_once() {
        let sink = WaitSink::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        sink.on_finally(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(sink.on_finally(Box::new(|| {})).is_err());

        sink.complete(Err(WaitError::IllegalState("x".into())));
        sink.complete(Err(WaitError::IllegalState("y".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_finally_after_completion_runs_immediately() {
        let sink = WaitSink::new();
        sink.complete(Ok(signal(CommandStage::Sent, 1, "a")));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        sink.on_finally(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_error_info_keeps_signal_identity() {
        let failed = WaitSignal::builder(
            "cmd",
            NamedAggregate::new("t", "a").aggregate_id("1"),
            CommandStage::Processed,
        )
        .error(&ErrorInfo::of("OutOfStock", "none left"))
        .build();
        let error = WaitError::Failed(Box::new(failed));
        assert_eq!(error.to_error_info(), ErrorInfo::of("OutOfStock", "none left"));
        assert!(error.signal().is_some());
    }
}

//! Supervised, cancellable subscriptions.
//!
//! A [`Supervisor`] runs each subscription on its own tokio task with a
//! child [`CancellationToken`] and consults a [`RetryPolicy`] whenever the
//! subscription terminates. The default policy, [`NoRetry`], keeps the
//! dispatcher's log-and-stop behaviour.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use super::dispatcher::{subscribe, ChangeEvent};
use crate::config::RetryPolicyConfig;
use crate::errors::{Error, Result};
use crate::secrets::SecretStore;

/// Decides whether, and after how long, a terminated subscription is resumed.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Delay before resubscribing after `attempt` consecutive failures
    /// (starting at 1), or `None` to give up.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Never resubscribe.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Doubling delay, capped at `max`, optionally bounded in attempts.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, max_attempts: None }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }

        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

impl RetryPolicyConfig {
    /// Build the policy this configuration describes.
    pub fn build(&self) -> Arc<dyn RetryPolicy> {
        match self {
            Self::None => Arc::new(NoRetry),
            Self::Exponential { initial_ms, max_ms, max_attempts } => {
                let backoff = ExponentialBackoff::new(
                    Duration::from_millis(*initial_ms),
                    Duration::from_millis(*max_ms),
                );
                match max_attempts {
                    Some(max) => Arc::new(backoff.with_max_attempts(*max)),
                    None => Arc::new(backoff),
                }
            }
        }
    }
}

/// Handle to one supervised subscription.
///
/// Dropping the handle leaves the subscription running; stop it with
/// [`WatchHandle::cancel`] or by cancelling the supervisor.
#[derive(Debug)]
pub struct WatchHandle {
    secret: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl WatchHandle {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Signal the subscription to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the subscription task to end.
    ///
    /// `Ok(())` after cancellation, [`Error::WatchTerminated`] when the
    /// retry policy gave up.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::internal(format!(
                "Watch task for secret '{}' failed: {}",
                self.secret, e
            ))),
        }
    }

    /// Cancel and wait.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel();
        self.join().await
    }
}

/// Spawns subscriptions against one store under a shared cancellation root.
pub struct Supervisor<S: SecretStore + ?Sized> {
    store: Arc<S>,
    policy: Arc<dyn RetryPolicy>,
    cancel: CancellationToken,
}

impl<S: SecretStore + ?Sized> Clone for Supervisor<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), policy: self.policy.clone(), cancel: self.cancel.clone() }
    }
}

impl<S: SecretStore + ?Sized> fmt::Debug for Supervisor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore + ?Sized + 'static> Supervisor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, policy: Arc::new(NoRetry), cancel: CancellationToken::new() }
    }

    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Parent every spawned subscription under `cancel`.
    ///
    /// The supervisor keeps a child of `cancel`: cancelling `cancel` stops
    /// every subscription, while [`Supervisor::shutdown`] leaves it untouched.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel.child_token();
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Spawn a subscription for `name` in `namespace`.
    pub fn spawn<H>(
        &self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        handler: H,
    ) -> WatchHandle
    where
        H: FnMut(ChangeEvent) + Send + 'static,
    {
        let name = name.into();
        let namespace = namespace.into();
        let cancel = self.cancel.child_token();
        let span = crate::watch_span!(name, namespace);

        let task = tokio::spawn(
            run_supervised(
                self.store.clone(),
                self.policy.clone(),
                name.clone(),
                namespace,
                handler,
                cancel.clone(),
            )
            .instrument(span),
        );

        WatchHandle { secret: name, cancel, task }
    }

    /// Cancel every subscription spawned by this supervisor. A parent token
    /// given to [`Supervisor::with_cancellation`] is not cancelled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn run_supervised<S, H>(
    store: Arc<S>,
    policy: Arc<dyn RetryPolicy>,
    name: String,
    namespace: String,
    mut handler: H,
    cancel: CancellationToken,
) -> Result<()>
where
    S: SecretStore + ?Sized,
    H: FnMut(ChangeEvent) + Send,
{
    let mut attempt = 0u32;

    loop {
        let mut delivered = false;
        let result = subscribe(
            store.as_ref(),
            &name,
            &namespace,
            |event| {
                delivered = true;
                handler(event);
            },
            &cancel,
        )
        .await;

        let error = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        // A subscription that got events before breaking starts a fresh backoff.
        if delivered {
            attempt = 0;
        }
        attempt = attempt.saturating_add(1);

        let Some(delay) = policy.next_delay(attempt) else {
            warn!(error = %error, attempt, "Subscription terminated, not resubscribing");
            return Err(error);
        };

        info!(attempt, delay_ms = delay.as_millis() as u64, "Resubscribing after watch failure");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{MemorySecretStore, SecretSnapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_for_watchers(store: &MemorySecretStore, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.watcher_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watchers never subscribed");
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
            .with_max_attempts(5);

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.next_delay(5), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(6), None);
        assert_eq!(NoRetry.next_delay(1), None);
    }

    #[test]
    fn test_policy_from_config() {
        assert_eq!(RetryPolicyConfig::None.build().next_delay(1), None);

        let policy = RetryPolicyConfig::Exponential {
            initial_ms: 50,
            max_ms: 60,
            max_attempts: Some(2),
        }
        .build();
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(60)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[tokio::test]
    async fn test_handle_cancel_stops_subscription() {
        let store = MemorySecretStore::new();
        let supervisor = Supervisor::new(Arc::new(store.clone()));

        let handle = supervisor.spawn("kafka-tls", "default", |_| {});
        wait_for_watchers(&store, 1).await;
        assert_eq!(handle.secret(), "kafka-tls");
        assert!(!handle.is_finished());

        assert!(handle.shutdown().await.is_ok());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_supervisor_shutdown_cancels_children() {
        let store = MemorySecretStore::new();
        let supervisor = Supervisor::new(Arc::new(store.clone()));

        let first = supervisor.spawn("a-tls", "default", |_| {});
        let second = supervisor.spawn("b-tls", "default", |_| {});
        wait_for_watchers(&store, 2).await;

        supervisor.shutdown();
        assert!(first.join().await.is_ok());
        assert!(second.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_parent_token_alone() {
        let store = MemorySecretStore::new();
        let parent = CancellationToken::new();
        let supervisor = Supervisor::new(Arc::new(store.clone())).with_cancellation(parent.clone());

        let handle = supervisor.spawn("kafka-tls", "default", |_| {});
        wait_for_watchers(&store, 1).await;

        supervisor.shutdown();
        assert!(handle.join().await.is_ok());
        assert!(supervisor.cancellation_token().is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_subscriptions() {
        let store = MemorySecretStore::new();
        let parent = CancellationToken::new();
        let supervisor = Supervisor::new(Arc::new(store.clone())).with_cancellation(parent.clone());

        let handle = supervisor.spawn("kafka-tls", "default", |_| {});
        wait_for_watchers(&store, 1).await;

        parent.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_no_retry_reports_termination() {
        let store = MemorySecretStore::new();
        let supervisor = Supervisor::new(Arc::new(store.clone()));

        let handle = supervisor.spawn("kafka-tls", "default", |_| {});
        wait_for_watchers(&store, 1).await;
        store.break_watches("stream reset");

        let err = tokio::time::timeout(Duration::from_secs(2), handle.join()).await.unwrap().unwrap_err();
        assert!(matches!(err, Error::WatchTerminated { .. }));
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_backoff_resubscribes() {
        let store = MemorySecretStore::new();
        let supervisor = Supervisor::new(Arc::new(store.clone())).with_policy(Arc::new(
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50)),
        ));
        let events = Arc::new(AtomicUsize::new(0));

        let handle = {
            let events = events.clone();
            supervisor.spawn("kafka-tls", "default", move |_| {
                events.fetch_add(1, Ordering::SeqCst);
            })
        };
        wait_for_watchers(&store, 1).await;

        store.break_watches("stream reset");
        // Resubscribed: the old receiver is gone, a new one appears.
        tokio::time::sleep(Duration::from_millis(100)).await;
        wait_for_watchers(&store, 1).await;

        store
            .apply("kafka-tls", "default", SecretSnapshot::new().with_field("kafka.cert.pem", "x"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while events.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(!handle.is_finished());
        assert!(handle.shutdown().await.is_ok());
    }
}

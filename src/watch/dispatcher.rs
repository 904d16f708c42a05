//! Secret change dispatcher.
//!
//! Turns the store's raw, namespace-wide watch stream into a classified
//! stream for exactly one secret, handed to one handler in store order.

use futures::StreamExt;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::secrets::{RawSecretEvent, SecretSnapshot, SecretStore};

/// Classification of a change to one secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified change delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added { secret: String, data: SecretSnapshot },
    Updated { secret: String, data: SecretSnapshot },
    Deleted { secret: String },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    pub fn secret_name(&self) -> &str {
        match self {
            Self::Added { secret, .. } | Self::Updated { secret, .. } | Self::Deleted { secret } => {
                secret
            }
        }
    }

    /// Snapshot carried by `Added`/`Updated`; `None` for `Deleted`.
    pub fn data(&self) -> Option<&SecretSnapshot> {
        match self {
            Self::Added { data, .. } | Self::Updated { data, .. } => Some(data),
            Self::Deleted { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<SecretSnapshot> {
        match self {
            Self::Added { data, .. } | Self::Updated { data, .. } => Some(data),
            Self::Deleted { .. } => None,
        }
    }
}

impl From<RawSecretEvent> for ChangeEvent {
    fn from(raw: RawSecretEvent) -> Self {
        match raw {
            RawSecretEvent::Applied { secret, existed: false } => {
                Self::Added { secret: secret.name, data: secret.data }
            }
            RawSecretEvent::Applied { secret, existed: true } => {
                Self::Updated { secret: secret.name, data: secret.data }
            }
            RawSecretEvent::Deleted { secret } => Self::Deleted { secret: secret.name },
        }
    }
}

/// Subscribe to changes of one secret until cancelled or the watch breaks.
///
/// Events for any other secret are dropped. `handler` runs inline on the
/// calling task, so invocations for one subscription never overlap and
/// follow the store's order.
///
/// There is no reconnect here. A failed or ended watch is logged and
/// returned as [`Error::WatchTerminated`]; resubscribing is the job of a
/// supervising caller such as [`super::Supervisor`].
///
/// Returns `Ok(())` only when `cancel` fires.
pub async fn subscribe<S, H>(
    store: &S,
    name: &str,
    namespace: &str,
    mut handler: H,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: SecretStore + ?Sized,
    H: FnMut(ChangeEvent) + Send,
{
    let metrics = MetricsRecorder::new();

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        opened = store.watch(name, namespace) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            error!(secret = %name, namespace = %namespace, error = %e, "Failed to open secret watch");
            metrics.record_watch_terminated(name);
            return Err(Error::watch_terminated(name, e.to_string()));
        }
    };

    debug!(secret = %name, namespace = %namespace, "Secret watch started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(secret = %name, namespace = %namespace, "Secret watch cancelled");
                return Ok(());
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(raw)) => {
                let secret = raw.secret();
                if secret.name != name || secret.namespace != namespace {
                    continue;
                }

                let event = ChangeEvent::from(raw);
                debug!(secret = %name, kind = %event.kind(), "Dispatching secret change");
                metrics.record_watch_event(name, event.kind().as_str());
                handler(event);
            }
            Some(Err(e)) => {
                error!(secret = %name, namespace = %namespace, error = %e, "Secret watch terminated");
                metrics.record_watch_terminated(name);
                return Err(Error::watch_terminated(name, e.to_string()));
            }
            None => {
                warn!(secret = %name, namespace = %namespace, "Secret watch stream ended");
                metrics.record_watch_terminated(name);
                return Err(Error::watch_terminated(name, "watch stream ended"));
            }
        }
    }
}

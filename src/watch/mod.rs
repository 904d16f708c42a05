//! # Secret Watches
//!
//! [`subscribe`] is the secret change dispatcher: one filtered, classified
//! stream per secret, delivered sequentially to one handler. It never
//! reconnects on its own.
//!
//! [`Supervisor`] runs subscriptions on background tasks with explicit
//! cancellation and an optional [`RetryPolicy`]:
//!
//! ```rust,ignore
//! let supervisor = Supervisor::new(store.clone())
//!     .with_policy(settings.watch_retry.build());
//! let handle = supervisor.spawn("workflowtrigger-tls", "default", |event| {
//!     tracing::info!(kind = %event.kind(), "secret changed");
//! });
//! handle.shutdown().await?;
//! ```

pub mod dispatcher;
pub mod supervisor;

pub use dispatcher::{subscribe, ChangeEvent, ChangeKind};
pub use supervisor::{ExponentialBackoff, NoRetry, RetryPolicy, Supervisor, WatchHandle};

//! Stop hooks
//!
//! Hooks are notified whenever a job's container stops, whatever the reason
//! (exit, stop request, reconciliation). They are registered once at startup
//! and run in registration order. A failing or panicking hook is logged and
//! never affects the hooks after it or the caller.

mod callback;

pub use callback::CallbackHook;

use async_trait::async_trait;
use harrow_core::domain::job::JobState;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notified when a job's container stops
#[async_trait]
pub trait StopHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn notify(&self, job_id: &str, state: &JobState) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into a [`StopHook`]
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&str, &JobState) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> StopHook for FnHook<F>
where
    F: Fn(&str, &JobState) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, job_id: &str, state: &JobState) -> anyhow::Result<()> {
        (self.f)(job_id, state)
    }
}

/// Ordered list of stop hooks
#[derive(Clone, Default)]
pub struct StopHookDispatcher {
    hooks: Vec<Arc<dyn StopHook>>,
}

impl StopHookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook; the same hook may be registered more than once
    pub fn register(&mut self, hook: Arc<dyn StopHook>) {
        debug!("Registered stop hook '{}'", hook.name());
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in order, returning how many succeeded
    pub async fn trigger(&self, job_id: &str, state: &JobState) -> usize {
        if self.is_empty() {
            return 0;
        }

        let mut succeeded = 0;

        for hook in &self.hooks {
            // Each hook runs in its own task so a panic surfaces as a JoinError
            let task = {
                let hook = Arc::clone(hook);
                let job_id = job_id.to_string();
                let state = state.clone();
                tokio::spawn(async move { hook.notify(&job_id, &state).await })
            };

            match task.await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    warn!("Stop hook '{}' failed for job {}: {:#}", hook.name(), job_id, e)
                }
                Err(e) => {
                    warn!("Stop hook '{}' panicked for job {}: {}", hook.name(), job_id, e)
                }
            }
        }

        debug!(
            "Stop hooks for job {} ({}): {}/{} succeeded",
            job_id,
            state.status,
            succeeded,
            self.len()
        );
        succeeded
    }
}

// Step definitions, contexts and the shared result store

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Stateless description of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub name: String,
    pub description: String,
    /// Required steps fail the run; optional ones only record their error
    pub required: bool,
    /// Scoped to this step only, derived from the run's token
    pub timeout: Option<Duration>,
}

impl StepInfo {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required: true,
            timeout: None,
        }
    }
}

/// Key/value results shared between the steps of one workflow
///
/// Typed per workflow: pick `V` as an enum of everything steps exchange.
#[derive(Debug)]
pub struct ResultStore<V> {
    inner: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> Clone for ResultStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for ResultStore<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<V: Clone> ResultStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one under `key`
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.write().insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, V> {
        self.inner.read().clone()
    }
}

/// Everything a workflow step sees while running
#[derive(Debug)]
pub struct StepContext<V> {
    /// Step-scoped token: fires on run cancellation or step timeout
    pub ctx: CancellationToken,
    pub session_id: Arc<str>,
    pub step: Arc<str>,
    pub results: ResultStore<V>,
}

/// Side-effecting workflow step routine
#[async_trait]
pub trait StepAction<V>: Send + Sync {
    async fn run(&self, ctx: StepContext<V>) -> Result<()>;
}

#[async_trait]
impl<V, F, Fut> StepAction<V> for F
where
    V: Send + Sync + 'static,
    F: Fn(StepContext<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: StepContext<V>) -> Result<()> {
        (self)(ctx).await
    }
}

/// Value-chain stage routine: consumes the previous output, produces the next input
#[async_trait]
pub trait StageAction<T>: Send + Sync {
    async fn run(&self, ctx: CancellationToken, input: T) -> Result<T>;
}

#[async_trait]
impl<T, F, Fut> StageAction<T> for F
where
    T: Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    async fn run(&self, ctx: CancellationToken, input: T) -> Result<T> {
        (self)(ctx, input).await
    }
}

macro_rules! step_builder {
    ($ty:ident) => {
        impl<X> $ty<X> {
            pub fn description(mut self, description: impl Into<String>) -> Self {
                self.info.description = description.into();
                self
            }

            /// Failures are recorded but do not fail the run
            pub fn optional(mut self) -> Self {
                self.info.required = false;
                self
            }

            pub fn required(mut self, required: bool) -> Self {
                self.info.required = required;
                self
            }

            pub fn timeout(mut self, timeout: Duration) -> Self {
                self.info.timeout = Some(timeout);
                self
            }

            pub fn info(&self) -> &StepInfo {
                &self.info
            }

            pub fn name(&self) -> &str {
                &self.info.name
            }
        }
    };
}

/// Workflow step: independent unit communicating through the result store
pub struct WorkflowStep<V> {
    pub(crate) info: StepInfo,
    pub(crate) action: Arc<dyn StepAction<V>>,
}

impl<V> WorkflowStep<V> {
    /// Required step with no timeout
    pub fn new(name: impl Into<String>, action: impl StepAction<V> + 'static) -> Self {
        Self {
            info: StepInfo::new(name),
            action: Arc::new(action),
        }
    }
}

step_builder!(WorkflowStep);

/// Pipeline step: one link of a typed value chain
pub struct PipelineStep<T> {
    pub(crate) info: StepInfo,
    pub(crate) action: Arc<dyn StageAction<T>>,
}

impl<T> PipelineStep<T> {
    /// Required step with no timeout
    pub fn new(name: impl Into<String>, action: impl StageAction<T> + 'static) -> Self {
        Self {
            info: StepInfo::new(name),
            action: Arc::new(action),
        }
    }
}

step_builder!(PipelineStep);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_metadata() {
        let step: WorkflowStep<()> = WorkflowStep::new("crawl", |_ctx: StepContext<()>| async {
            Ok::<(), crate::error::AppError>(())
        })
        .description("discover pages")
        .optional()
        .timeout(Duration::from_secs(30));

        assert_eq!(step.name(), "crawl");
        assert_eq!(step.info().description, "discover pages");
        assert!(!step.info().required);
        assert_eq!(step.info().timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_result_store_shared_between_clones() {
        let store: ResultStore<u32> = ResultStore::new();
        let other = store.clone();

        assert!(store.insert("pages", 10).is_none());
        assert_eq!(other.get("pages"), Some(10));
        assert_eq!(other.insert("pages", 12), Some(10));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove("pages"), Some(12));
        assert!(other.is_empty());
    }
}

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{CacheError, SharedFailure};

type SyncFactory<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

/// A compute-once cell for synchronous factories.
///
/// The first caller to [`Deferred::force`] runs the factory; every other
/// caller, concurrent or later, blocks until that run completes and then
/// observes the same memoized outcome (value or failure) without the factory
/// ever running again. Cross-thread visibility of the memoized outcome is
/// handled by the `OnceCell` synchronization, so no double-checked locking is
/// needed here.
///
/// Successes are memoized as `Arc<T>` so every observer shares one instance.
pub struct Deferred<T> {
    cell: OnceCell<Result<Arc<T>, SharedFailure>>,
    factory: Mutex<Option<SyncFactory<T>>>,
}

impl<T> Deferred<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Mutex::new(Some(Box::new(factory))),
        }
    }

    /// Whether the factory has already run to completion.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Runs the factory if this is the first call, otherwise returns the
    /// memoized outcome. Blocks while another thread is mid-computation.
    pub fn force(&self) -> Result<Arc<T>, CacheError> {
        let outcome = self.cell.get_or_init(|| {
            let factory = self.factory.lock().take();
            match factory {
                Some(factory) => factory().map(Arc::new).map_err(SharedFailure::new),
                // Unreachable unless the cell was torn down mid-initialization.
                None => Err(SharedFailure::new(anyhow!(
                    "deferred factory already consumed without a memoized outcome"
                ))),
            }
        });
        outcome.clone().map_err(CacheError::Factory)
    }
}

type SharedOutcome<T> = Result<Arc<T>, SharedFailure>;

/// A compute-once cell for asynchronous factories.
///
/// The factory's future is memoized as a [`Shared`] future, so all awaiting
/// callers poll the *same* future instance on their own execution context;
/// there is no spawn and no forced background-thread dispatch. The factory
/// closure itself is only invoked on first poll, never merely by constructing
/// or cloning this cell.
pub struct AsyncDeferred<T>
where
    T: Send + Sync + 'static,
{
    shared: Shared<BoxFuture<'static, SharedOutcome<T>>>,
}

impl<T> AsyncDeferred<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = async move {
            match factory().await {
                Ok(value) => Ok(Arc::new(value)),
                Err(error) => Err(SharedFailure::new(error)),
            }
        }
        .boxed()
        .shared();
        Self { shared }
    }

    /// Whether the shared future has already completed.
    pub fn is_resolved(&self) -> bool {
        self.shared.peek().is_some()
    }

    /// Awaits the shared computation; at most one factory execution across
    /// every clone and caller of this cell.
    pub async fn force(&self) -> Result<Arc<T>, CacheError> {
        self.shared.clone().await.map_err(CacheError::Factory)
    }
}

//! Immutable, type-indexed multicast executors.
//!
//! An executor maps a value's live runtime type to the handlers registered
//! for it and runs them all concurrently. Executors are immutable: every
//! structural change (`add_handler`, `remove_handlers`, `require_handlers`)
//! returns a new executor and rebuilds the type index, leaving the receiver
//! untouched. That keeps the hot dispatch path lock-free and lets multiple
//! views of one registration (base handlers plus ad-hoc test doubles)
//! coexist without aliasing.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::DispatchError;
use crate::handler::{Handler, ScopedHandler};

/// Immutable executor configuration.
///
/// Carries one flag: whether dispatching a type with no registered handler
/// is a silent no-op (the default) or a
/// [`DispatchError::HandlerNotFound`] failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    require_handlers: bool,
}

impl ExecutorOptions {
    /// Whether dispatch to an unregistered type fails.
    pub fn require_handlers(&self) -> bool {
        self.require_handlers
    }

    /// Return a copy with the `require_handlers` flag set to `value`.
    pub fn with_require_handlers(self, value: bool) -> Self {
        Self {
            require_handlers: value,
        }
    }
}

/// Scope-less multicast executor: routes a value to every handler
/// registered for its live type.
///
/// Safe to share across tasks: the handler index is read-only after
/// construction, so concurrent dispatch needs no locking. Construction is
/// cheap enough for per-request use; immutability makes singleton use safe.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    handlers: Vec<Handler>,
    index: HashMap<TypeId, Vec<Handler>>,
    options: ExecutorOptions,
}

impl Executor {
    /// Build an executor from any iterable of handlers.
    ///
    /// Handlers keep their registration order within each data type. The
    /// index keys are exactly the distinct data types present in the
    /// handler list.
    pub fn new(handlers: impl IntoIterator<Item = Handler>, options: ExecutorOptions) -> Self {
        let handlers: Vec<Handler> = handlers.into_iter().collect();
        let mut index: HashMap<TypeId, Vec<Handler>> = HashMap::new();
        for handler in &handlers {
            index.entry(handler.data_type()).or_default().push(handler.clone());
        }

        Self {
            handlers,
            index,
            options,
        }
    }

    /// Dispatch a value to all handlers registered for its type.
    ///
    /// All matching handlers are started before any is awaited, so slow
    /// handlers do not serialize behind fast ones; the call completes only
    /// when every handler has completed.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::HandlerNotFound`] -- no handler is registered for
    ///   the type and the executor requires handlers.
    /// * [`DispatchError::HandlerFailed`] -- a handler's callable failed;
    ///   the attempted value is attached.
    pub async fn execute<M>(&self, data: M) -> Result<(), DispatchError>
    where
        M: Any + Send + Sync,
    {
        self.execute_arc(Arc::new(data)).await
    }

    /// Dispatch an already type-erased value.
    ///
    /// Resolution keys on the value's live type, which lets callers route
    /// values whose concrete type is not known at the call site (e.g.
    /// records drained from a subscription).
    pub async fn execute_arc(&self, data: Arc<dyn Any + Send + Sync>) -> Result<(), DispatchError> {
        let Some(handlers) = self.index.get(&(*data).type_id()) else {
            return self.no_handler_outcome();
        };

        let invocations: Vec<_> = handlers.iter().map(|h| h.invoke(Arc::clone(&data))).collect();
        let results = join_all(invocations).await;

        let failure = handlers
            .iter()
            .zip(results)
            .find_map(|(handler, result)| result.err().map(|e| (handler.data_type_name(), e)));
        match failure {
            Some((attempted_type, source)) => Err(DispatchError::HandlerFailed {
                attempted: data,
                attempted_type,
                scope: None,
                source,
            }),
            None => Ok(()),
        }
    }

    /// Blocking form of [`execute`](Executor::execute).
    ///
    /// Semantically identical -- same success and failure outcomes -- the
    /// caller just waits on a dedicated current-thread runtime instead of
    /// suspending. Must not be called from inside an async context.
    pub fn execute_blocking<M>(&self, data: M) -> Result<(), DispatchError>
    where
        M: Any + Send + Sync,
    {
        blocking_runtime().block_on(self.execute(data))
    }

    /// Return a new executor with one more handler; the receiver is
    /// unchanged.
    pub fn add_handler(&self, handler: Handler) -> Self {
        let mut handlers = self.handlers.clone();
        handlers.push(handler);
        Self::new(handlers, self.options)
    }

    /// Return a new executor with all handlers for exactly `M` removed.
    ///
    /// A no-op (not an error) when no handler for `M` is registered;
    /// handlers for other types are unaffected.
    pub fn remove_handlers<M>(&self) -> Self
    where
        M: Any + Send + Sync,
    {
        let data_type = TypeId::of::<M>();
        let handlers: Vec<Handler> = self
            .handlers
            .iter()
            .filter(|h| h.data_type() != data_type)
            .cloned()
            .collect();
        Self::new(handlers, self.options)
    }

    /// Return a new executor that fails dispatch to unregistered types.
    pub fn require_handlers(&self) -> Self {
        Self::new(
            self.handlers.clone(),
            self.options.with_require_handlers(true),
        )
    }

    /// The distinct data types currently handled.
    pub fn data_types(&self) -> Vec<TypeId> {
        self.index.keys().copied().collect()
    }

    /// Names of the distinct data types currently handled, in first
    /// registration order.
    pub fn data_type_names(&self) -> Vec<&'static str> {
        let mut seen = Vec::new();
        for handler in &self.handlers {
            if !seen.contains(&handler.data_type_name()) {
                seen.push(handler.data_type_name());
            }
        }
        seen
    }

    fn no_handler_outcome(&self) -> Result<(), DispatchError> {
        if self.options.require_handlers() {
            return Err(DispatchError::HandlerNotFound);
        }
        tracing::trace!("no handler registered, dispatch is a no-op");
        Ok(())
    }
}

/// Scoped multicast executor: routes a value plus a shared scope object to
/// every handler registered for the value's live type.
///
/// The scoped counterpart of [`Executor`]; dispatch failures additionally
/// attach the scope.
///
/// # Type Parameters
///
/// * `S` - The scope type passed alongside every dispatched value.
pub struct ScopedExecutor<S> {
    handlers: Vec<ScopedHandler<S>>,
    index: HashMap<TypeId, Vec<ScopedHandler<S>>>,
    options: ExecutorOptions,
}

// Manual `Clone`/`Default` because `S` itself need not be `Clone` or
// `Default` -- only the handler adapters are duplicated.
impl<S> Clone for ScopedExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            index: self.index.clone(),
            options: self.options,
        }
    }
}

impl<S: Send + Sync + 'static> Default for ScopedExecutor<S> {
    fn default() -> Self {
        Self::new([], ExecutorOptions::default())
    }
}

impl<S> ScopedExecutor<S>
where
    S: Send + Sync + 'static,
{
    /// Build a scoped executor from any iterable of handlers.
    pub fn new(
        handlers: impl IntoIterator<Item = ScopedHandler<S>>,
        options: ExecutorOptions,
    ) -> Self {
        let handlers: Vec<ScopedHandler<S>> = handlers.into_iter().collect();
        let mut index: HashMap<TypeId, Vec<ScopedHandler<S>>> = HashMap::new();
        for handler in &handlers {
            index.entry(handler.data_type()).or_default().push(handler.clone());
        }

        Self {
            handlers,
            index,
            options,
        }
    }

    /// Dispatch a value and a scope to all handlers registered for the
    /// value's type.
    ///
    /// Fan-out semantics match [`Executor::execute`]: all handlers start
    /// before any is awaited, and the call completes only when every
    /// handler has completed.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::HandlerNotFound`] -- no handler is registered for
    ///   the type and the executor requires handlers.
    /// * [`DispatchError::HandlerFailed`] -- a handler's callable failed;
    ///   the attempted value and the scope are attached.
    pub async fn execute<M>(&self, data: M, scope: Arc<S>) -> Result<(), DispatchError>
    where
        M: Any + Send + Sync,
    {
        self.execute_arc(Arc::new(data), scope).await
    }

    /// Dispatch an already type-erased value and a scope.
    pub async fn execute_arc(
        &self,
        data: Arc<dyn Any + Send + Sync>,
        scope: Arc<S>,
    ) -> Result<(), DispatchError> {
        let Some(handlers) = self.index.get(&(*data).type_id()) else {
            if self.options.require_handlers() {
                return Err(DispatchError::HandlerNotFound);
            }
            tracing::trace!("no handler registered, dispatch is a no-op");
            return Ok(());
        };

        let invocations: Vec<_> = handlers
            .iter()
            .map(|h| h.invoke(Arc::clone(&data), Arc::clone(&scope)))
            .collect();
        let results = join_all(invocations).await;

        let failure = handlers
            .iter()
            .zip(results)
            .find_map(|(handler, result)| result.err().map(|e| (handler.data_type_name(), e)));
        match failure {
            Some((attempted_type, source)) => Err(DispatchError::HandlerFailed {
                attempted: data,
                attempted_type,
                scope: Some(scope),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Blocking form of [`execute`](ScopedExecutor::execute).
    ///
    /// Semantically identical to the async form. Must not be called from
    /// inside an async context.
    pub fn execute_blocking<M>(&self, data: M, scope: Arc<S>) -> Result<(), DispatchError>
    where
        M: Any + Send + Sync,
    {
        blocking_runtime().block_on(self.execute(data, scope))
    }

    /// Return a new executor with one more handler; the receiver is
    /// unchanged.
    pub fn add_handler(&self, handler: ScopedHandler<S>) -> Self {
        let mut handlers = self.handlers.clone();
        handlers.push(handler);
        Self::new(handlers, self.options)
    }

    /// Return a new executor with all handlers for exactly `M` removed.
    pub fn remove_handlers<M>(&self) -> Self
    where
        M: Any + Send + Sync,
    {
        let data_type = TypeId::of::<M>();
        let handlers: Vec<ScopedHandler<S>> = self
            .handlers
            .iter()
            .filter(|h| h.data_type() != data_type)
            .cloned()
            .collect();
        Self::new(handlers, self.options)
    }

    /// Return a new executor that fails dispatch to unregistered types.
    pub fn require_handlers(&self) -> Self {
        Self::new(
            self.handlers.clone(),
            self.options.with_require_handlers(true),
        )
    }

    /// The distinct data types currently handled.
    pub fn data_types(&self) -> Vec<TypeId> {
        self.index.keys().copied().collect()
    }

    /// Names of the distinct data types currently handled, in first
    /// registration order.
    pub fn data_type_names(&self) -> Vec<&'static str> {
        let mut seen = Vec::new();
        for handler in &self.handlers {
            if !seen.contains(&handler.data_type_name()) {
                seen.push(handler.data_type_name());
            }
        }
        seen
    }
}

impl<S> std::fmt::Debug for ScopedExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedExecutor")
            .field("handlers", &self.handlers.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Build the current-thread runtime backing the `execute_blocking` forms.
///
/// Time is enabled so handlers that sleep or time out behave the same as
/// under the async forms.
fn blocking_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to create blocking dispatch runtime")
}

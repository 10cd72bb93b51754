//! Handler capability traits and the uniform adapters an executor stores.
//!
//! A handler is a callable bound to one concrete data type (and optionally a
//! scope type). [`Handler`] and [`ScopedHandler`] adapt the three supported
//! callable shapes -- an object implementing [`Handle`]/[`HandleScoped`], a
//! fire-and-forget synchronous closure, or an asynchronous closure -- into a
//! single type-erased form keyed by the data's [`TypeId`]. All three forms
//! produce functionally identical adapters; the sync/async distinction is a
//! convenience, not a behavioral difference.

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::BoxError;

/// A handler for the given message type, called by a scope-less executor.
///
/// # Type Parameters
///
/// * `M` - The concrete message type this handler accepts.
#[async_trait]
pub trait Handle<M>: Send + Sync
where
    M: Any + Send + Sync,
{
    /// Handle the message.
    ///
    /// Returning `Err` marks the whole dispatch as failed; the executor
    /// wraps the failure with the attempted message attached.
    async fn handle(&self, message: Arc<M>) -> Result<(), BoxError>;
}

/// A handler for the given message and scope types, called by a scoped
/// executor.
///
/// The scope is the shared mutable context of one dispatch (e.g. the
/// aggregate a command executes against). Handlers for one message type run
/// concurrently, so the scope must synchronize its own interior mutability.
///
/// # Type Parameters
///
/// * `M` - The concrete message type this handler accepts.
/// * `S` - The scope type passed alongside every message.
#[async_trait]
pub trait HandleScoped<M, S>: Send + Sync
where
    M: Any + Send + Sync,
    S: Send + Sync,
{
    /// Handle the message against the scope.
    async fn handle(&self, message: Arc<M>, scope: Arc<S>) -> Result<(), BoxError>;
}

/// Type-erased invocation closure stored by a scope-less handler.
type InvokeFn =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Type-erased invocation closure stored by a scoped handler.
type ScopedInvokeFn<S> = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>, Arc<S>) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

/// A scope-less handler adapter: one concrete data type, one callable.
///
/// Immutable once constructed. Cloning is cheap -- the underlying callable
/// is `Arc`-shared. Multiple handlers may be registered for the same data
/// type; the executor runs them all.
#[derive(Clone)]
pub struct Handler {
    data_type: TypeId,
    data_type_name: &'static str,
    invoke: InvokeFn,
}

impl Handler {
    /// Adapt an object implementing [`Handle`].
    pub fn from_handle<M, H>(handler: H) -> Self
    where
        M: Any + Send + Sync,
        H: Handle<M> + 'static,
    {
        let handler = Arc::new(handler);
        Self::from_async(move |message: Arc<M>| {
            let handler = Arc::clone(&handler);
            async move { handler.handle(message).await }
        })
    }

    /// Adapt a fire-and-forget synchronous closure.
    ///
    /// The closure cannot signal failure; use [`Handler::from_async`] or
    /// [`Handler::from_handle`] for fallible handling.
    pub fn from_fn<M, F>(handle: F) -> Self
    where
        M: Any + Send + Sync,
        F: Fn(Arc<M>) + Send + Sync + 'static,
    {
        Self::from_async(move |message| {
            handle(message);
            std::future::ready(Ok(()))
        })
    }

    /// Adapt an asynchronous closure.
    pub fn from_async<M, F, Fut>(handle: F) -> Self
    where
        M: Any + Send + Sync,
        F: Fn(Arc<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |data| {
            // The executor only routes values whose live type matches this
            // handler's registered type, so the downcast cannot fail.
            let message = data
                .downcast::<M>()
                .unwrap_or_else(|_| panic!("handler invoked with mismatched data type"));
            Box::pin(handle(message))
        });

        Self {
            data_type: TypeId::of::<M>(),
            data_type_name: std::any::type_name::<M>(),
            invoke,
        }
    }

    /// The [`TypeId`] of the concrete data type this handler accepts.
    pub fn data_type(&self) -> TypeId {
        self.data_type
    }

    /// Name of the concrete data type this handler accepts.
    pub fn data_type_name(&self) -> &'static str {
        self.data_type_name
    }

    /// Invoke the underlying callable with a type-erased value.
    ///
    /// # Panics
    ///
    /// Panics if the value's live type does not match
    /// [`data_type`](Handler::data_type). Executors guarantee the match
    /// before invoking.
    pub fn invoke(&self, data: Arc<dyn Any + Send + Sync>) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.invoke)(data)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("data_type_name", &self.data_type_name)
            .finish()
    }
}

/// A scoped handler adapter: one concrete data type, one scope type, one
/// callable.
///
/// The scoped counterpart of [`Handler`]; see there for construction forms.
pub struct ScopedHandler<S> {
    data_type: TypeId,
    data_type_name: &'static str,
    invoke: ScopedInvokeFn<S>,
}

// Manual `Clone` because `S` itself need not be `Clone` -- we only clone
// the `Arc`-shared callable.
impl<S> Clone for ScopedHandler<S> {
    fn clone(&self) -> Self {
        Self {
            data_type: self.data_type,
            data_type_name: self.data_type_name,
            invoke: Arc::clone(&self.invoke),
        }
    }
}

impl<S> ScopedHandler<S>
where
    S: Send + Sync + 'static,
{
    /// Adapt an object implementing [`HandleScoped`].
    pub fn from_handle<M, H>(handler: H) -> Self
    where
        M: Any + Send + Sync,
        H: HandleScoped<M, S> + 'static,
    {
        let handler = Arc::new(handler);
        Self::from_async(move |message: Arc<M>, scope: Arc<S>| {
            let handler = Arc::clone(&handler);
            async move { handler.handle(message, scope).await }
        })
    }

    /// Adapt a fire-and-forget synchronous closure.
    pub fn from_fn<M, F>(handle: F) -> Self
    where
        M: Any + Send + Sync,
        F: Fn(Arc<M>, Arc<S>) + Send + Sync + 'static,
    {
        Self::from_async(move |message, scope| {
            handle(message, scope);
            std::future::ready(Ok(()))
        })
    }

    /// Adapt an asynchronous closure.
    pub fn from_async<M, F, Fut>(handle: F) -> Self
    where
        M: Any + Send + Sync,
        F: Fn(Arc<M>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let invoke: ScopedInvokeFn<S> = Arc::new(move |data, scope| {
            // Same invariant as the scope-less adapter: the executor has
            // already matched the live type.
            let message = data
                .downcast::<M>()
                .unwrap_or_else(|_| panic!("handler invoked with mismatched data type"));
            Box::pin(handle(message, scope))
        });

        Self {
            data_type: TypeId::of::<M>(),
            data_type_name: std::any::type_name::<M>(),
            invoke,
        }
    }

    /// The [`TypeId`] of the concrete data type this handler accepts.
    pub fn data_type(&self) -> TypeId {
        self.data_type
    }

    /// Name of the concrete data type this handler accepts.
    pub fn data_type_name(&self) -> &'static str {
        self.data_type_name
    }

    /// Invoke the underlying callable with a type-erased value and a scope.
    ///
    /// # Panics
    ///
    /// Panics if the value's live type does not match
    /// [`data_type`](ScopedHandler::data_type). Executors guarantee the
    /// match before invoking.
    pub fn invoke(
        &self,
        data: Arc<dyn Any + Send + Sync>,
        scope: Arc<S>,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.invoke)(data, scope)
    }
}

impl<S> std::fmt::Debug for ScopedHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedHandler")
            .field("data_type_name", &self.data_type_name)
            .finish()
    }
}

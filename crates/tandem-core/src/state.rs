//! Typed, request-scoped state slots.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::TandemError;
use crate::scope::try_current;

/// Identity of a state slot within a request's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed slot of request-scoped state.
///
/// The factory runs lazily, at most once per request, the first time the
/// slot is read within that request. Each request owns its own instance;
/// two requests never observe the same value.
///
/// ```rust,ignore
/// static CART: Lazy<RequestState<Vec<String>>> = Lazy::new(|| define_request_state(Vec::new));
///
/// CART.set(vec!["sku-1".into()])?;
/// let cart = CART.get()?;
/// ```
pub struct RequestState<T> {
    id: SlotId,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    _marker: PhantomData<fn() -> T>,
}

/// Define a new request-scoped state slot.
pub fn define_request_state<T, F>(factory: F) -> RequestState<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    RequestState {
        id: SlotId::next(),
        factory: Arc::new(factory),
        _marker: PhantomData,
    }
}

impl<T> RequestState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Read the value for the current request, creating it if needed.
    pub fn get(&self) -> Result<T, TandemError> {
        Ok(self.get_in(&try_current()?))
    }

    /// Replace the value for the current request.
    pub fn set(&self, value: T) -> Result<(), TandemError> {
        self.set_in(&try_current()?, value);
        Ok(())
    }

    /// Apply `f` to the current request's value and store the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<T, TandemError> {
        let cx = try_current()?;
        let mut value = self.get_in(&cx);
        f(&mut value);
        self.set_in(&cx, value.clone());
        Ok(value)
    }

    /// Read the value for an explicit request.
    pub fn get_in(&self, cx: &RequestContext) -> T {
        if let Some(value) = cx.slot(self.id).and_then(downcast::<T>) {
            return value;
        }
        // Only this slot's init lock is held while the factory runs, so it
        // may read other slots of the same request.
        let init = cx.slot_init_lock(self.id);
        let _creating = init.lock();
        if let Some(value) = cx.slot(self.id).and_then(downcast::<T>) {
            return value;
        }
        let fresh: Arc<dyn Any + Send + Sync> = Arc::new((self.factory)());
        tracing::trace!(request_id = %cx.request_id(), slot = self.id.0, "request state created");
        cx.slot_or_insert(self.id, fresh)
            .downcast_ref::<T>()
            .cloned()
            .unwrap_or_else(|| (self.factory)())
    }

    /// Replace the value for an explicit request.
    pub fn set_in(&self, cx: &RequestContext, value: T) {
        cx.set_slot(self.id, Arc::new(value));
    }
}

fn downcast<T: Clone + 'static>(slot: Arc<dyn Any + Send + Sync>) -> Option<T> {
    slot.downcast_ref::<T>().cloned()
}

impl<T> Clone for RequestState<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            factory: Arc::clone(&self.factory),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RequestState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestState")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

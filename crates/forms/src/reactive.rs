//! Explicit observer graph.
//!
//! Every piece of field state lives in a [`Cell`]: `get`, `set`, `subscribe`.
//! `set` is gated by [`StructuralEq`], so writing an equal value is a no-op
//! and nobody is notified. [`Derived`] cells recompute from a closure when
//! one of their declared sources changes and only propagate when the result
//! differs. [`Emitter`] carries events that have no current value (change
//! notifications, key presses).
//!
//! Listeners run synchronously on the thread that performed the write, after
//! all locks are released, so a listener may freely write to other cells (or
//! to the same one).
//!
//! Dropping a [`Subscription`] detaches its listener.
//!
//! ```ignore
//! let price = Cell::new(json!(10));
//! let label = Derived::new(&[&price], {
//!     let price = price.clone();
//!     move || format!("{} $", price.get())
//! });
//! let _sub = label.subscribe(|l| println!("{l}"));
//! price.set(json!(12)); // prints "12 $"
//! price.set(json!(12)); // equal, nothing happens
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;

use crate::value::deep_equal;

/// Equality used to decide whether a write is a real change.
pub trait StructuralEq {
    fn structural_eq(&self, other: &Self) -> bool;
}

/// Implement [`StructuralEq`] through an existing `PartialEq`.
macro_rules! structural_eq_via_partial_eq {
    ($($type:ty),+ $(,)?) => {
        $(
            impl $crate::reactive::StructuralEq for $type {
                fn structural_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )+
    };
}
pub(crate) use structural_eq_via_partial_eq;

structural_eq_via_partial_eq!(
    (),
    bool,
    u16,
    u32,
    u64,
    usize,
    i32,
    i64,
    String,
    &'static str,
);

impl StructuralEq for f64 {
    fn structural_eq(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl StructuralEq for Value {
    fn structural_eq(&self, other: &Self) -> bool {
        deep_equal(self, other)
    }
}

impl<T: StructuralEq> StructuralEq for Option<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.structural_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: StructuralEq> StructuralEq for Vec<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.structural_eq(b))
    }
}

impl<A: StructuralEq, B: StructuralEq> StructuralEq for (A, B) {
    fn structural_eq(&self, other: &Self) -> bool {
        self.0.structural_eq(&other.0) && self.1.structural_eq(&other.1)
    }
}

/// Shared services compare by identity.
impl<T: ?Sized> StructuralEq for Arc<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// Handle of a registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Subscription that owns nothing.
    pub fn empty() -> Self {
        Self { release: None }
    }

    pub fn unsubscribe(self) {}

    /// Keep the listener registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.release.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T: 'static> Registry<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    fn add(self: &Arc<Self>, callback: Callback<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(entry, _)| *entry != id);
            }
        })
    }

    fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct CellInner<T> {
    value: RwLock<T>,
    listeners: Arc<Registry<T>>,
}

/// Observable value with equality-gated writes.
pub struct Cell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Cell<T>
where
    T: Clone + StructuralEq + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(value),
                listeners: Registry::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Store `value` and notify listeners. Returns `false` (and notifies
    /// nobody) when the value is structurally equal to the current one.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self
                .inner
                .value
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if current.structural_eq(&value) {
                return false;
            }
            *current = value.clone();
        }
        self.inner.listeners.notify(&value);
        true
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Keep `self` and `other` equal in both directions. `self` takes the
    /// current value of `other` first.
    pub fn bind(&self, other: &Cell<T>) -> Vec<Subscription> {
        self.set(other.get());
        let to_self = {
            let target = self.downgrade();
            other.subscribe(move |value| {
                if let Some(target) = target.upgrade() {
                    target.set(value.clone());
                }
            })
        };
        let to_other = {
            let target = other.downgrade();
            self.subscribe(move |value| {
                if let Some(target) = target.upgrade() {
                    target.set(value.clone());
                }
            })
        };
        vec![to_self, to_other]
    }

    /// Same underlying cell.
    pub fn same(&self, other: &Cell<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T> Default for Cell<T>
where
    T: Default + Clone + StructuralEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_read() {
            Ok(value) => f.debug_tuple("Cell").field(&*value).finish(),
            Err(_) => f.write_str("Cell(<locked>)"),
        }
    }
}

/// Bound cells compare by identity.
impl<T> StructuralEq for Cell<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

pub struct WeakCell<T> {
    inner: Weak<CellInner<T>>,
}

impl<T> Clone for WeakCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakCell<T> {
    pub fn upgrade(&self) -> Option<Cell<T>> {
        self.inner.upgrade().map(|inner| Cell { inner })
    }
}

/// Anything a [`Derived`] cell can depend on.
pub trait Source: Send + Sync {
    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription;
}

impl<T> Source for Cell<T>
where
    T: Clone + StructuralEq + Send + Sync + 'static,
{
    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe(move |_| on_change())
    }
}

/// Memoized computed value.
///
/// The closure is re-run whenever one of the sources notifies; the result is
/// written through [`Cell::set`], so listeners of the derived cell only hear
/// about results that actually differ.
pub struct Derived<T> {
    cell: Cell<T>,
    _sources: Arc<Vec<Subscription>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _sources: self._sources.clone(),
        }
    }
}

impl<T> Derived<T>
where
    T: Clone + StructuralEq + Send + Sync + 'static,
{
    pub fn new(sources: &[&dyn Source], compute: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let compute = Arc::new(compute);
        let cell = Cell::new(compute());
        let subscriptions = sources
            .iter()
            .map(|source| {
                let target = cell.downgrade();
                let compute = compute.clone();
                source.watch(Arc::new(move || {
                    if let Some(target) = target.upgrade() {
                        target.set(compute());
                    }
                }))
            })
            .collect();
        Self {
            cell,
            _sources: Arc::new(subscriptions),
        }
    }

    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.cell.subscribe(listener)
    }
}

impl<T> Source for Derived<T>
where
    T: Clone + StructuralEq + Send + Sync + 'static,
{
    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.cell.watch(on_change)
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.cell).finish()
    }
}

/// Event output without a current value.
pub struct Emitter<E> {
    listeners: Arc<Registry<E>>,
}

impl<E> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E: 'static> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Registry::new(),
        }
    }
}

impl<E: 'static> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: &E) {
        self.listeners.notify(event);
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        self.listeners.add(Arc::new(listener))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Emitter")
    }
}

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted value with read-write locking.
///
/// The manager uses it for state that it writes once per tick and that workers read,
/// such as the observer's current chunk position.
///
/// A panic while a guard is held does not make the value unusable: the lock's poison
/// flag is ignored and the last written value is returned. Holders only ever perform
/// single assignments under the write guard, so the value is never left half-updated.
///
/// # Examples
///
/// ```
/// use voxel_streaming::core::MtResource;
///
/// let radius = MtResource::new(4);
/// let shared = radius.clone();
///
/// std::thread::spawn(move || *shared.get_mut() = 6).join().unwrap();
/// assert_eq!(*radius.get(), 6);
/// ```
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a guard that allows reading the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a guard that allows modifying the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the contained value.
    pub fn set(&self, value: T) {
        *self.get_mut() = value;
    }
}

impl<T: Send + Sync + Copy> MtResource<T> {
    /// Copies the contained value out.
    pub fn load(&self) -> T {
        *self.get()
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + Default> Default for MtResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

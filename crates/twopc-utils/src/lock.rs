use parking_lot::Mutex;

/// Runs `f` inside the critical section of `lock`.
///
/// The guard never escapes, so the closure is the whole critical section.
#[inline]
pub fn with_mutex<T, R>(lock: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = lock.lock();
    f(&mut *guard)
}

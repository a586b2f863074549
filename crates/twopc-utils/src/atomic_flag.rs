use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

/// A boolean that is shared between tasks.
///
/// [`AtomicFlag::raise`] is the one-shot form: exactly one caller observes the
/// transition from `false` to `true`.
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    #[inline]
    #[must_use]
    pub const fn new(val: bool) -> Self {
        Self(AtomicBool::new(val))
    }

    #[inline]
    pub fn set(&self, val: bool) {
        self.0.store(val, SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> bool {
        self.0.load(SeqCst)
    }

    /// Sets the flag, returning `true` only for the caller that flipped it.
    #[inline]
    pub fn raise(&self) -> bool {
        !self.0.swap(true, SeqCst)
    }
}

impl Default for AtomicFlag {
    #[inline]
    fn default() -> Self {
        Self::new(false)
    }
}

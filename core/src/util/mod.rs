use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the data if a panicking effect poisoned it.
///
/// Effects run while the store lock is held; a panic inside one is a bug in
/// that effect and must not wedge every later commit.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

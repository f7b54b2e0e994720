// SPDX-License-Identifier: GPL-3.0-only

//! Lock helpers shared by the session components

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
///
/// Every structure guarded in this crate is left consistent between
/// statements, so a poisoned lock still holds usable data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

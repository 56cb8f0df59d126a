// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::sync::{Mutex, MutexGuard};

pub mod error;
pub mod logging;
pub mod status;
pub mod worker;

pub use error::{DfmsError, Result};
pub use status::{ChecksumKind, DOStatus, ExecutionMode};

/// Extension trait for `Mutex` to provide a method that acquires a lock, panicking if the lock
/// is poisoned.
///
/// This helper is used in preference to `.lock().unwrap()` everywhere a DO's or session's
/// guarded state is touched, so a poisoned lock panics at the call site instead of bubbling up
/// as an opaque `PoisonError`.
///
/// # Examples
///
/// ```
/// use dfms_common::MutexExt;
/// use std::sync::{Arc, Mutex};
///
/// let data = Arc::new(Mutex::new(5));
/// let data_clone = Arc::clone(&data);
///
/// std::thread::spawn(move || {
///     let mut num = data_clone.lock_or_panic();
///     *num += 1;
/// })
/// .join()
/// .expect("thread panicked");
///
/// assert_eq!(*data.lock_or_panic(), 6);
/// ```
pub trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[inline(always)]
    #[track_caller]
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        self.lock().unwrap()
    }
}

//! Kernel state locking mechanism
//!
//! The whole kernel state lives behind one spinlock, which plays the role of
//! CPU Lock: whoever holds it has exclusive access to every control block.
//! Task threads and timer callbacks never hold it while running application
//! code, and a thread never parks while holding it.
use spin::{Mutex as SpinMutex, MutexGuard as SpinMutexGuard};

use crate::{state::State, Kernel};

/// The spinlock guarding the kernel state.
pub(crate) type CpuLock = SpinMutex<State>;

/// RAII guard for CPU Lock. The lock is released when the guard is dropped.
pub(crate) type CpuLockGuard<'a> = SpinMutexGuard<'a, State>;

/// Acquire CPU Lock.
pub(crate) fn lock_cpu(kernel: &Kernel) -> CpuLockGuard<'_> {
    kernel.inner.state.lock()
}

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::LatchError;

struct LatchState {
    /// Signals still needed before the latch opens.
    count: i32,
    /// Count set by `new` or the latest `reset`.
    initial: i32,
    disposed: bool,
}

/// A reusable latch that blocks waiters until its count has been signaled
/// down to zero, then releases all of them at once.
///
/// The latch is shared between threads by reference (typically inside an
/// `Arc`). Dropping it disposes it first, so nothing can stay parked on the
/// condition variable.
pub struct CountdownLatch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl CountdownLatch {
    /// Creates a latch that opens after `count` signals. A count of zero
    /// yields a latch that is already set.
    pub fn new(count: i32) -> Result<CountdownLatch, LatchError> {
        if count < 0 {
            return Err(LatchError::InvalidArgument("initial count must not be negative"));
        }
        Ok(CountdownLatch::with_count(count))
    }

    fn with_count(count: i32) -> CountdownLatch {
        CountdownLatch {
            state: Mutex::new(LatchState {
                count,
                initial: count,
                disposed: false,
            }),
            cond: Condvar::new(),
        }
    }

    // Every critical section leaves the state consistent before it can
    // panic, so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the count reaches zero.
    ///
    /// Fails with [`LatchError::Disposed`] if the latch is, or becomes,
    /// disposed. Disposal wins even when the count also reached zero.
    pub fn wait(&self) -> Result<(), LatchError> {
        let state = self.lock();
        let state = self
            .cond
            .wait_while(state, |s| s.count > 0 && !s.disposed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.disposed {
            return Err(LatchError::Disposed);
        }
        Ok(())
    }

    /// Blocks for at most `timeout`. Returns `true` if the latch opened,
    /// `false` if the time ran out. A zero timeout only checks.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, LatchError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_deadline(deadline),
            // unrepresentable deadline, treat as unbounded
            None => self.wait().map(|()| true),
        }
    }

    /// Millisecond flavour of [`wait_timeout`](Self::wait_timeout).
    /// Negative values are rejected rather than read as "forever".
    pub fn wait_timeout_ms(&self, timeout_ms: i64) -> Result<bool, LatchError> {
        if timeout_ms < 0 {
            return Err(LatchError::InvalidArgument("timeout must not be negative"));
        }
        self.wait_timeout(Duration::from_millis(timeout_ms as u64))
    }

    /// Blocks until the latch opens or `deadline` passes. A deadline in the
    /// past behaves like a zero timeout.
    pub fn wait_deadline(&self, deadline: Instant) -> Result<bool, LatchError> {
        let mut state = self.lock();
        loop {
            if state.disposed {
                return Err(LatchError::Disposed);
            }
            if state.count == 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!("latch wait timed out with {} outstanding", state.count);
                return Ok(false);
            }
            let (guard, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Counts down by one. Returns `false` if the latch is already set.
    pub fn signal(&self) -> Result<bool, LatchError> {
        self.signal_n(1)
    }

    /// Counts down by `n`, all or nothing. Returns `false`, leaving the
    /// count alone, when fewer than `n` signals remain.
    pub fn signal_n(&self, n: i32) -> Result<bool, LatchError> {
        if n <= 0 {
            return Err(LatchError::InvalidArgument("signal count must be positive"));
        }
        let mut state = self.lock();
        if state.disposed {
            return Err(LatchError::Disposed);
        }
        if state.count < n {
            return Ok(false);
        }
        state.count -= n;
        if state.count == 0 {
            debug!("latch opened");
            self.cond.notify_all();
        }
        Ok(true)
    }

    pub fn add_count(&self) -> Result<(), LatchError> {
        self.add_count_n(1)
    }

    /// Raises the count by `n`. An open latch cannot be re-armed this way,
    /// use [`reset_to`](Self::reset_to) instead.
    pub fn add_count_n(&self, n: i32) -> Result<(), LatchError> {
        if n <= 0 {
            return Err(LatchError::InvalidArgument("add count must be positive"));
        }
        let mut state = self.lock();
        if state.disposed {
            return Err(LatchError::Disposed);
        }
        if state.count == 0 {
            return Err(LatchError::InvalidOperation("latch is already set"));
        }
        state.count = state
            .count
            .checked_add(n)
            .ok_or(LatchError::InvalidOperation("count would overflow"))?;
        Ok(())
    }

    pub fn try_add_count(&self) -> Result<bool, LatchError> {
        self.try_add_count_n(1)
    }

    /// Like [`add_count_n`](Self::add_count_n), but an open or disposed
    /// latch yields `false` instead of an error.
    pub fn try_add_count_n(&self, n: i32) -> Result<bool, LatchError> {
        if n <= 0 {
            return Err(LatchError::InvalidArgument("add count must be positive"));
        }
        let mut state = self.lock();
        if state.disposed || state.count == 0 {
            return Ok(false);
        }
        state.count = state
            .count
            .checked_add(n)
            .ok_or(LatchError::InvalidOperation("count would overflow"))?;
        Ok(true)
    }

    /// Re-arms the latch with its last initial count.
    pub fn reset(&self) -> Result<(), LatchError> {
        let mut state = self.lock();
        let initial = state.initial;
        self.reset_locked(&mut state, initial)
    }

    /// Re-arms the latch with `count`, which also becomes the new initial
    /// count. Resetting to zero opens the latch.
    pub fn reset_to(&self, count: i32) -> Result<(), LatchError> {
        if count < 0 {
            return Err(LatchError::InvalidArgument("reset count must not be negative"));
        }
        let mut state = self.lock();
        self.reset_locked(&mut state, count)
    }

    fn reset_locked(&self, state: &mut LatchState, count: i32) -> Result<(), LatchError> {
        if state.disposed {
            return Err(LatchError::Disposed);
        }
        state.count = count;
        state.initial = count;
        if count == 0 {
            self.cond.notify_all();
        } else {
            debug!("latch re-armed with count {}", count);
        }
        Ok(())
    }

    pub fn current_count(&self) -> i32 {
        self.lock().count
    }

    pub fn initial_count(&self) -> i32 {
        self.lock().initial
    }

    pub fn is_set(&self) -> bool {
        self.lock().count == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Retires the latch and wakes every waiter with
    /// [`LatchError::Disposed`]. Later calls are no-ops.
    pub fn dispose(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        debug!("latch disposed with {} outstanding", state.count);
        self.cond.notify_all();
    }
}

impl Default for CountdownLatch {
    fn default() -> Self {
        CountdownLatch::with_count(0)
    }
}

impl Drop for CountdownLatch {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CountdownLatch")
            .field("count", &state.count)
            .field("initial", &state.initial)
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_set() {
        let latch = CountdownLatch::default();
        assert!(latch.is_set());
        assert_eq!(latch.initial_count(), 0);
        assert_eq!(latch.wait(), Ok(()));
    }

    #[test]
    fn test_debug_snapshot() {
        let latch = CountdownLatch::new(2).unwrap();
        latch.signal().unwrap();
        assert_eq!(
            format!("{:?}", latch),
            "CountdownLatch { count: 1, initial: 2, disposed: false }"
        );
    }

    #[test]
    fn test_failed_add_leaves_state() {
        let latch = CountdownLatch::new(i32::MAX - 1).unwrap();
        assert_eq!(
            latch.add_count_n(2),
            Err(LatchError::InvalidOperation("count would overflow"))
        );
        assert!(latch.try_add_count_n(2).unwrap_err().is_invalid_operation());
        let state = latch.lock();
        assert_eq!(state.count, i32::MAX - 1);
        assert_eq!(state.initial, i32::MAX - 1);
        assert!(!state.disposed);
    }
}

//! Wait/notify channels shared by all rings of a ring set.
//!
//! Readers take a [`WaitToken`], re-check their rings, then sleep until the
//! epoch moves. Every publish bumps the epoch and wakes all sleepers. An
//! interrupt also bumps a separate generation counter, so a sleeper can tell
//! it apart from a publish.

use super::futex::{futex_wait, futex_wake_all, FutexWait};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The epoch moved: something was published.
    Notified,
    TimedOut,
    /// `interrupt` was called since the token was taken, or a signal cut the
    /// sleep short.
    Interrupted,
}

/// Counters a sleeper compares against. `interrupts` is the last generation
/// the caller has acknowledged, `epoch` is read right before re-checking for
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken {
    pub interrupts: u32,
    pub epoch: u32,
}

pub trait WaitChannel: Send + Sync + fmt::Debug {
    fn epoch(&self) -> u32;

    /// Interrupt generation.
    fn interrupts(&self) -> u32;

    /// Sleep while the epoch still equals `token.epoch`. Returns
    /// `Interrupted` as soon as the interrupt generation differs from
    /// `token.interrupts`.
    fn wait(&self, token: WaitToken, timeout: Option<Duration>) -> WaitOutcome;

    fn notify_all(&self);

    /// Wake every sleeper and make their waits return `Interrupted`.
    fn interrupt(&self);
}

/// Condition-variable channel for readers and writers in one process.
///
/// Publishers only take the mutex when a reader is asleep.
#[derive(Default)]
pub struct CondvarWait {
    epoch: AtomicU32,
    interrupts: AtomicU32,
    waiters: AtomicU32,
    lock: Mutex<()>,
    cond: Condvar,
}

impl CondvarWait {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for CondvarWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondvarWait")
            .field("epoch", &self.epoch())
            .field("interrupts", &self.interrupts())
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .finish()
    }
}

impl WaitChannel for CondvarWait {
    fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn interrupts(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn wait(&self, token: WaitToken, timeout: Option<Duration>) -> WaitOutcome {
        if self.interrupts() != token.interrupts {
            return WaitOutcome::Interrupted;
        }
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.lock.lock();
        let mut outcome = WaitOutcome::Notified;
        if self.epoch.load(Ordering::SeqCst) == token.epoch {
            match timeout {
                Some(t) => {
                    if self.cond.wait_for(&mut guard, t).timed_out()
                        && self.epoch.load(Ordering::SeqCst) == token.epoch
                    {
                        outcome = WaitOutcome::TimedOut;
                    }
                }
                None => self.cond.wait(&mut guard),
            }
        }
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        if self.interrupts() != token.interrupts {
            return WaitOutcome::Interrupted;
        }
        outcome
    }

    fn notify_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.notify_all();
    }
}

/// Futex channel whose words live inside the shared region, so a reader in
/// another process can sleep on a writer's publishes.
pub struct FutexChannel {
    epoch: *const AtomicU32,
    interrupts: *const AtomicU32,
    waiters: *const AtomicU32,
}

unsafe impl Send for FutexChannel {}
unsafe impl Sync for FutexChannel {}

impl FutexChannel {
    /// # Safety
    /// All three words must stay mapped for the lifetime of the channel.
    pub unsafe fn new(
        epoch: *const AtomicU32,
        interrupts: *const AtomicU32,
        waiters: *const AtomicU32,
    ) -> Self {
        Self {
            epoch,
            interrupts,
            waiters,
        }
    }

    fn epoch_word(&self) -> &AtomicU32 {
        unsafe { &*self.epoch }
    }

    fn waiters_word(&self) -> &AtomicU32 {
        unsafe { &*self.waiters }
    }
}

impl fmt::Debug for FutexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutexChannel")
            .field("epoch", &self.epoch())
            .field("interrupts", &self.interrupts())
            .field("waiters", &self.waiters_word().load(Ordering::Relaxed))
            .finish()
    }
}

impl WaitChannel for FutexChannel {
    fn epoch(&self) -> u32 {
        self.epoch_word().load(Ordering::SeqCst)
    }

    fn interrupts(&self) -> u32 {
        unsafe { &*self.interrupts }.load(Ordering::SeqCst)
    }

    fn wait(&self, token: WaitToken, timeout: Option<Duration>) -> WaitOutcome {
        if self.interrupts() != token.interrupts {
            return WaitOutcome::Interrupted;
        }
        self.waiters_word().fetch_add(1, Ordering::SeqCst);
        let res = futex_wait(self.epoch_word(), token.epoch, timeout);
        self.waiters_word().fetch_sub(1, Ordering::SeqCst);
        if self.interrupts() != token.interrupts {
            return WaitOutcome::Interrupted;
        }
        match res {
            FutexWait::Woken => WaitOutcome::Notified,
            FutexWait::TimedOut => WaitOutcome::TimedOut,
            FutexWait::Interrupted => WaitOutcome::Interrupted,
        }
    }

    fn notify_all(&self) {
        self.epoch_word().fetch_add(1, Ordering::SeqCst);
        if self.waiters_word().load(Ordering::SeqCst) > 0 {
            futex_wake_all(self.epoch_word());
        }
    }

    fn interrupt(&self) {
        unsafe { &*self.interrupts }.fetch_add(1, Ordering::SeqCst);
        self.notify_all();
    }
}

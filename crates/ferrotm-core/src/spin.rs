//! Bounded spin-waiting
//!
//! Protocols never park a thread. A waiter spins with `spin_loop` hints and,
//! after a configurable number of iterations, starts yielding its time slice
//! so an oversubscribed machine still lets the thread it waits on run.

/// Spin-then-yield waiter
#[derive(Debug, Clone)]
pub struct SpinWait {
    spins: u32,
    spin_before_yield: u32,
}

impl SpinWait {
    /// Create a waiter that yields after `spin_before_yield` iterations
    pub fn new(spin_before_yield: u32) -> Self {
        Self {
            spins: 0,
            spin_before_yield,
        }
    }

    /// One waiting step
    #[inline]
    pub fn spin(&mut self) {
        if self.spins < self.spin_before_yield {
            self.spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }

    /// Iterations performed so far (saturates at the yield threshold)
    pub fn spins(&self) -> u32 {
        self.spins
    }

    /// Spin until `done` returns true
    #[inline]
    pub fn until(&mut self, mut done: impl FnMut() -> bool) {
        while !done() {
            self.spin();
        }
    }
}

/// Busy-wait for a fixed number of `spin_loop` hints
#[inline]
pub fn pause(iterations: u32) {
    for _ in 0..iterations {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spin_counts_saturate() {
        let mut w = SpinWait::new(3);
        for _ in 0..10 {
            w.spin();
        }
        assert_eq!(w.spins(), 3);
    }

    #[test]
    fn test_until_observes_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || flag.store(true, Ordering::Release))
        };
        SpinWait::new(16).until(|| flag.load(Ordering::Acquire));
        setter.join().unwrap();
    }
}

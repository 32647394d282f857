// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! One-shot virtual timers.
//!
//! Peripherals never call back into themselves from a timer. The host owns
//! the clock, collects handles as they fall due, and hands each one back to
//! the peripheral that armed it, which keeps every entry point on the
//! peripheral serialized.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait TimerService: Debug + Send {
    fn now_ns(&self) -> u64;
    fn schedule_after(&mut self, delay_ns: u64) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: u64,
    handle: TimerHandle,
}

/// Deterministic nanosecond clock driven explicitly by the host.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ns: u64,
    next_id: u64,
    pending: Vec<Pending>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Removes the earliest timer due at or before `limit_ns` and moves the
    /// clock to its deadline.
    pub fn pop_due(&mut self, limit_ns: u64) -> Option<TimerHandle> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.deadline <= limit_ns)
            .min_by_key(|(_, p)| (p.deadline, p.handle))
            .map(|(i, _)| i)?;
        let due = self.pending.remove(idx);
        self.now_ns = self.now_ns.max(due.deadline);
        Some(due.handle)
    }

    /// Advances by `delta_ns`, returning every handle that fell due in
    /// deadline order.
    pub fn advance(&mut self, delta_ns: u64) -> Vec<TimerHandle> {
        let target = self.now_ns.saturating_add(delta_ns);
        let mut fired = Vec::new();
        while let Some(handle) = self.pop_due(target) {
            fired.push(handle);
        }
        self.now_ns = target;
        fired
    }
}

impl TimerService for VirtualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns
    }

    fn schedule_after(&mut self, delay_ns: u64) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending.push(Pending {
            deadline: self.now_ns.saturating_add(delay_ns),
            handle,
        });
        tracing::trace!("timer {} armed for +{}ns", handle.0, delay_ns);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|p| p.handle != handle);
    }
}

/// A `VirtualClock` shared by the host and any number of peripherals.
#[derive(Debug, Clone, Default)]
pub struct SharedClock {
    inner: Arc<Mutex<VirtualClock>>,
}

impl SharedClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VirtualClock> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_count()
    }

    /// Runs the clock forward by `delta_ns`, delivering each timer as it
    /// falls due. Timers armed by `deliver` inside the window fire too.
    pub fn run_for(&self, delta_ns: u64, mut deliver: impl FnMut(TimerHandle)) {
        let target = self.lock().now_ns.saturating_add(delta_ns);
        loop {
            // Lock is released before delivery so the callee can re-arm.
            let due = self.lock().pop_due(target);
            match due {
                Some(handle) => deliver(handle),
                None => break,
            }
        }
        self.lock().now_ns = target;
    }
}

impl TimerService for SharedClock {
    fn now_ns(&self) -> u64 {
        self.lock().now_ns()
    }

    fn schedule_after(&mut self, delay_ns: u64) -> TimerHandle {
        self.lock().schedule_after(delay_ns)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.lock().cancel(handle)
    }
}

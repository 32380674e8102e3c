//! Live-emission gate
//!
//! Controls whether snapshots (and driver payloads) reach subscribers in
//! real time. A push session may force it open; the value it had before is
//! remembered once and restored when that session ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Override {
    /// Value before the first forced override, if one is being remembered
    previous: Option<bool>,
    /// Whether the gate was actually flipped by the override
    forced: bool,
}

/// Boolean gate with session-scoped override and restore.
#[derive(Debug)]
pub struct LiveEmitGate {
    enabled: AtomicBool,
    session_override: Mutex<Override>,
}

impl LiveEmitGate {
    pub fn new(initial: bool) -> Self {
        Self {
            enabled: AtomicBool::new(initial),
            session_override: Mutex::new(Override::default()),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Open the gate for a session.
    ///
    /// The prior value is remembered only if nothing is remembered yet, so
    /// re-entrant starts do not stack overrides. Returns whether this call
    /// flipped the gate.
    pub fn force_open(&self) -> bool {
        let mut ov = self.session_override.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.get();
        if ov.previous.is_none() {
            ov.previous = Some(current);
        }
        let flipped = !current;
        ov.forced = ov.forced || flipped;
        if flipped {
            self.set(true);
        }
        flipped
    }

    /// Put back the remembered value if the gate had been forced open, then
    /// forget the override. Returns the restored value, if any.
    pub fn restore(&self) -> Option<bool> {
        let mut ov = self.session_override.lock().unwrap_or_else(|e| e.into_inner());
        let restored = match (ov.previous, ov.forced) {
            (Some(prev), true) => {
                self.set(prev);
                Some(prev)
            }
            _ => None,
        };
        *ov = Override::default();
        restored
    }

    /// Whether a session override is currently in effect
    pub fn is_forced(&self) -> bool {
        self.session_override.lock().unwrap_or_else(|e| e.into_inner()).forced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_and_restore_closed_gate() {
        let gate = LiveEmitGate::new(false);
        assert!(gate.force_open());
        assert!(gate.get());
        assert!(gate.is_forced());
        assert_eq!(gate.restore(), Some(false));
        assert!(!gate.get());
        assert!(!gate.is_forced());
    }

    #[test]
    fn test_open_gate_is_not_forced() {
        let gate = LiveEmitGate::new(true);
        assert!(!gate.force_open());
        assert_eq!(gate.restore(), None);
        assert!(gate.get());
    }

    #[test]
    fn test_reentrant_force_remembers_first_value() {
        let gate = LiveEmitGate::new(false);
        gate.force_open();
        // second start while already forced must not overwrite `previous = false`
        assert!(!gate.force_open());
        assert_eq!(gate.restore(), Some(false));
        assert!(!gate.get());
    }

    #[test]
    fn test_restore_without_override_is_noop() {
        let gate = LiveEmitGate::new(true);
        gate.set(false);
        assert_eq!(gate.restore(), None);
        assert!(!gate.get());
    }
}

//! # Host Interrupt Line
//!
//! The IA61x raises its HOST_IRQ line when a keyword, command or timeout
//! event is ready. The host's edge interrupt handler only records that fact;
//! the event monitor consumes it later from thread context.
//!
//! ```text
//!   ISR (single writer)          Event monitor (single reader)
//!   ───────────────────          ─────────────────────────────
//!   IRQ_FLAG.raise()  ──────►    IrqFlag::take_pending()
//!                                 (observe, then clear)
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

/// A source of "event pending" notifications from the device
pub trait EventLine {
    /// Return true and clear the pending state if an interrupt was seen
    fn take_pending(&mut self) -> bool;

    /// Drop any notification left over from a previous session
    fn clear(&mut self) {
        let _ = self.take_pending();
    }
}

/// Interrupt-pending flag shared between an ISR and the event monitor
///
/// Only plain loads and stores are used so the flag also works on cores
/// without compare-and-swap (Cortex-M0+).
#[derive(Debug, Default)]
pub struct IrqFlag {
    pending: AtomicBool,
}

impl IrqFlag {
    /// Create a cleared flag, usable in a `static`
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Record an interrupt; call from the edge interrupt handler
    #[inline]
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Check without consuming
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl EventLine for &IrqFlag {
    fn take_pending(&mut self) -> bool {
        if self.pending.load(Ordering::Acquire) {
            self.pending.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }
}

impl<E: EventLine + ?Sized> EventLine for &mut E {
    fn take_pending(&mut self) -> bool {
        (**self).take_pending()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

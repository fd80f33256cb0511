// ============================================================================
// ember-stores - Dependency Tracking
// The core of the reactivity system: recording reads against the in-flight
// computation, and rejecting circular graphs
// ============================================================================
//
// While a computed's derive closure runs, a frame sits on the context's
// stack. Reading any store inside that window attaches the computation as
// an observer of the store and records the link in the frame. The frame is
// popped - and its links handed to the computation - on every exit path,
// including unwinding, via an RAII guard.
// ============================================================================

use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, trace};

use crate::core::context::{with_context, Frame};
use crate::core::types::{AnyComputation, AnySource, ComputationId, UpstreamLink};

// =============================================================================
// CYCLE DETECTION
// =============================================================================

/// A computation depended, directly or transitively, on its own in-progress
/// result.
///
/// Raised (as a panic carrying this message) when a recomputation is
/// re-entered while its token is still on the tracker stack. The previously
/// published value of every affected computed is left intact and the stack
/// is unwound frame by frame, so the tracker is never corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circular dependency: computation {token:?} was re-entered while still recomputing")]
pub struct CycleError {
    pub token: ComputationId,
}

/// Fail if `token` already has a frame in flight.
///
/// Detection is purely by stack membership, so indirect cycles (A reads B
/// reads A) are caught identically to direct self-reads.
///
/// # Panics
///
/// Panics with a [`CycleError`] message when the cycle is detected.
pub(crate) fn ensure_not_in_flight(token: ComputationId) {
    let cycle = with_context(|cx| cx.in_flight(token));
    if cycle {
        let err = CycleError { token };
        debug!(%err, "rejecting circular dependency");
        panic!("{err}");
    }
}

// =============================================================================
// TRACK READ
// =============================================================================

/// Record a store read against the innermost tracking frame, if any.
///
/// Attaches the frame's computation as an observer of `source` (with no
/// immediate callback - the value is being produced by the run currently in
/// flight) and collects the link for later release. Reads of the same
/// source within one frame are deduplicated; reads outside any frame are
/// side-effect-free.
pub(crate) fn track_read(source: &Rc<dyn AnySource>) {
    with_context(|cx| {
        let sid = source.source_id();
        let computation = {
            let mut frames = cx.frames.borrow_mut();
            match frames.last_mut() {
                Some(frame) if !frame.seen.contains(&sid) => {
                    frame.seen.push(sid);
                    Some(Weak::clone(&frame.computation))
                }
                _ => None,
            }
        };
        let Some(computation) = computation else {
            return;
        };

        let subscriber = cx.next_subscriber_id();
        if source.attach_computation(subscriber, computation) {
            trace!(source = ?sid, "dependency recorded");
            let mut frames = cx.frames.borrow_mut();
            if let Some(frame) = frames.last_mut() {
                frame.links.push(UpstreamLink {
                    source: Rc::clone(source),
                    subscriber,
                });
            }
        }
    });
}

// =============================================================================
// FRAME GUARD
// =============================================================================

/// RAII handle for one tracking frame.
///
/// Dropping the guard pops the frame and installs the collected links on
/// the computation - on the success path and on unwind alike, which is what
/// keeps the tracker stack exact when a nested write runs into a cycle. If
/// the computation is already gone, the links are released instead.
pub(crate) struct FrameGuard {
    token: ComputationId,
}

/// Push a fresh frame for `computation` and return its guard.
pub(crate) fn begin_frame(
    token: ComputationId,
    computation: Weak<dyn AnyComputation>,
) -> FrameGuard {
    with_context(|cx| {
        cx.frames.borrow_mut().push(Frame {
            token,
            computation,
            links: Vec::new(),
            seen: Vec::new(),
        });
    });
    trace!(?token, "tracking frame opened");
    FrameGuard { token }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        with_context(|cx| {
            let frame = cx.frames.borrow_mut().pop();
            let Some(frame) = frame else {
                debug_assert!(false, "tracking frame stack underflow");
                return;
            };
            debug_assert_eq!(frame.token, self.token, "tracking frames popped out of order");
            trace!(token = ?frame.token, links = frame.links.len(), "tracking frame closed");
            match frame.computation.upgrade() {
                Some(computation) => computation.install_links(frame.links),
                None => {
                    for link in &frame.links {
                        link.release();
                    }
                }
            }
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================

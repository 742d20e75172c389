//! Wrapping-chain resolver.
//!
//! [`down`] walks from the handle a factory returned towards the backend it
//! wraps, using only what each handle reports about itself: its declared
//! [`kind`](Handle::kind), its [`inner`](Handle::inner) handle, and whether
//! that inner handle [conforms](crate::handle::conforms).
//!
//! Resolution is synchronous and side-effect free. It may be called from any
//! task, including while other operations on the chain are in flight.


use std::sync::Arc;

use tracing::trace;

use crate::handle::{Handle, HandleRef, conforms};

/// Resolves `handle` down its wrapping chain.
///
/// Without a target kind, returns the deepest handle reachable through
/// conforming inner handles. With a target kind, returns the *first* handle
/// on the way down whose kind matches, or `None` if the chain holds none.
///
/// A handle whose [`Handle::down`] answers is trusted as-is: its answer is
/// returned without looking further.
///
/// Chains are assumed acyclic. Factories build them bottom-up from owned
/// inner handles, so a cycle cannot arise from construction; a hand-built
/// cyclic chain makes this function recurse without bound.
pub fn down(handle: &HandleRef, kind: Option<&str>) -> Option<HandleRef> {
    if let Some(resolved) = handle.down(kind) {
        trace!(?kind, "resolved by handle");
        return resolved;
    }

    if let Some(kind) = kind {
        if handle.kind() == Some(kind) {
            return Some(Arc::clone(handle));
        }
    }

    if let Some(inner) = handle.inner() {
        if conforms(inner.as_ref()) {
            return down(&inner, kind);
        }
        trace!(?kind, "inner handle does not conform, stopping");
    }

    match kind {
        Some(_) => None,
        None => Some(Arc::clone(handle)),
    }
}

/// Declared kind of the deepest handle reachable from `handle`.
pub fn kind_of(handle: &HandleRef) -> Option<String> {
    down(handle, None).and_then(|h| h.kind().map(str::to_owned))
}

/// Number of conforming handles in the chain starting at `handle`.
pub fn depth(handle: &dyn Handle) -> usize {
    let mut depth = 1;
    let mut current = handle.inner();
    while let Some(next) = current {
        if !conforms(next.as_ref()) {
            break;
        }
        depth += 1;
        current = next.inner();
    }
    depth
}

//! Lifecycle events an external caller can observe, `SPEC_FULL.md` §1.3.
//!
//! `spec.md` §1 places logging/diagnostics outside the core, presented only
//! by the interface it exposes to such a collaborator; `spec.md` §4.2 then
//! names that interface directly: each scope carries "optional patch
//! buffers + listener". This module is that listener's event vocabulary.
//! The core itself never formats a log line or depends on a logging crate —
//! a caller who wants `log`/`tracing` output wires one of those into the
//! closure passed to [`crate::run_with_listener`].

use crate::patch::Patch;

/// One observable moment in a scope's lifecycle or a run's patch emission.
#[derive(Debug, Clone)]
pub enum DraftEvent {
    /// A scope was pushed (`spec.md` §4.2 `Enter`).
    ScopeEntered,
    /// A scope was popped without revocation (`Leave`).
    ScopeLeft,
    /// A scope was popped and every draft it issued was invalidated
    /// (`Revoke`), whether from normal finalization or an aborted recipe.
    ScopeRevoked,
    /// The scope's root value finished finalizing.
    Finalized,
    /// One forward/inverse patch pair was recorded during finalization.
    PatchEmitted { forward: Patch, inverse: Patch },
}

/// A caller-supplied sink for [`DraftEvent`]s. `FnMut` rather than `Fn` so a
/// listener can accumulate state (a counter, a log buffer) across a run.
pub type Listener = Box<dyn FnMut(DraftEvent)>;

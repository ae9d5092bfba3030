//! Draft-state record, `spec.md` §3.
//!
//! Every live draft owns one `DraftState`, stored behind a
//! [`crate::scope::DraftHandle`] (a `generational-box` handle, following the
//! teacher's `GenerationalBox<Composer<N>>` convention but scoped per-draft
//! instead of per-composer). Reading or writing a `DraftState` through a
//! revoked handle surfaces as `generational_box`'s borrow error; call sites
//! map that to [`crate::error::DraftError::ProxyRevoked`] with
//! `.try_read()`/`.try_write()` + `.map_err(...)`, the same posture the
//! teacher's `StateCell` accessors take toward a dead generation.

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::scope::{DraftHandle, Scope};
use crate::value::{Key, Kind, TypeTag, Value, ValueKey};

/// One entry of a draft's lazily-allocated copy.
///
/// `Value` has no "this is a draft" variant — a draft is not a finalized
/// value — so a container's *copy* needs an element type strictly wider
/// than `Value`. `Slot` is that type: a child read through and found
/// draftable is replaced by a handle to its own live draft and every
/// subsequent read of that key returns the same handle, per `spec.md` §3's
/// "child draft exists for key k ... once materialized, subsequent reads
/// for k return the child draft".
#[derive(Clone)]
pub(crate) enum Slot {
    Raw(Value),
    Draft(DraftHandle),
}

impl Slot {
    pub(crate) fn is_same_base(&self, v: &Value) -> bool {
        match self {
            Slot::Raw(raw) => crate::value::same_value(raw, v),
            Slot::Draft(_) => false,
        }
    }
}

/// The mutable, lazily-allocated shallow copy behind a draft. One variant
/// per `spec.md` §3 container kind; `UniqueSet` additionally carries the
/// `drafts: original → child draft` table `spec.md` §4.4 requires.
pub(crate) enum DraftBody {
    Record { tag: Option<TypeTag>, entries: IndexMap<Key, Slot> },
    Sequence { items: Vec<Slot> },
    Map { entries: IndexMap<ValueKey, (Value, Slot)> },
    Set { entries: indexmap::IndexSet<ValueKey>, drafts: FxHashMap<ValueKey, DraftHandle> },
}

/// `spec.md` §3 "Draft-state record. One per live draft."
pub(crate) struct DraftState {
    pub kind: Kind,
    /// Pointer to the original value; the engine never mutates this.
    pub base: Value,
    /// Lazily allocated mutable shallow copy; absent until first write (or
    /// until a UniqueSet's iteration forces materialization).
    pub copy: Option<DraftBody>,
    /// Sticky once true (`spec.md` §3 invariant `modified ⇒ copy allocated`).
    pub modified: bool,
    /// Set exactly once, during finalization.
    pub finalized: bool,
    /// True for externally-managed drafts created via
    /// `create_manual_draft`, whose lifetime is not bounded by one recipe.
    pub is_manual: bool,
    /// Record/KeyedMap only: per-key `true` (written) / `false` (deleted).
    /// Keys not present here are untouched relative to `base`.
    pub assigned: FxHashMap<Key, bool>,
    /// Sequence only: indices written through `set`, used by the patch
    /// generator's `assigned[i] ∧ base[i] ≠ copy[i]` replace check
    /// (`spec.md` §4.7).
    pub assigned_indices: rustc_hash::FxHashSet<usize>,
    /// Back pointer to the draft this one was materialized through, absent
    /// for the root.
    pub parent: Option<DraftHandle>,
    pub scope: Rc<Scope>,
    pub config: EngineConfig,
}

impl DraftState {
    pub(crate) fn new(
        kind: Kind,
        base: Value,
        parent: Option<DraftHandle>,
        scope: Rc<Scope>,
        config: EngineConfig,
        is_manual: bool,
    ) -> Self {
        DraftState {
            kind,
            base,
            copy: None,
            modified: false,
            finalized: false,
            is_manual,
            assigned: FxHashMap::default(),
            assigned_indices: rustc_hash::FxHashSet::default(),
            parent,
            scope,
            config,
        }
    }

    /// Whether this draft has ever been read through for a given kind; the
    /// copy is the source of truth once allocated.
    pub(crate) fn has_copy(&self) -> bool { self.copy.is_some() }
}

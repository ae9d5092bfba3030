//! The `Draft` view and the shared child-materialization helper used by the
//! record/sequence/map interceptors (`spec.md` §4.3/§4.4).
//!
//! Rust has no proxies, so per `SPEC_FULL.md` §0 / `spec.md` §9 Design
//! Notes ("re-architect the record/sequence interceptor as a view that
//! exposes get/set/keys/delete/has through method calls"), a draft is a
//! small handle type (`RecordDraft`, `SequenceDraft`, `MapDraft`,
//! `SetDraft`) and `Draft` is the enum a recipe actually holds, letting it
//! navigate into whichever kind a child turns out to be without knowing it
//! upfront.

use std::rc::Rc;

use crate::draft_map::MapDraft;
use crate::draft_record::RecordDraft;
use crate::draft_sequence::SequenceDraft;
use crate::draft_set::SetDraft;
use crate::error::{DraftError, DraftResult};
use crate::patch::PathSegment;
use crate::scope::{DraftHandle, Scope};
use crate::state::DraftState;
use crate::value::{classify, is_draftable, Key, Kind, Value};

/// The result of reading through a draft: either a final leaf value, or a
/// further-navigable child draft.
#[derive(Clone)]
pub enum Read {
    Value(Value),
    Draft(Draft),
}

impl Read {
    pub fn into_value(self) -> Value {
        match self {
            Read::Value(v) => v,
            Read::Draft(_) => Value::Opaque(Rc::new(UnresolvedDraft)), // never finalized through this path; see note below
        }
    }
}

/// Placeholder opaque marker a caller sees only if it calls `into_value` on
/// a still-live child draft instead of navigating into it; finalization
/// never goes through `Read`, so this never reaches a returned `Value`.
#[derive(Debug)]
struct UnresolvedDraft;
impl crate::value::OpaqueValue for UnresolvedDraft {
    fn as_any(&self) -> &dyn std::any::Any { self }
}

/// A live draft of unknown-until-inspected kind.
#[derive(Clone, Copy)]
pub enum Draft {
    Record(RecordDraft),
    Sequence(SequenceDraft),
    Map(MapDraft),
    Set(SetDraft),
}

impl Draft {
    pub(crate) fn from_handle(handle: DraftHandle, kind: Kind) -> Self {
        match kind {
            Kind::Record => Draft::Record(RecordDraft(handle)),
            Kind::Sequence => Draft::Sequence(SequenceDraft(handle)),
            Kind::Map => Draft::Map(MapDraft(handle)),
            Kind::Set => Draft::Set(SetDraft(handle)),
            Kind::Opaque => unreachable!("opaque values are never drafted"),
        }
    }

    pub(crate) fn handle(&self) -> DraftHandle {
        match self {
            Draft::Record(r) => r.0,
            Draft::Sequence(s) => s.0,
            Draft::Map(m) => m.0,
            Draft::Set(s) => s.0,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Draft::Record(_) => Kind::Record,
            Draft::Sequence(_) => Kind::Sequence,
            Draft::Map(_) => Kind::Map,
            Draft::Set(_) => Kind::Set,
        }
    }

    pub fn as_record(&self) -> Option<&RecordDraft> {
        if let Draft::Record(r) = self { Some(r) } else { None }
    }
    pub fn as_sequence(&self) -> Option<&SequenceDraft> {
        if let Draft::Sequence(s) = self { Some(s) } else { None }
    }
    pub fn as_map(&self) -> Option<&MapDraft> {
        if let Draft::Map(m) = self { Some(m) } else { None }
    }
    pub fn as_set(&self) -> Option<&SetDraft> {
        if let Draft::Set(s) = self { Some(s) } else { None }
    }

    /// Walk a patch path, materializing child drafts as needed
    /// (`spec.md` §4.8 step 1).
    pub(crate) fn walk(&self, path: &[PathSegment]) -> DraftResult<Draft> {
        let mut current = *self;
        for seg in path {
            current = current.child(seg)?;
        }
        Ok(current)
    }

    fn child(&self, seg: &PathSegment) -> DraftResult<Draft> {
        let read = match self {
            Draft::Record(r) => r.get(seg_to_key(seg)?)?,
            Draft::Sequence(s) => s.get(seg_to_index(seg)?)?,
            Draft::Map(m) => m.get(&seg_to_map_key(seg))?,
            Draft::Set(_) => return Err(DraftError::UnsupportedOperation("cannot path into a set element")),
        };
        match read {
            Read::Draft(d) => Ok(d),
            Read::Value(_) => Err(DraftError::PathUnresolved("path segment resolved to a non-object")),
        }
    }

    pub(crate) fn assign(&self, seg: &PathSegment, v: Value) -> DraftResult<()> {
        match self {
            Draft::Record(r) => r.set(seg_to_key(seg)?, v),
            Draft::Sequence(s) => s.set(seg_to_index(seg)?, v),
            _ => Err(DraftError::UnsupportedOperation("assign on non-record/sequence parent")),
        }
    }

    pub(crate) fn delete(&self, seg: &PathSegment) -> DraftResult<()> {
        match self {
            Draft::Record(r) => r.delete(&seg_to_key(seg)?),
            Draft::Sequence(s) => s.delete(seg_to_index(seg)?),
            _ => Err(DraftError::UnsupportedOperation("remove on non-record/sequence parent")),
        }
    }

    pub(crate) fn seq_insert(&self, seg: &PathSegment, v: Value) -> DraftResult<()> {
        match self {
            Draft::Sequence(s) => {
                if matches!(seg, PathSegment::Key(Key::Str(k)) if k.as_ref() == "-") {
                    s.push(v)
                } else {
                    s.insert(seg_to_index(seg)?, v)
                }
            }
            _ => Err(DraftError::UnsupportedOperation("add on non-sequence parent")),
        }
    }

    pub(crate) fn seq_remove(&self, seg: &PathSegment) -> DraftResult<()> {
        match self {
            Draft::Sequence(s) => s.splice_remove(seg_to_index(seg)?),
            _ => Err(DraftError::UnsupportedOperation("remove on non-sequence parent")),
        }
    }

    pub(crate) fn map_set(&self, seg: &PathSegment, v: Value) -> DraftResult<()> {
        match self {
            Draft::Map(m) => m.set(seg_to_map_key(seg), v),
            _ => Err(DraftError::UnsupportedOperation("set on non-map parent")),
        }
    }

    pub(crate) fn map_delete(&self, seg: &PathSegment) -> DraftResult<()> {
        match self {
            Draft::Map(m) => m.delete(&seg_to_map_key(seg)).map(|_| ()),
            _ => Err(DraftError::UnsupportedOperation("delete on non-map parent")),
        }
    }

    pub(crate) fn set_add(&self, v: Value) -> DraftResult<()> {
        match self {
            Draft::Set(s) => s.add(v),
            _ => Err(DraftError::UnsupportedOperation("add on non-set parent")),
        }
    }

    pub(crate) fn set_delete(&self, v: &Value) -> DraftResult<()> {
        match self {
            Draft::Set(s) => s.delete(v).map(|_| ()),
            _ => Err(DraftError::UnsupportedOperation("delete on non-set parent")),
        }
    }
}

fn seg_to_key(seg: &PathSegment) -> DraftResult<Key> {
    match seg {
        PathSegment::Key(k) => Ok(k.clone()),
        PathSegment::Index(i) => Ok(Key::from(i.to_string())),
    }
}

fn seg_to_index(seg: &PathSegment) -> DraftResult<usize> {
    match seg {
        PathSegment::Index(i) => Ok(*i),
        PathSegment::Key(Key::Str(s)) => {
            s.parse().map_err(|_| DraftError::BadArgument("sequence path segment is not an index"))
        }
        _ => Err(DraftError::BadArgument("sequence path segment is not an index")),
    }
}

fn seg_to_map_key(seg: &PathSegment) -> Value {
    match seg {
        PathSegment::Key(k) => Value::from(k.to_string()),
        PathSegment::Index(i) => Value::Int(*i as i64),
    }
}

/// Shared "lazily allocate a child draft on first read" logic
/// (`spec.md` §4.3 `get`): if `v` is draftable and not already finalized,
/// allocate a fresh `DraftState` in the current draft's scope and return a
/// navigable child; otherwise the value is a plain leaf.
pub(crate) fn read_through(v: Value, scope: &Rc<Scope>, parent: DraftHandle, config: crate::config::EngineConfig) -> Read {
    if !is_draftable(&v) || crate::value::is_frozen(&v) {
        return Read::Value(v);
    }
    let kind = classify(&v);
    let state = DraftState::new(kind, v, Some(parent), scope.clone(), config, false);
    let handle = scope.insert_draft(state);
    Read::Draft(Draft::from_handle(handle, kind))
}

/// Propagate `modified = true` up through every ancestor
/// (`spec.md` §3 invariant: "If a draft is modified, every ancestor is
/// modified").
pub(crate) fn propagate_modified(handle: DraftHandle) -> DraftResult<()> {
    let mut current = Some(handle);
    while let Some(h) = current {
        let mut state = h.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if state.modified {
            break;
        }
        state.modified = true;
        current = state.parent;
    }
    Ok(())
}

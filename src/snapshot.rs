//! `Snapshot(draft) -> plainValue`, `spec.md` §6 item 5, promoted to a full
//! module per `SPEC_FULL.md` §2.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::draft::{Draft, Read};
use crate::draft_map::MapDraft;
use crate::draft_record::RecordDraft;
use crate::draft_sequence::SequenceDraft;
use crate::draft_set::SetDraft;
use crate::error::{DraftError, DraftResult};
use crate::scope::DraftHandle;
use crate::value::{MapData, RecordData, SequenceData, SetData, Value, ValueKey};

/// Returns a fully-substituted, draft-free, non-frozen view of a live draft
/// without finalizing it: unmodified sub-drafts resolve to `base` directly
/// (via the ordinary `get`/`values` path), modified ones get an independent
/// shallow copy whose entries are themselves recursively snapshotted.
///
/// Temporarily flips the draft's `finalized` flag for the duration of the
/// traversal so the side-effectful reads this performs do not themselves
/// allocate new child drafts — the same suppression `get`/`values` already
/// check for during real finalization — and restores it afterwards so the
/// draft remains exactly as usable as before the snapshot was taken.
pub fn snapshot(draft: &Draft) -> DraftResult<Value> {
    match draft {
        Draft::Record(r) => snapshot_record(r),
        Draft::Sequence(s) => snapshot_sequence(s),
        Draft::Map(m) => snapshot_map(m),
        Draft::Set(s) => snapshot_set(s),
    }
}

fn with_finalized_suppressed<T>(handle: DraftHandle, f: impl FnOnce() -> DraftResult<T>) -> DraftResult<T> {
    let was = {
        let mut state = handle.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        std::mem::replace(&mut state.finalized, true)
    };
    let result = f();
    if let Ok(mut state) = handle.try_write() {
        state.finalized = was;
    }
    result
}

fn resolve(read: Read) -> DraftResult<Value> {
    match read {
        Read::Value(v) => Ok(v),
        Read::Draft(d) => snapshot(&d),
    }
}

fn snapshot_record(r: &RecordDraft) -> DraftResult<Value> {
    with_finalized_suppressed(r.0, || {
        let tag = match r.original()? {
            Value::Record(rec) => rec.tag.clone(),
            _ => None,
        };
        let mut entries = IndexMap::new();
        for key in r.own_keys()? {
            let v = resolve(r.get(key.clone())?)?;
            entries.insert(key, v);
        }
        Ok(Value::Record(Rc::new(RecordData::new(tag, entries))))
    })
}

fn snapshot_sequence(s: &SequenceDraft) -> DraftResult<Value> {
    with_finalized_suppressed(s.0, || {
        let len = s.len()?;
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            items.push(resolve(s.get(i)?)?);
        }
        Ok(Value::Sequence(Rc::new(SequenceData::new(items))))
    })
}

fn snapshot_map(m: &MapDraft) -> DraftResult<Value> {
    with_finalized_suppressed(m.0, || {
        let mut entries = IndexMap::new();
        for key in m.keys()? {
            let v = resolve(m.get(&key)?)?;
            entries.insert(ValueKey(key.clone()), (key, v));
        }
        Ok(Value::Map(Rc::new(MapData::new(entries))))
    })
}

fn snapshot_set(s: &SetDraft) -> DraftResult<Value> {
    with_finalized_suppressed(s.0, || {
        let mut entries = IndexSet::new();
        for read in s.values()? {
            entries.insert(ValueKey(resolve(read)?));
        }
        Ok(Value::Set(Rc::new(SetData::new(entries))))
    })
}

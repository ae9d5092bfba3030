//! Sequence interception, `spec.md` §4.3, including the sequence-specific
//! policy (integer indices, `length` truncation, append).

use crate::draft::{Draft, Read};
use crate::error::{DraftError, DraftResult};
use crate::scope::DraftHandle;
use crate::state::{DraftBody, DraftState, Slot};
use crate::value::{same_value, Value};

#[derive(Clone, Copy)]
pub struct SequenceDraft(pub(crate) DraftHandle);

impl SequenceDraft {
    fn ensure_copy(state: &mut DraftState) {
        if state.copy.is_none() {
            let items = match &state.base {
                Value::Sequence(s) => s.items.iter().map(|v| Slot::Raw(v.clone())).collect(),
                _ => unreachable!("SequenceDraft base is always a Sequence"),
            };
            state.copy = Some(DraftBody::Sequence { items });
        }
    }

    fn resolve_slot(slot: Slot) -> DraftResult<Read> {
        match slot {
            Slot::Raw(v) => Ok(Read::Value(v)),
            Slot::Draft(h) => {
                let kind = h.try_read().map_err(|_| DraftError::ProxyRevoked)?.kind;
                Ok(Read::Draft(Draft::from_handle(h, kind)))
            }
        }
    }

    pub fn len(&self) -> DraftResult<usize> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        Ok(match &state.copy {
            Some(DraftBody::Sequence { items }) => items.len(),
            _ => match &state.base {
                Value::Sequence(s) => s.items.len(),
                _ => 0,
            },
        })
    }

    /// `get(index)` — `spec.md` §4.3, sequence-adapted.
    pub fn get(&self, idx: usize) -> DraftResult<Read> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;

        if let Some(DraftBody::Sequence { items }) = &state.copy {
            return match items.get(idx).cloned() {
                Some(slot) => Self::resolve_slot(slot),
                None => Ok(Read::Value(Value::Nothing)),
            };
        }

        let base_items = match &state.base {
            Value::Sequence(s) => s.items.clone(),
            _ => unreachable!("SequenceDraft base is always a Sequence"),
        };
        let Some(v) = base_items.get(idx).cloned() else {
            return Ok(Read::Value(Value::Nothing));
        };
        if state.finalized {
            return Ok(Read::Value(v));
        }

        let scope = state.scope.clone();
        let config = state.config;
        let read = crate::draft::read_through(v, &scope, self.0, config);
        if let Read::Draft(d) = &read {
            let mut items: Vec<Slot> = base_items.into_iter().map(Slot::Raw).collect();
            items[idx] = Slot::Draft(d.handle());
            state.copy = Some(DraftBody::Sequence { items });
        }
        Ok(read)
    }

    /// `set(index, v)`, accepting only parseable integer indices (the
    /// `length` key is handled separately by [`Self::set_length`]).
    pub fn set(&self, idx: usize, v: Value) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }

        let current = match &state.copy {
            Some(DraftBody::Sequence { items }) => items.get(idx).and_then(|s| match s {
                Slot::Raw(r) => Some(r.clone()),
                Slot::Draft(_) => None,
            }),
            None => match &state.base {
                Value::Sequence(s) => s.items.get(idx).cloned(),
                _ => None,
            },
            _ => None,
        };
        if let Some(curr) = &current {
            if same_value(curr, &v) {
                return Ok(());
            }
        }

        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Sequence { items }) = &mut state.copy {
            if idx >= items.len() {
                items.resize(idx + 1, Slot::Raw(Value::Nothing));
            }
            items[idx] = Slot::Raw(v);
        }
        state.assigned_indices.insert(idx);
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// Append, used by `push`-style recipes and by the patch applier's
    /// `add` with path segment `"-"`.
    pub fn push(&self, v: Value) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Sequence { items }) = &mut state.copy {
            items.push(Slot::Raw(v));
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// Insert at an arbitrary index, used by the patch applier's `add` with
    /// an integer path segment.
    pub fn insert(&self, idx: usize, v: Value) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Sequence { items }) = &mut state.copy {
            let at = idx.min(items.len());
            items.insert(at, Slot::Raw(v));
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// `delete(index)`: "internally equivalent to setting that index to
    /// undefined" — `spec.md` §4.3 sequence-specific policy. Does not
    /// shrink the sequence; use [`Self::splice_remove`] for that.
    pub fn delete(&self, idx: usize) -> DraftResult<()> { self.set(idx, Value::Nothing) }

    fn current_len(state: &DraftState) -> usize {
        match &state.copy {
            Some(DraftBody::Sequence { items }) => items.len(),
            _ => match &state.base {
                Value::Sequence(s) => s.items.len(),
                _ => 0,
            },
        }
    }

    /// Actual removal (patch applier `remove`, `spec.md` §4.8 step 2). A
    /// no-op (`idx` already out of range) allocates no copy and leaves
    /// `modified` untouched, the same idempotence `set` already gives every
    /// other write.
    pub fn splice_remove(&self, idx: usize) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        if idx >= Self::current_len(&state) {
            return Ok(());
        }
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Sequence { items }) = &mut state.copy {
            items.remove(idx);
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// Assigning `length`, `spec.md` §4.3 "set accepts only parseable
    /// integer indices plus the key `length`"; §8 scenario 3 (array shrink).
    /// `new_len == current length` is a true no-op — the `length` setter
    /// goes through the same idempotence gate as any other property per
    /// `spec.md` §4.3, so this allocates no copy and never marks the draft
    /// modified in that case.
    pub fn set_length(&self, new_len: usize) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        if new_len == Self::current_len(&state) {
            return Ok(());
        }
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Sequence { items }) = &mut state.copy {
            if new_len < items.len() {
                items.truncate(new_len);
            } else {
                items.resize(new_len, Slot::Raw(Value::Nothing));
            }
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    pub fn original(&self) -> DraftResult<Value> {
        Ok(self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?.base.clone())
    }
}

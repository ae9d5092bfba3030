//! Record interception, `spec.md` §4.3.

use indexmap::IndexMap;

use crate::draft::{Draft, Read};
use crate::error::{DraftError, DraftResult};
use crate::scope::DraftHandle;
use crate::state::{DraftBody, Slot};
use crate::value::{same_value, Key, Value};

/// A view over a record draft: the Rust rendition of the transparent
/// record/sequence interceptor `spec.md` §9 Design Notes calls for in a
/// language without proxies. Cheap to clone — it is just a handle.
#[derive(Clone, Copy)]
pub struct RecordDraft(pub(crate) DraftHandle);

impl RecordDraft {
    fn ensure_copy(state: &mut crate::state::DraftState) {
        if state.copy.is_none() {
            let (tag, entries) = match &state.base {
                Value::Record(r) => (
                    r.tag.clone(),
                    r.entries.iter().map(|(k, v)| (k.clone(), Slot::Raw(v.clone()))).collect::<IndexMap<_, _>>(),
                ),
                _ => unreachable!("RecordDraft base is always a Record"),
            };
            state.copy = Some(DraftBody::Record { tag, entries });
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

    /// `get(key)` — `spec.md` §4.3.
    pub fn get(&self, key: impl Into<Key>) -> DraftResult<Read> {
        let key = key.into();
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;

        if let Some(DraftBody::Record { entries, .. }) = &state.copy {
            return match entries.get(&key).cloned() {
                Some(slot) => Self::resolve_slot(slot),
                None => Ok(Read::Value(Value::Nothing)),
            };
        }

        let base_entries = match &state.base {
            Value::Record(r) => r.entries.clone(),
            _ => unreachable!("RecordDraft base is always a Record"),
        };
        let Some(v) = base_entries.get(&key).cloned() else {
            return Ok(Read::Value(Value::Nothing));
        };
        if state.finalized {
            return Ok(Read::Value(v));
        }

        let scope = state.scope.clone();
        let config = state.config;
        let read = crate::draft::read_through(v, &scope, self.0, config);
        if let Read::Draft(d) = &read {
            let entries: IndexMap<Key, Slot> =
                base_entries.into_iter().map(|(k, v)| (k, Slot::Raw(v))).collect();
            let tag = match &state.base {
                Value::Record(r) => r.tag.clone(),
                _ => None,
            };
            let mut entries = entries;
            entries.insert(key, Slot::Draft(d.handle()));
            state.copy = Some(DraftBody::Record { tag, entries });
        }
        Ok(read)
    }

    pub fn has(&self, key: &Key) -> DraftResult<bool> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        if let Some(DraftBody::Record { entries, .. }) = &state.copy {
            return Ok(entries.contains_key(key));
        }
        Ok(matches!(&state.base, Value::Record(r) if r.entries.contains_key(key)))
    }

    pub fn own_keys(&self) -> DraftResult<Vec<Key>> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        if let Some(DraftBody::Record { entries, .. }) = &state.copy {
            return Ok(entries.keys().cloned().collect());
        }
        match &state.base {
            Value::Record(r) => Ok(r.entries.keys().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// `set(key, v)` — `spec.md` §4.3, including the NaN-tolerant
    /// "no-change" idempotence guard.
    pub fn set(&self, key: impl Into<Key>, v: Value) -> DraftResult<()> {
        let key = key.into();
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }

        let current = match &state.copy {
            Some(DraftBody::Record { entries, .. }) => match entries.get(&key) {
                Some(Slot::Raw(raw)) => Some(raw.clone()),
                Some(Slot::Draft(_)) => None,
                None => None,
            },
            None => match &state.base {
                Value::Record(r) => r.entries.get(&key).cloned(),
                _ => None,
            },
        };
        if let Some(curr) = &current {
            if same_value(curr, &v) {
                return Ok(());
            }
        }

        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Record { entries, .. }) = &mut state.copy {
            entries.insert(key.clone(), Slot::Raw(v));
        }
        state.assigned.insert(key, true);
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// `delete(key)` — `spec.md` §4.3.
    pub fn delete(&self, key: &Key) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let existed_in_base = matches!(&state.base, Value::Record(r) if r.entries.contains_key(key));
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Record { entries, .. }) = &mut state.copy {
            entries.shift_remove(key);
        }
        if existed_in_base {
            state.assigned.insert(key.clone(), false);
            drop(state);
            crate::draft::propagate_modified(self.0)
        } else {
            state.assigned.remove(key);
            Ok(())
        }
    }

    pub fn original(&self) -> DraftResult<Value> {
        Ok(self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?.base.clone())
    }
}

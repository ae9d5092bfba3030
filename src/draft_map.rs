//! KeyedMap interception, `spec.md` §4.4.
//!
//! No subclassing in Rust — `MapDraft` is a sibling concrete type
//! implementing the same method surface the teacher's `spec.md` §9 Design
//! Notes call for ("expose sibling types that implement the map/set
//! interface explicitly").

use indexmap::IndexMap;

use crate::draft::{Draft, Read};
use crate::error::{DraftError, DraftResult};
use crate::scope::DraftHandle;
use crate::state::{DraftBody, DraftState, Slot};
use crate::value::{same_value, Value, ValueKey};

#[derive(Clone, Copy)]
pub struct MapDraft(pub(crate) DraftHandle);

impl MapDraft {
    fn ensure_copy(state: &mut DraftState) {
        if state.copy.is_none() {
            let entries = match &state.base {
                Value::Map(m) => m
                    .entries
                    .iter()
                    .map(|(k, (kv, v))| (k.clone(), (kv.clone(), Slot::Raw(v.clone()))))
                    .collect::<IndexMap<_, _>>(),
                _ => unreachable!("MapDraft base is always a Map"),
            };
            state.copy = Some(DraftBody::Map { entries });
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

    pub fn size(&self) -> DraftResult<usize> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        Ok(match &state.copy {
            Some(DraftBody::Map { entries }) => entries.len(),
            _ => match &state.base {
                Value::Map(m) => m.entries.len(),
                _ => 0,
            },
        })
    }

    pub fn has(&self, key: &Value) -> DraftResult<bool> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        let vk = ValueKey(key.clone());
        Ok(match &state.copy {
            Some(DraftBody::Map { entries }) => entries.contains_key(&vk),
            _ => match &state.base {
                Value::Map(m) => m.entries.contains_key(&vk),
                _ => false,
            },
        })
    }

    /// Safe to serve directly from base+copy without forcing drafts
    /// (`spec.md` §4.4 "keys is safe to serve from base+copy directly").
    pub fn keys(&self) -> DraftResult<Vec<Value>> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        Ok(match &state.copy {
            Some(DraftBody::Map { entries }) => entries.values().map(|(k, _)| k.clone()).collect(),
            _ => match &state.base {
                Value::Map(m) => m.entries.values().map(|(k, _)| k.clone()).collect(),
                _ => Vec::new(),
            },
        })
    }

    /// `get(k)` — mirrors Record's `get`: materialize a child draft on
    /// first read of a draftable value that still matches base.
    pub fn get(&self, key: &Value) -> DraftResult<Read> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        let vk = ValueKey(key.clone());

        if let Some(DraftBody::Map { entries }) = &state.copy {
            return match entries.get(&vk).cloned() {
                Some((_, slot)) => Self::resolve_slot(slot),
                None => Ok(Read::Value(Value::Nothing)),
            };
        }

        let base_entries = match &state.base {
            Value::Map(m) => m.entries.clone(),
            _ => unreachable!("MapDraft base is always a Map"),
        };
        let Some((orig_key, v)) = base_entries.get(&vk).cloned() else {
            return Ok(Read::Value(Value::Nothing));
        };
        if state.finalized {
            return Ok(Read::Value(v));
        }

        let scope = state.scope.clone();
        let config = state.config;
        let read = crate::draft::read_through(v, &scope, self.0, config);
        if let Read::Draft(d) = &read {
            let mut entries: IndexMap<ValueKey, (Value, Slot)> =
                base_entries.into_iter().map(|(k, (kv, v))| (k, (kv, Slot::Raw(v)))).collect();
            entries.insert(vk, (orig_key, Slot::Draft(d.handle())));
            state.copy = Some(DraftBody::Map { entries });
        }
        Ok(read)
    }

    /// `set(k, v)` — no-op if `effective.has(k) && effective.get(k) === v`.
    pub fn set(&self, key: Value, v: Value) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let vk = ValueKey(key.clone());

        let current = match &state.copy {
            Some(DraftBody::Map { entries }) => entries.get(&vk).and_then(|(_, s)| match s {
                Slot::Raw(r) => Some(r.clone()),
                Slot::Draft(_) => None,
            }),
            None => match &state.base {
                Value::Map(m) => m.entries.get(&vk).map(|(_, v)| v.clone()),
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
        if let Some(DraftBody::Map { entries }) = &mut state.copy {
            entries.insert(vk.clone(), (key.clone(), Slot::Raw(v)));
        }
        state.assigned.insert(crate::value::Key::from(key_repr(&key)), true);
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// `delete(k)` — returns whether the key was present.
    pub fn delete(&self, key: &Value) -> DraftResult<bool> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let vk = ValueKey(key.clone());
        if !self.has(key)? {
            return Ok(false);
        }
        let existed_in_base = matches!(&state.base, Value::Map(m) if m.entries.contains_key(&vk));
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Map { entries }) = &mut state.copy {
            entries.shift_remove(&vk);
        }
        let k_repr = crate::value::Key::from(key_repr(key));
        if existed_in_base {
            state.assigned.insert(k_repr, false);
            drop(state);
            crate::draft::propagate_modified(self.0)?;
        } else {
            state.assigned.remove(&k_repr);
        }
        Ok(true)
    }

    /// `clear()` — `spec.md` §4.4.
    pub fn clear(&self) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let is_empty = match &state.copy {
            Some(DraftBody::Map { entries }) => entries.is_empty(),
            None => matches!(&state.base, Value::Map(m) if m.entries.is_empty()),
            _ => true,
        };
        if is_empty {
            return Ok(());
        }
        let base_keys: Vec<Value> = match &state.base {
            Value::Map(m) => m.entries.values().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        };
        state.copy = Some(DraftBody::Map { entries: IndexMap::new() });
        for k in base_keys {
            state.assigned.insert(crate::value::Key::from(key_repr(&k)), false);
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// Forces copy materialization and routes every element through `get`,
    /// per `spec.md` §4.4 "Iteration ... must yield possibly-drafted
    /// values".
    pub fn values(&self) -> DraftResult<Vec<Read>> {
        let keys = self.keys()?;
        keys.iter().map(|k| self.get(k)).collect()
    }

    pub fn original(&self) -> DraftResult<Value> {
        Ok(self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?.base.clone())
    }
}

/// `assigned` is keyed by `Key` (string/symbol) elsewhere in the crate;
/// KeyedMap keys are arbitrary `Value`s, so patch/assigned bookkeeping for
/// maps uses this value's `Debug` rendition as a stable textual key. Map
/// patch paths in `spec.md` §4.7 are themselves string/integer, so this
/// matches the wire format.
pub(crate) fn key_repr(v: &Value) -> String { format!("{v:?}") }

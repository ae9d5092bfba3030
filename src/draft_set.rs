//! UniqueSet interception, `spec.md` §4.4.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use crate::draft::{Draft, Read};
use crate::error::{DraftError, DraftResult};
use crate::scope::DraftHandle;
use crate::state::{DraftBody, DraftState};
use crate::value::{Value, ValueKey};

#[derive(Clone, Copy)]
pub struct SetDraft(pub(crate) DraftHandle);

impl SetDraft {
    fn ensure_copy(state: &mut DraftState) {
        if state.copy.is_none() {
            let entries = match &state.base {
                Value::Set(s) => s.entries.clone(),
                _ => unreachable!("SetDraft base is always a Set"),
            };
            state.copy = Some(DraftBody::Set { entries, drafts: FxHashMap::default() });
        }
    }

    pub fn size(&self) -> DraftResult<usize> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        Ok(match &state.copy {
            Some(DraftBody::Set { entries, .. }) => entries.len(),
            _ => match &state.base {
                Value::Set(s) => s.entries.len(),
                _ => 0,
            },
        })
    }

    /// `has(v)` — checks the effective set for `v` directly, or for a
    /// drafted value whose original equals `v` (`spec.md` §4.4: a child
    /// draft obtained through iteration still satisfies `has` on its
    /// original value).
    pub fn has(&self, v: &Value) -> DraftResult<bool> {
        let state = self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?;
        let vk = ValueKey(v.clone());
        Ok(match &state.copy {
            Some(DraftBody::Set { entries, drafts }) => entries.contains(&vk) || drafts.contains_key(&vk),
            _ => match &state.base {
                Value::Set(s) => s.entries.contains(&vk),
                _ => false,
            },
        })
    }

    /// `add(v)` — no-op if already present.
    pub fn add(&self, v: Value) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        if self.has(&v)? {
            return Ok(());
        }
        Self::ensure_copy(&mut state);
        if let Some(DraftBody::Set { entries, .. }) = &mut state.copy {
            entries.insert(ValueKey(v));
        }
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// `delete(v)` — removes whichever of `v` or a drafted original-`v`
    /// is present.
    pub fn delete(&self, v: &Value) -> DraftResult<bool> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let vk = ValueKey(v.clone());
        if !self.has(v)? {
            return Ok(false);
        }
        Self::ensure_copy(&mut state);
        let removed = if let Some(DraftBody::Set { entries, drafts }) = &mut state.copy {
            let removed_entry = entries.shift_remove(&vk);
            let removed_draft = drafts.remove(&vk).is_some();
            removed_entry || removed_draft
        } else {
            false
        };
        drop(state);
        if removed {
            crate::draft::propagate_modified(self.0)?;
        }
        Ok(removed)
    }

    /// `clear()` — `spec.md` §4.4.
    pub fn clear(&self) -> DraftResult<()> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        if crate::value::is_frozen(&state.base) {
            return Err(DraftError::FrozenMutation);
        }
        let is_empty = match &state.copy {
            Some(DraftBody::Set { entries, drafts }) => entries.is_empty() && drafts.is_empty(),
            None => matches!(&state.base, Value::Set(s) if s.entries.is_empty()),
            _ => true,
        };
        if is_empty {
            return Ok(());
        }
        state.copy = Some(DraftBody::Set { entries: IndexSet::new(), drafts: FxHashMap::default() });
        drop(state);
        crate::draft::propagate_modified(self.0)
    }

    /// Iteration forces full copy materialization: every draftable base
    /// element is drafted in order and recorded in `drafts` so later
    /// `has`/`delete` calls recognize it by its original value
    /// (`spec.md` §4.4 "iteration ... force a copy materialization").
    pub fn values(&self) -> DraftResult<Vec<Read>> {
        let mut state = self.0.try_write().map_err(|_| DraftError::ProxyRevoked)?;
        Self::ensure_copy(&mut state);

        let finalized = state.finalized;
        let scope = state.scope.clone();
        let config = state.config;

        let (entries, mut drafts) = match state.copy.take() {
            Some(DraftBody::Set { entries, drafts }) => (entries, drafts),
            _ => unreachable!("ensure_copy just populated state.copy"),
        };

        let mut out = Vec::with_capacity(entries.len());
        let mut next_entries = IndexSet::new();
        for vk in entries.into_iter() {
            if let Some(handle) = drafts.get(&vk) {
                let kind = handle.try_read().map_err(|_| DraftError::ProxyRevoked)?.kind;
                out.push(Read::Draft(Draft::from_handle(*handle, kind)));
                next_entries.insert(vk);
                continue;
            }
            if finalized {
                out.push(Read::Value(vk.0.clone()));
                next_entries.insert(vk);
                continue;
            }
            let read = crate::draft::read_through(vk.0.clone(), &scope, self.0, config);
            match &read {
                Read::Draft(d) => {
                    drafts.insert(vk.clone(), d.handle());
                    next_entries.insert(vk);
                }
                Read::Value(_) => {
                    next_entries.insert(vk);
                }
            }
            out.push(read);
        }

        state.copy = Some(DraftBody::Set { entries: next_entries, drafts });
        Ok(out)
    }

    pub fn original(&self) -> DraftResult<Value> {
        Ok(self.0.try_read().map_err(|_| DraftError::ProxyRevoked)?.base.clone())
    }
}

//! Finalization engine, `spec.md` §4.5/§4.6.
//!
//! Drives the post-recipe traversal that turns a live draft tree into a
//! plain, structurally-shared `Value`, deciding per node whether to keep
//! `base` or substitute the realized `copy`, and emitting patches alongside
//! when a run asked for them.
//!
//! Three simplifications fall out of this crate's closed `Value` model
//! (recorded in `DESIGN.md`): `Value` has no variant that can hold a live
//! draft, so a plain value handed back by a recipe (or stored via `set`)
//! can never contain a buried draft the way a dynamically-typed language's
//! object graph could — the "walk plain substructure for buried drafts"
//! branch `spec.md` describes is therefore unreachable here. Freezing is
//! just flipping a `Cell<bool>` with no observable side effect on content,
//! so this crate performs the whole freeze pass once, over the finished
//! root value, after traversal completes and `scope.auto_freeze_allowed()`
//! has reached its final state, rather than interleaved per-node. And
//! `spec.md` §4.6's self-containment check (failing with `CircularReference`
//! if a child's finalized value turns out to be its own parent's in-progress
//! copy) can never trigger here: every `DraftHandle` is reachable only
//! through the single `parent` pointer its `DraftState` was created with,
//! set once at first-read time and never reassigned, so the draft graph
//! rooted at a run's root handle is a tree, not an arbitrary graph — there
//! is no path construction in this crate that could hand a handle back to
//! one of its own ancestors. `DraftError::CircularReference` stays in the
//! error taxonomy because `spec.md` §7 lists it as part of the engine's
//! error surface, but nothing in this crate ever constructs it — it is
//! unreachable dead code under this data model, not a missing check.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{DraftError, DraftResult};
use crate::patch::{self, PathSegment};
use crate::scope::{DraftHandle, Scope};
use crate::state::{DraftBody, Slot};
use crate::value::{is_draftable, is_frozen, mark_frozen, Key, Kind, MapData, RecordData, SequenceData, SetData, Value, ValueKey};

/// `FinishRun(recipeResult, scope)`, `spec.md` §4.5.
///
/// `recipe_result` is `None` when the recipe mutated the root draft in
/// place (finalize the root draft itself), `Some(v)` when the recipe
/// returned an explicit replacement value. Rust's recipe signature cannot
/// express "the recipe returned the root draft it was given" (a `Draft` is
/// not a `Value`), so every `Some` here is unconditionally the "replacement"
/// branch of the spec's `recipeResult is defined and is not the root draft`
/// check.
pub(crate) fn finish_run(scope: &Rc<Scope>, root: DraftHandle, recipe_result: Option<Value>) -> DraftResult<Value> {
    scope.set_unfinalized_count(scope.drafts().len());

    let result = match recipe_result {
        Some(replacement) => {
            let (root_modified, root_base) = {
                let state = root.try_read().map_err(|_| DraftError::ProxyRevoked)?;
                (state.modified, state.base.clone())
            };
            if root_modified {
                crate::scope::revoke(scope);
                return Err(DraftError::ModifiedAndReturned);
            }
            if scope.wants_patches() {
                scope.push_patches(
                    patch::Patch::replace(Vec::new(), patch::clone_patch_value(&replacement)),
                    patch::Patch::replace(Vec::new(), patch::clone_patch_value(&root_base)),
                );
            }
            replacement
        }
        None => finalize_handle(scope, root, if scope.wants_patches() { Some(Vec::new()) } else { None })?,
    };

    crate::scope::revoke(scope);

    if scope.config().auto_freeze() && scope.auto_freeze_allowed() {
        deep_freeze(&result);
    }

    scope.notify(crate::event::DraftEvent::Finalized);
    Ok(result)
}

/// Recursive `finalize(scope, v, path?)`, specialized to always start from a
/// draft handle (this crate's `Value` can never itself carry draft state).
fn finalize_handle(scope: &Rc<Scope>, handle: DraftHandle, path: Option<Vec<PathSegment>>) -> DraftResult<Value> {
    let mut state = handle.try_write().map_err(|_| DraftError::ProxyRevoked)?;

    // Cross-scope reference, spec.md §4.2/§4.5: a draft reachable from this
    // scope's output but owned by another, still-live scope. Leave it to its
    // owner and suppress auto-freeze on our own output.
    if state.scope.id() != scope.id() {
        scope.disable_auto_freeze();
        return Ok(state.base.clone());
    }

    if !state.modified {
        scope.decrement_unfinalized();
        return Ok(state.base.clone());
    }

    state.finalized = true;
    scope.decrement_unfinalized();

    let kind = state.kind;
    let base = state.base.clone();
    let assigned = std::mem::take(&mut state.assigned);
    let assigned_indices = std::mem::take(&mut state.assigned_indices);
    let body = state.copy.take().expect("modified draft always has an allocated copy");
    drop(state);

    let result = match (kind, body) {
        (Kind::Record, DraftBody::Record { tag, entries }) => {
            let base_entries = match &base {
                Value::Record(r) => r.entries.clone(),
                _ => unreachable!("Record draft base is always a Record"),
            };
            let mut final_entries = IndexMap::new();
            for (key, slot) in entries {
                let suppress = matches!(assigned.get(&key), Some(true));
                let child_path = child_path(&path, PathSegment::from(key.clone()), suppress);
                let v = finalize_slot(scope, slot, child_path)?;
                final_entries.insert(key, v);
            }
            emit_patches(scope, &path, || patch::record_like_patches(path.as_deref().unwrap_or(&[]), &base_entries, &final_entries, &assigned));
            Value::Record(Rc::new(RecordData::new(tag, final_entries)))
        }
        (Kind::Sequence, DraftBody::Sequence { items }) => {
            let base_items = match &base {
                Value::Sequence(s) => s.items.clone(),
                _ => unreachable!("Sequence draft base is always a Sequence"),
            };
            let mut final_items = Vec::with_capacity(items.len());
            for (idx, slot) in items.into_iter().enumerate() {
                let suppress = assigned_indices.contains(&idx);
                let child_path = child_path(&path, PathSegment::Index(idx), suppress);
                final_items.push(finalize_slot(scope, slot, child_path)?);
            }
            emit_patches(scope, &path, || patch::sequence_patches(path.as_deref().unwrap_or(&[]), &base_items, &final_items, &assigned_indices));
            Value::Sequence(Rc::new(SequenceData::new(final_items)))
        }
        (Kind::Map, DraftBody::Map { entries }) => {
            let base_entries = match &base {
                Value::Map(m) => m.entries.clone(),
                _ => unreachable!("Map draft base is always a Map"),
            };
            let mut final_entries = IndexMap::new();
            for (vk, (key_value, slot)) in entries {
                let repr = crate::draft_map::key_repr(&key_value);
                let suppress = matches!(assigned.get(&Key::from(repr.clone())), Some(true));
                let child_path = child_path(&path, PathSegment::Key(Key::from(repr)), suppress);
                let v = finalize_slot(scope, slot, child_path)?;
                final_entries.insert(vk, (key_value, v));
            }
            emit_patches(scope, &path, || patch::map_patches(path.as_deref().unwrap_or(&[]), &base_entries, &final_entries, &assigned));
            Value::Map(Rc::new(MapData::new(final_entries)))
        }
        (Kind::Set, DraftBody::Set { entries, drafts }) => {
            let base_set = match &base {
                Value::Set(s) => s.entries.clone(),
                _ => unreachable!("Set draft base is always a Set"),
            };
            // Snapshot-then-clear the copy (spec.md §4.5): iterate the
            // pre-finalization membership once, re-inserting each element
            // (drafted or raw) into a fresh set so insertion order survives
            // mixed add/remove/draft traffic.
            let mut final_set = IndexSet::new();
            for vk in entries {
                if let Some(child_handle) = drafts.get(&vk) {
                    // Set patches never extend the path (spec.md §4.5
                    // finalizeProperty), so no per-element path tracking.
                    let v = finalize_handle(scope, *child_handle, None)?;
                    final_set.insert(ValueKey(v));
                } else {
                    final_set.insert(vk);
                }
            }
            emit_patches(scope, &path, || patch::set_patches(path.as_deref().unwrap_or(&[]), &base_set, &final_set));
            Value::Set(Rc::new(SetData::new(final_set)))
        }
        _ => unreachable!("DraftState.kind and DraftBody are always constructed in lockstep"),
    };

    Ok(result)
}

/// Resolve one child slot to its finalized value: a raw slot is already
/// plain (this crate's `Value` cannot embed a draft, so no further
/// traversal is needed); a drafted slot recurses.
fn finalize_slot(scope: &Rc<Scope>, slot: Slot, path: Option<Vec<PathSegment>>) -> DraftResult<Value> {
    match slot {
        Slot::Raw(v) => Ok(v),
        Slot::Draft(h) => finalize_handle(scope, h, path),
    }
}

/// Extend a tracked path for a child, or suppress tracking entirely —
/// `spec.md` §4.5 finalizeProperty: omit the extension when the key was
/// touched via explicit assignment (the enclosing patch already captures
/// the whole new value) or when the parent is a UniqueSet (set patches are
/// whole-element, never nested).
fn child_path(path: &Option<Vec<PathSegment>>, seg: PathSegment, suppress: bool) -> Option<Vec<PathSegment>> {
    if suppress {
        return None;
    }
    path.as_ref().map(|p| {
        let mut p = p.clone();
        p.push(seg);
        p
    })
}

fn emit_patches(scope: &Rc<Scope>, path: &Option<Vec<PathSegment>>, gen: impl FnOnce() -> (Vec<patch::Patch>, Vec<patch::Patch>)) {
    if path.is_none() || !scope.wants_patches() {
        return;
    }
    let (forward, inverse) = gen();
    for (f, i) in forward.into_iter().zip(inverse.into_iter()) {
        scope.push_patches(f, i);
    }
}

/// Recursively marks an entire already-built value tree frozen. Safe to
/// call on a tree that is partly already frozen (stops descending there) —
/// this is what makes the freeze-hook policy a single post-traversal pass
/// rather than one interleaved into `finalize_handle`: every subtree that
/// came from an unmodified draft's `base`, or from a sibling's earlier
/// finalize pass, is already frozen and this call is then a no-op for it.
pub(crate) fn deep_freeze(v: &Value) {
    if !is_draftable(v) || is_frozen(v) {
        return;
    }
    mark_frozen(v);
    match v {
        Value::Record(r) => {
            for cv in r.entries.values() {
                deep_freeze(cv);
            }
        }
        Value::Sequence(s) => {
            for cv in s.items.iter() {
                deep_freeze(cv);
            }
        }
        Value::Map(m) => {
            for (_, cv) in m.entries.values() {
                deep_freeze(cv);
            }
        }
        Value::Set(s) => {
            for vk in s.entries.iter() {
                deep_freeze(&vk.0);
            }
        }
        _ => {}
    }
}

//! The public entry points, `spec.md` §6: `Run`, `RunWithPatches`,
//! `CreateManualDraft`/`FinishManualDraft`, `Original`, `IsDraft`.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::draft::{Draft, Read};
use crate::error::{DraftError, DraftResult};
use crate::event::Listener;
use crate::patch::Patch;
use crate::scope::{self, DraftHandle, Scope};
use crate::state::DraftState;
use crate::value::{classify, is_draftable, Value};

/// `Run(base, recipe) -> newValue`, `spec.md` §6 item 1, default config.
///
/// `base` must be draftable (Record/Sequence/KeyedMap/UniqueSet); a scalar
/// base has no `Draft` view to hand the recipe, so it is rejected here with
/// [`DraftError::NotDraftable`] just like any other non-draftable value —
/// call [`run_scalar`] instead for the scalar-base recipe path `spec.md` §6
/// item 1's first bullet describes.
pub fn run(base: &Value, recipe: impl FnOnce(&Draft) -> DraftResult<Option<Value>>) -> DraftResult<Value> {
    run_with_config(EngineConfig::default(), base, recipe)
}

/// As [`run`], with an explicit [`EngineConfig`] (`spec.md` §6 item 7).
pub fn run_with_config(
    config: EngineConfig,
    base: &Value,
    recipe: impl FnOnce(&Draft) -> DraftResult<Option<Value>>,
) -> DraftResult<Value> {
    let (value, _) = run_inner(config, base, false, None, recipe)?;
    Ok(value)
}

/// `Run(base, recipe)` for a non-draftable, non-object `base` — `spec.md` §6
/// item 1's first bullet, kept as a dedicated entry point rather than folded
/// into [`run`] (see `SPEC_FULL.md` REDESIGN FLAGS: there is no `Draft` value
/// a bare scalar could hand the recipe). The recipe runs directly against
/// `base`; its return governs the result the same way an object recipe's
/// return would: `None` keeps `base` unchanged, `Some(Value::Nothing)`
/// clears the result to nothing, `Some(v)` replaces it outright.
///
/// Returns [`DraftError::BadArgument`] if `base` is actually draftable (use
/// [`run`] instead), and [`DraftError::NotDraftable`] if `base` is some other
/// non-draftable, non-scalar value (`Value::Opaque`).
pub fn run_scalar(base: &Value, recipe: impl FnOnce(&Value) -> DraftResult<Option<Value>>) -> DraftResult<Value> {
    if is_draftable(base) {
        return Err(DraftError::BadArgument("run_scalar called with a draftable base; use run instead"));
    }
    if matches!(base, Value::Opaque(_)) {
        return Err(DraftError::NotDraftable);
    }
    match recipe(base)? {
        None => Ok(base.clone()),
        Some(Value::Nothing) => Ok(Value::Nothing),
        Some(v) => Ok(v),
    }
}

/// `RunWithPatches(base, recipe) -> (newValue, forwardPatches, inversePatches)`,
/// `spec.md` §6 item 2.
pub fn run_with_patches(
    base: &Value,
    recipe: impl FnOnce(&Draft) -> DraftResult<Option<Value>>,
) -> DraftResult<(Value, Vec<Patch>, Vec<Patch>)> {
    let (value, patches) = run_inner(EngineConfig::default(), base, true, None, recipe)?;
    let (forward, inverse) = patches.unwrap_or_default();
    Ok((value, forward, inverse))
}

/// As [`run`], wired to a [`Listener`] (`SPEC_FULL.md` §1.3): the core never
/// depends on a logging crate, so a caller who wants `log`/`tracing` output
/// plugs it in here.
pub fn run_with_listener(
    base: &Value,
    listener: Listener,
    recipe: impl FnOnce(&Draft) -> DraftResult<Option<Value>>,
) -> DraftResult<Value> {
    let (value, _) = run_inner(EngineConfig::default(), base, false, Some(listener), recipe)?;
    Ok(value)
}

fn run_inner(
    config: EngineConfig,
    base: &Value,
    want_patches: bool,
    listener: Option<Listener>,
    recipe: impl FnOnce(&Draft) -> DraftResult<Option<Value>>,
) -> DraftResult<(Value, Option<(Vec<Patch>, Vec<Patch>)>)> {
    if !is_draftable(base) {
        return Err(DraftError::NotDraftable);
    }

    let scope = scope::enter(config, want_patches, listener);
    let root = new_root_draft(&scope, base, config, false);
    let root_draft = Draft::from_handle(root, classify(base));

    let recipe_result = match recipe(&root_draft) {
        Ok(v) => v,
        Err(e) => {
            scope::revoke(&scope);
            return Err(e);
        }
    };

    let result = crate::finalize::finish_run(&scope, root, recipe_result)?;
    let patches = scope.take_patches();
    Ok((result, patches))
}

fn new_root_draft(scope: &Rc<Scope>, base: &Value, config: EngineConfig, is_manual: bool) -> DraftHandle {
    let kind = classify(base);
    let state = DraftState::new(kind, base.clone(), None, scope.clone(), config, is_manual);
    scope.insert_draft(state)
}

/// An externally-managed draft created by [`create_manual_draft`],
/// `spec.md` §6 item 3. Its scope stays alive (popped off the stack but not
/// revoked) until [`finish_manual_draft`] consumes it.
///
/// Dropping a `ManualDraft` without finishing it leaks its scope and base —
/// `spec.md`'s manual-draft lifetime is bounded by the caller, not by a
/// recipe closure, so there is no automatic point to revoke from. In debug
/// builds this is caught with an assertion instead of passing silently.
pub struct ManualDraft {
    scope: Rc<Scope>,
    root: DraftHandle,
    kind: crate::value::Kind,
    finished: Cell<bool>,
}

impl ManualDraft {
    /// The navigable root draft. Cheap to call repeatedly.
    pub fn draft(&self) -> Draft { Draft::from_handle(self.root, self.kind) }
}

impl Drop for ManualDraft {
    fn drop(&mut self) {
        debug_assert!(self.finished.get(), "ManualDraft dropped without calling finish_manual_draft");
    }
}

/// `CreateManualDraft(base) -> draft`, `spec.md` §6 item 3, default config.
pub fn create_manual_draft(base: &Value) -> DraftResult<ManualDraft> {
    create_manual_draft_with(EngineConfig::default(), base, false)
}

/// As [`create_manual_draft`], but the eventual [`finish_manual_draft_with_patches`]
/// call will actually produce patches.
pub fn create_manual_draft_with_patches(base: &Value) -> DraftResult<ManualDraft> {
    create_manual_draft_with(EngineConfig::default(), base, true)
}

/// As [`create_manual_draft`], with an explicit [`EngineConfig`].
pub fn create_manual_draft_with_config(config: EngineConfig, base: &Value) -> DraftResult<ManualDraft> {
    create_manual_draft_with(config, base, false)
}

fn create_manual_draft_with(config: EngineConfig, base: &Value, want_patches: bool) -> DraftResult<ManualDraft> {
    if !is_draftable(base) {
        return Err(DraftError::NotDraftable);
    }
    let scope = scope::enter(config, want_patches, None);
    let root = new_root_draft(&scope, base, config, true);
    // Manual drafts outlive the recipe-shaped Enter/Leave bracket the normal
    // `run` path uses; pop the scope off the stack immediately so a nested
    // `run` started while this draft is still open gets its own scope.
    scope::leave(&scope);
    Ok(ManualDraft { scope, root, kind: classify(base), finished: Cell::new(false) })
}

/// `FinishManualDraft(draft) -> newValue`, `spec.md` §6 item 3.
pub fn finish_manual_draft(draft: ManualDraft) -> DraftResult<Value> {
    let (value, _) = finish_manual_draft_inner(draft)?;
    Ok(value)
}

/// As [`finish_manual_draft`], also returning the forward/inverse patches —
/// empty unless the draft was created with
/// [`create_manual_draft_with_patches`].
pub fn finish_manual_draft_with_patches(draft: ManualDraft) -> DraftResult<(Value, Vec<Patch>, Vec<Patch>)> {
    let (value, patches) = finish_manual_draft_inner(draft)?;
    let (forward, inverse) = patches.unwrap_or_default();
    Ok((value, forward, inverse))
}

fn finish_manual_draft_inner(draft: ManualDraft) -> DraftResult<(Value, Option<(Vec<Patch>, Vec<Patch>)>)> {
    draft.finished.set(true);
    let result = crate::finalize::finish_run(&draft.scope, draft.root, None)?;
    let patches = draft.scope.take_patches();
    Ok((result, patches))
}

/// `Original(draft) -> base`, `spec.md` §6 item 6.
pub fn original(draft: &Draft) -> DraftResult<Value> {
    match draft {
        Draft::Record(r) => r.original(),
        Draft::Sequence(s) => s.original(),
        Draft::Map(m) => m.original(),
        Draft::Set(s) => s.original(),
    }
}

/// `IsDraft(v) -> bool`, `spec.md` §6 item 6, specialized to this crate's
/// `Read` (a plain `Value` can never itself be a live draft here).
pub fn is_draft(read: &Read) -> bool { matches!(read, Read::Draft(_)) }

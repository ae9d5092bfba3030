//! Patch generator & applier, `spec.md` §4.7/§4.8.
//!
//! `Patch` is the crate's stable wire format (`spec.md` §6 item 9). The
//! generator half lives alongside [`crate::finalize`] (it needs the
//! finalized tree and the draft-state bookkeeping in the same pass); this
//! module owns the `Patch` type itself, the per-kind generation helpers it
//! calls into, and the standalone applier.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{DraftError, DraftResult};
use crate::value::{shallow_copy, Key, RecordData, SequenceData, Value};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// A record/sequence/map path segment: `spec.md` §6 item 9 "path elements
/// string or non-negative integer".
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(Key),
    Index(usize),
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self { PathSegment::Index(i) }
}
impl From<Key> for PathSegment {
    fn from(k: Key) -> Self { PathSegment::Key(k) }
}
impl From<&str> for PathSegment {
    fn from(s: &str) -> Self { PathSegment::Key(Key::from(s)) }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// `{op, path, value?}` — `spec.md` §4.7.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<PathSegment>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub value: Option<Value>,
}

impl Patch {
    pub(crate) fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Patch { op: PatchOp::Replace, path, value: Some(value) }
    }
    pub(crate) fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Patch { op: PatchOp::Add, path, value: Some(value) }
    }
    pub(crate) fn remove(path: Vec<PathSegment>, value: Option<Value>) -> Self {
        Patch { op: PatchOp::Remove, path, value }
    }
}

/// `clonePatchValueIfNeeded`, `spec.md` §4.7: deep clone when capturing a
/// value that is still reachable as a draft, so later mutation of the
/// draft tree cannot leak back into an already-emitted patch. Finalized
/// values passed through here are plain `Value`s already, so this reduces
/// to a structural deep clone of scalars/containers.
pub(crate) fn clone_patch_value(v: &Value) -> Value {
    match v {
        Value::Record(r) => {
            let entries: IndexMap<Key, Value> =
                r.entries.iter().map(|(k, v)| (k.clone(), clone_patch_value(v))).collect();
            Value::Record(std::rc::Rc::new(RecordData::new(r.tag.clone(), entries)))
        }
        Value::Sequence(s) => {
            Value::Sequence(std::rc::Rc::new(SequenceData::new(s.items.iter().map(clone_patch_value).collect())))
        }
        Value::Map(m) => {
            let entries = m
                .entries
                .iter()
                .map(|(k, (kv, v))| (k.clone(), (kv.clone(), clone_patch_value(v))))
                .collect();
            Value::Map(std::rc::Rc::new(crate::value::MapData::new(entries)))
        }
        Value::Set(_) => shallow_copy(v, Default::default()),
        other => other.clone(),
    }
}

/// Record/KeyedMap patch generation, `spec.md` §4.7 first bullet. `base`
/// and `final_entries` are the pre- and post-finalization entry maps;
/// `assigned` is the draft's recorded per-key write/delete flags.
pub(crate) fn record_like_patches(
    path: &[PathSegment],
    base: &IndexMap<Key, Value>,
    final_entries: &IndexMap<Key, Value>,
    assigned: &FxHashMap<Key, bool>,
) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    for (key, &was_set) in assigned {
        let mut p = path.to_vec();
        p.push(PathSegment::from(key.clone()));
        if !was_set {
            let old = base.get(key).cloned();
            forward.push(Patch::remove(p.clone(), None));
            if let Some(old) = old {
                inverse.push(Patch::add(p, clone_patch_value(&old)));
            }
            continue;
        }
        let new_val = final_entries.get(key).cloned().unwrap_or(Value::Nothing);
        if base.contains_key(key) {
            let old = base.get(key).unwrap();
            if crate::value::same_value(old, &new_val) {
                continue;
            }
            forward.push(Patch::replace(p.clone(), clone_patch_value(&new_val)));
            inverse.push(Patch::replace(p, clone_patch_value(old)));
        } else {
            forward.push(Patch::add(p.clone(), clone_patch_value(&new_val)));
            inverse.push(Patch::remove(p, None));
        }
    }
    (forward, inverse)
}

/// KeyedMap patch generation, `spec.md` §4.7 first bullet, map-adapted.
///
/// A map's keys are arbitrary `Value`s rather than string/symbol `Key`s, so
/// `assigned` (which is `Key`-keyed everywhere else) records map keys under
/// their `Debug` rendition; this rebuilds the actual key `Value` by
/// scanning base+final once before the per-key loop.
pub(crate) fn map_patches(
    path: &[PathSegment],
    base: &IndexMap<crate::value::ValueKey, (Value, Value)>,
    final_entries: &IndexMap<crate::value::ValueKey, (Value, Value)>,
    assigned: &FxHashMap<Key, bool>,
) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    let mut by_repr: FxHashMap<String, Value> = FxHashMap::default();
    for (k, _) in base.values() {
        by_repr.entry(format!("{k:?}")).or_insert_with(|| k.clone());
    }
    for (k, _) in final_entries.values() {
        by_repr.entry(format!("{k:?}")).or_insert_with(|| k.clone());
    }

    for (key, &was_set) in assigned {
        let Key::Str(repr) = key else { continue };
        let Some(key_value) = by_repr.get(repr.as_ref()) else { continue };
        let vk = crate::value::ValueKey(key_value.clone());
        let mut p = path.to_vec();
        p.push(PathSegment::Key(key.clone()));
        if !was_set {
            let old = base.get(&vk).map(|(_, v)| v.clone());
            forward.push(Patch::remove(p.clone(), None));
            if let Some(old) = old {
                inverse.push(Patch::add(p, clone_patch_value(&old)));
            }
            continue;
        }
        let new_val = final_entries.get(&vk).map(|(_, v)| v.clone()).unwrap_or(Value::Nothing);
        if let Some((_, old)) = base.get(&vk) {
            if crate::value::same_value(old, &new_val) {
                continue;
            }
            forward.push(Patch::replace(p.clone(), clone_patch_value(&new_val)));
            inverse.push(Patch::replace(p, clone_patch_value(old)));
        } else {
            forward.push(Patch::add(p.clone(), clone_patch_value(&new_val)));
            inverse.push(Patch::remove(p, None));
        }
    }
    (forward, inverse)
}

/// Sequence patch generation, `spec.md` §4.7 second bullet / §8 scenarios
/// 2-3. Index-stable `replace` for written-and-changed positions, plus a
/// tail `add`/`remove` run for any length change — never a middle splice.
pub(crate) fn sequence_patches(
    path: &[PathSegment],
    base_items: &[Value],
    final_items: &[Value],
    assigned_indices: &FxHashSet<usize>,
) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();

    let common = base_items.len().min(final_items.len());
    for i in 0..common {
        if assigned_indices.contains(&i) && !crate::value::same_value(&base_items[i], &final_items[i]) {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(i));
            forward.push(Patch::replace(p.clone(), clone_patch_value(&final_items[i])));
            inverse.push(Patch::replace(p, clone_patch_value(&base_items[i])));
        }
    }

    if final_items.len() > base_items.len() {
        for i in base_items.len()..final_items.len() {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(i));
            forward.push(Patch::add(p.clone(), clone_patch_value(&final_items[i])));
            inverse.push(Patch::remove(p, None));
        }
    } else if final_items.len() < base_items.len() {
        for i in (final_items.len()..base_items.len()).rev() {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(i));
            forward.push(Patch::remove(p, None));
        }
        for i in final_items.len()..base_items.len() {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(i));
            inverse.push(Patch::add(p, clone_patch_value(&base_items[i])));
        }
    }
    (forward, inverse)
}

/// UniqueSet patch generation, `spec.md` §4.7 third bullet. A removed
/// element's path index is its position in `base`'s iteration order; an
/// added element's path index is its position in `final_set`'s — matching
/// the worked example in `spec.md` §8 scenario 5. The index is informational
/// only: the applier dispatches set `add`/`remove` by value, not position
/// (`spec.md` §4.8), so it does not by itself guarantee restoring the exact
/// original iteration order on inverse replay — only membership, which is
/// what [`crate::value::deep_eq`]'s order-insensitive set comparison checks.
pub(crate) fn set_patches(
    path: &[PathSegment],
    base: &indexmap::IndexSet<crate::value::ValueKey>,
    final_set: &indexmap::IndexSet<crate::value::ValueKey>,
) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    for (idx, vk) in base.iter().enumerate() {
        if !final_set.contains(vk) {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(idx));
            forward.push(Patch::remove(p.clone(), Some(clone_patch_value(&vk.0))));
            inverse.insert(0, Patch::add(p, clone_patch_value(&vk.0)));
        }
    }
    for (idx, vk) in final_set.iter().enumerate() {
        if !base.contains(vk) {
            let mut p = path.to_vec();
            p.push(PathSegment::Index(idx));
            forward.push(Patch::add(p.clone(), clone_patch_value(&vk.0)));
            inverse.insert(0, Patch::remove(p, Some(clone_patch_value(&vk.0))));
        }
    }
    (forward, inverse)
}

// --- Applier, spec.md §4.8 ---------------------------------------------

fn reject_prototype_pollution(seg: &PathSegment) -> DraftResult<()> {
    if let PathSegment::Key(Key::Str(s)) = seg {
        if s.as_ref() == "__proto__" || s.as_ref() == "constructor" || s.as_ref() == "prototype" {
            return Err(DraftError::PathUnresolved("forbidden prototype-polluting path segment"));
        }
    }
    Ok(())
}

/// `ApplyPatches(base, patches)`: the applier runs the patch list as a
/// producer over a fresh recipe (`spec.md` §4.8 last paragraph), so it is
/// implemented in terms of [`crate::run`] rather than mutating `base`
/// in-place.
pub fn apply_patches(base: &Value, patches: &[Patch]) -> DraftResult<Value> {
    // Optimization from spec.md §6 item 4: scan tail-first for a root
    // replace and use its value as the new base, skipping everything
    // before it.
    let mut start = 0usize;
    let mut effective_base = base.clone();
    for (i, p) in patches.iter().enumerate().rev() {
        if p.op == PatchOp::Replace && p.path.is_empty() {
            effective_base = p.value.clone().ok_or(DraftError::BadArgument("replace patch missing value"))?;
            start = i + 1;
            break;
        }
    }
    let remaining = &patches[start..];
    if remaining.is_empty() {
        return Ok(effective_base);
    }
    crate::api::run(&effective_base, |root| {
        for patch in remaining {
            apply_single(root, patch)?;
        }
        Ok(None)
    })
}

fn apply_single(root: &crate::draft::Draft, patch: &Patch) -> DraftResult<()> {
    if patch.path.is_empty() {
        // Root replace/remove handled by the caller via the normal
        // recipe-return-value replacement path; nothing to walk.
        return Ok(());
    }
    for seg in &patch.path[..patch.path.len() - 1] {
        reject_prototype_pollution(seg)?;
    }
    let last = patch.path.last().unwrap();
    reject_prototype_pollution(last)?;

    let parent = root.walk(&patch.path[..patch.path.len() - 1])?;
    let value = patch.value.as_ref().map(clone_patch_value);
    match (patch.op, parent.kind()) {
        (PatchOp::Replace, crate::value::Kind::Map) => parent.map_set(last, value.ok_or(DraftError::BadArgument("replace missing value"))?)?,
        (PatchOp::Replace, crate::value::Kind::Set) => return Err(DraftError::UnsupportedOperation("replace on a set")),
        (PatchOp::Replace, _) => parent.assign(last, value.ok_or(DraftError::BadArgument("replace missing value"))?)?,
        (PatchOp::Add, crate::value::Kind::Sequence) => parent.seq_insert(last, value.ok_or(DraftError::BadArgument("add missing value"))?)?,
        (PatchOp::Add, crate::value::Kind::Map) => parent.map_set(last, value.ok_or(DraftError::BadArgument("add missing value"))?)?,
        (PatchOp::Add, crate::value::Kind::Set) => parent.set_add(value.ok_or(DraftError::BadArgument("add missing value"))?)?,
        (PatchOp::Add, _) => parent.assign(last, value.ok_or(DraftError::BadArgument("add missing value"))?)?,
        (PatchOp::Remove, crate::value::Kind::Sequence) => parent.seq_remove(last)?,
        (PatchOp::Remove, crate::value::Kind::Map) => parent.map_delete(last)?,
        (PatchOp::Remove, crate::value::Kind::Set) => parent.set_delete(patch.value.as_ref().ok_or(DraftError::BadArgument("remove missing value"))?)?,
        (PatchOp::Remove, _) => parent.delete(last)?,
    }
    Ok(())
}

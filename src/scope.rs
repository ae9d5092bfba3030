//! Per-run scope stack, `spec.md` §4.2.
//!
//! A scope owns every draft created during one [`crate::run`] (or one
//! manual-draft lifetime). `Enter`/`Leave`/`Revoke` are realized as free
//! functions over a `thread_local!` stack of `Rc<Scope>`, per the
//! thread-local choice recorded in `DESIGN.md` for `spec.md` §9's "Global
//! mutable state" design note.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use generational_box::{GenerationalBox, Owner, UnsyncStorage};

use crate::config::EngineConfig;
use crate::event::{DraftEvent, Listener};
use crate::patch::Patch;
use crate::state::DraftState;

/// A revocable handle to a live [`DraftState`]. Dropping the owning
/// [`Scope`]'s [`Owner`] invalidates every handle issued from it at once —
/// this is the Rust rendition of `spec.md`'s per-draft `revoke` hook, for
/// free, at the scope granularity the spec already requires.
pub(crate) type DraftHandle = GenerationalBox<DraftState, UnsyncStorage>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ScopeId(u64);

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

impl ScopeId {
    fn new() -> Self { ScopeId(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed)) }
}

/// Forward + inverse patch accumulators, present only when a run asked for
/// patches (`spec.md` §4.2 "optional patch buffers").
#[derive(Default)]
pub(crate) struct PatchBuffers {
    pub forward: Vec<Patch>,
    pub inverse: Vec<Patch>,
}

/// One `run`/manual-draft context. `spec.md` §4.2: "owning engine-config
/// reference, a draft list, an `autoFreezeAllowed` flag, an
/// `unfinalizedCount` counter, and optional patch buffers + listener".
pub struct Scope {
    id: ScopeId,
    owner: RefCell<Option<Owner<UnsyncStorage>>>,
    drafts: RefCell<Vec<DraftHandle>>,
    auto_freeze_allowed: Cell<bool>,
    unfinalized_count: Cell<usize>,
    parent: Option<Rc<Scope>>,
    patches: RefCell<Option<PatchBuffers>>,
    config: EngineConfig,
    listener: RefCell<Option<Listener>>,
}

impl Scope {
    fn new(parent: Option<Rc<Scope>>, config: EngineConfig, want_patches: bool, listener: Option<Listener>) -> Rc<Scope> {
        Rc::new(Scope {
            id: ScopeId::new(),
            owner: RefCell::new(Some(UnsyncStorage::owner())),
            drafts: RefCell::new(Vec::new()),
            auto_freeze_allowed: Cell::new(true),
            unfinalized_count: Cell::new(0),
            parent,
            patches: RefCell::new(if want_patches { Some(PatchBuffers::default()) } else { None }),
            config,
            listener: RefCell::new(listener),
        })
    }

    pub(crate) fn notify(&self, event: DraftEvent) {
        if let Some(listener) = self.listener.borrow_mut().as_mut() {
            listener(event);
        }
    }

    pub(crate) fn id(&self) -> ScopeId { self.id }

    pub(crate) fn config(&self) -> EngineConfig { self.config }

    pub(crate) fn auto_freeze_allowed(&self) -> bool { self.auto_freeze_allowed.get() }

    pub(crate) fn disable_auto_freeze(&self) { self.auto_freeze_allowed.set(false); }

    pub(crate) fn unfinalized_count(&self) -> usize { self.unfinalized_count.get() }

    pub(crate) fn set_unfinalized_count(&self, n: usize) { self.unfinalized_count.set(n); }

    pub(crate) fn decrement_unfinalized(&self) {
        self.unfinalized_count.set(self.unfinalized_count.get().saturating_sub(1));
    }

    pub(crate) fn wants_patches(&self) -> bool { self.patches.borrow().is_some() }

    pub(crate) fn push_patches(&self, forward: Patch, inverse: Patch) {
        let had_buffers = if let Some(buffers) = self.patches.borrow_mut().as_mut() {
            buffers.forward.push(forward.clone());
            buffers.inverse.push(inverse.clone());
            true
        } else {
            false
        };
        if had_buffers {
            self.notify(DraftEvent::PatchEmitted { forward, inverse });
        }
    }

    pub(crate) fn take_patches(&self) -> Option<(Vec<Patch>, Vec<Patch>)> {
        self.patches.borrow_mut().take().map(|b| (b.forward, b.inverse))
    }

    pub(crate) fn drafts(&self) -> Vec<DraftHandle> { self.drafts.borrow().clone() }

    pub(crate) fn insert_draft(&self, state: DraftState) -> DraftHandle {
        let owner_ref = self.owner.borrow();
        let owner = owner_ref.as_ref().expect("scope used after revocation");
        let handle = owner.insert(state);
        drop(owner_ref);
        self.drafts.borrow_mut().push(handle);
        handle
    }

    fn revoke_owner(&self) {
        // Dropping the Owner invalidates every GenerationalBox it issued —
        // this is the scope-wide mass revocation `spec.md` §4.2 describes as
        // "calls each draft's revoke hook".
        self.owner.borrow_mut().take();
    }
}

thread_local! {
    static STACK: RefCell<Vec<Rc<Scope>>> = const { RefCell::new(Vec::new()) };
}

/// `Enter()`: pushes a fresh scope linking to the previous.
pub(crate) fn enter(config: EngineConfig, want_patches: bool, listener: Option<Listener>) -> Rc<Scope> {
    let parent = STACK.with(|s| s.borrow().last().cloned());
    let scope = Scope::new(parent, config, want_patches, listener);
    STACK.with(|s| s.borrow_mut().push(scope.clone()));
    scope.notify(DraftEvent::ScopeEntered);
    scope
}

/// `Leave()`: pops if the top is the given scope.
pub(crate) fn leave(scope: &Rc<Scope>) {
    STACK.with(|s| {
        let mut stack = s.borrow_mut();
        if matches!(stack.last(), Some(top) if Rc::ptr_eq(top, scope)) {
            stack.pop();
        }
    });
    scope.notify(DraftEvent::ScopeLeft);
}

/// `Revoke(scope)`: pops *and* calls each draft's revoke hook.
pub(crate) fn revoke(scope: &Rc<Scope>) {
    leave(scope);
    scope.revoke_owner();
    scope.notify(DraftEvent::ScopeRevoked);
}

/// The current innermost scope, if any run is in progress on this thread.
pub(crate) fn current() -> Option<Rc<Scope>> {
    STACK.with(|s| s.borrow().last().cloned())
}

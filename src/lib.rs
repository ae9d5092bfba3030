//! `draftwood`: a structural-sharing, copy-on-write immutable-update engine.
//!
//! Given a base value and a recipe closure that mutates a draft view of it,
//! [`run`] returns a new value sharing every untouched subtree with the
//! base. See `spec.md` for the full specification this crate implements.

#![allow(clippy::new_without_default)]

mod error;
pub use error::{DraftError, DraftResult};

mod config;
pub use config::{EngineConfig, ShallowCopyMode};

mod value;
pub use value::{classify, deep_eq, is_draftable, is_frozen, same_value, shallow_copy, Key, Kind, MapData, OpaqueValue, RecordData, SequenceData, SetData, Symbol, TypeTag, Value, ValueKey};

mod scope;

mod state;

mod draft;
pub use draft::{Draft, Read};

mod draft_record;
pub use draft_record::RecordDraft;

mod draft_sequence;
pub use draft_sequence::SequenceDraft;

mod draft_map;
pub use draft_map::MapDraft;

mod draft_set;
pub use draft_set::SetDraft;

mod patch;
pub use patch::{apply_patches, Patch, PatchOp, PathSegment};

mod finalize;

mod event;
pub use event::{DraftEvent, Listener};

mod snapshot;
pub use snapshot::snapshot;

mod api;
pub use api::{
    create_manual_draft, create_manual_draft_with_config, create_manual_draft_with_patches,
    finish_manual_draft, finish_manual_draft_with_patches, is_draft, original, run,
    run_scalar, run_with_config, run_with_listener, run_with_patches, ManualDraft,
};

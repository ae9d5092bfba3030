use thiserror::Error;

/// Error taxonomy for the draft engine. Every variant is unrecoverable from
/// the engine's perspective: on any of these, the owning scope has already
/// been (or is about to be) revoked and the base value is guaranteed
/// untouched.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("value is not draftable")]
    NotDraftable,

    #[error("cannot mutate a frozen value")]
    FrozenMutation,

    #[error("proxy revoked")]
    ProxyRevoked,

    #[error("recipe both mutated the root draft and returned a distinct value")]
    ModifiedAndReturned,

    /// Part of the engine's error taxonomy (`spec.md` §7) but never
    /// constructed by this crate: see `finalize.rs`'s module header for why
    /// the self-containment check it would report on is unreachable under
    /// this crate's tree-shaped draft graph.
    #[error("circular reference detected while finalizing draft tree")]
    CircularReference,

    #[error("bad argument: {0}")]
    BadArgument(&'static str),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("patch path could not be resolved: {0}")]
    PathUnresolved(&'static str),
}

pub type DraftResult<T> = Result<T, DraftError>;

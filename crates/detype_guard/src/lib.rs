//! detype_guard: The literal/comment guard.
//!
//! Classifies every byte of a source buffer as rewritable code or as part of
//! a string, template literal, or comment. The rewriting passes consult the
//! resulting mask so they never touch the inside of a literal, while the
//! contents of template interpolation placeholders stay rewritable.

pub mod chars;
mod guard;

pub use guard::{guard_source, GuardedSource, ProtectionKind, ProtectionMask};

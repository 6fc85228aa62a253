//! Importer dependency declarations.

use std::fmt;

/// How an importer depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Hard precedence: the upstream must have completed first.
    RequiredPre,
    /// Preferred ordering only; proceed without it.
    OptionalPre,
    /// Run this importer's secondary pass after the upstream's main pass.
    OptionalPost,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::RequiredPre => "required",
            DependencyKind::OptionalPre => "optional",
            DependencyKind::OptionalPost => "post",
        }
    }

    /// Whether the edge constrains main-pass ordering.
    pub fn orders_main_pass(&self) -> bool {
        matches!(self, DependencyKind::RequiredPre | DependencyKind::OptionalPre)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency on another importer, named by its entity name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub entity: &'static str,
    pub kind: DependencyKind,
    pub reason: &'static str,
}

impl Dependency {
    pub const fn required(entity: &'static str, reason: &'static str) -> Self {
        Self {
            entity,
            kind: DependencyKind::RequiredPre,
            reason,
        }
    }

    pub const fn optional(entity: &'static str, reason: &'static str) -> Self {
        Self {
            entity,
            kind: DependencyKind::OptionalPre,
            reason,
        }
    }

    pub const fn post(entity: &'static str, reason: &'static str) -> Self {
        Self {
            entity,
            kind: DependencyKind::OptionalPost,
            reason,
        }
    }
}

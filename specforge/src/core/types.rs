//! Shared deterministic types for the pipeline core.
//!
//! These types define stable contracts between components. They must not
//! depend on external state and serialize identically across runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One of the four generated outputs for a specification.
///
/// Declaration order is the generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Test,
    Doc,
    Bench,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Code,
        ArtifactKind::Test,
        ArtifactKind::Doc,
        ArtifactKind::Bench,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Code => "code",
            ArtifactKind::Test => "test",
            ArtifactKind::Doc => "doc",
            ArtifactKind::Bench => "bench",
        }
    }

    /// Docs extend an existing file; every other kind is written fresh.
    pub fn appends(self) -> bool {
        self == ArtifactKind::Doc
    }

    /// Whether the syntactic self-check applies (docs are prose).
    pub fn is_source(self) -> bool {
        self != ArtifactKind::Doc
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a validation check. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Format,
    Lint,
    Type,
    Test,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Format => "format",
            CheckKind::Lint => "lint",
            CheckKind::Type => "type",
            CheckKind::Test => "test",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute staged path for each artifact kind of one specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    paths: BTreeMap<ArtifactKind, PathBuf>,
}

impl ArtifactSet {
    pub fn insert(&mut self, kind: ArtifactKind, path: PathBuf) {
        self.paths.insert(kind, path);
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Path of the designated primary (`code`) artifact, if generated.
    pub fn primary(&self) -> Option<&Path> {
        self.get(ArtifactKind::Code)
    }

    /// True once every kind in [`ArtifactKind::ALL`] has a path.
    pub fn is_complete(&self) -> bool {
        ArtifactKind::ALL
            .iter()
            .all(|kind| self.paths.contains_key(kind))
    }

    /// Iterate in generation order.
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &Path)> {
        self.paths.iter().map(|(kind, path)| (*kind, path.as_path()))
    }
}

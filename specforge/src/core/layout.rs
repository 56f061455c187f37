//! Deterministic artifact placement.
//!
//! The same relative path is used inside the staging area and inside the
//! repository, so promotion is a pure re-rooting of each file.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::spec::Specification;
use crate::core::types::ArtifactKind;

/// Path templates per artifact kind. `{category}` and `{slug}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactLayout {
    pub code: String,
    pub test: String,
    pub doc: String,
    pub bench: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            code: "algolib/algorithms/{category}/{slug}.py".to_string(),
            test: "tests/algorithms/{category}/test_{slug}.py".to_string(),
            doc: "docs/source/algorithms/{category}/{slug}.rst".to_string(),
            bench: "tests/benchmarks/{category}/test_bench_{slug}.py".to_string(),
        }
    }
}

impl ArtifactLayout {
    pub fn template(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Code => &self.code,
            ArtifactKind::Test => &self.test,
            ArtifactKind::Doc => &self.doc,
            ArtifactKind::Bench => &self.bench,
        }
    }

    /// Relative path (staging- or repo-relative) for one artifact.
    pub fn relative_path(&self, kind: ArtifactKind, spec: &Specification) -> PathBuf {
        render(self.template(kind), &spec.category, &spec.slug())
    }

    pub fn validate(&self) -> Result<()> {
        let mut rendered = BTreeSet::new();
        for kind in ArtifactKind::ALL {
            let template = self.template(kind);
            if !template.contains("{slug}") {
                return Err(anyhow!("layout.{kind} must contain {{slug}}"));
            }
            let sample = render(template, "category", "slug");
            if template.starts_with('/') || !is_plain_relative(&sample) {
                return Err(anyhow!(
                    "layout.{kind} must be a relative path without '..' ({template})"
                ));
            }
            if !rendered.insert(sample) {
                return Err(anyhow!("layout.{kind} collides with another artifact path"));
            }
        }
        Ok(())
    }
}

fn render(template: &str, category: &str, slug: &str) -> PathBuf {
    let rendered = template
        .replace("{category}", category)
        .replace("{slug}", slug);
    rendered.split('/').filter(|part| !part.is_empty()).collect()
}

/// True for a non-empty path made only of normal components.
pub fn is_plain_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::{Complexity, Returns};

    fn spec(name: &str, category: &str) -> Specification {
        Specification {
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            complexity: Complexity {
                time_worst: "O(n^2)".to_string(),
                time_average: "O(n^2)".to_string(),
                time_best: "O(n)".to_string(),
                space_worst: "O(1)".to_string(),
            },
            parameters: Vec::new(),
            returns: Returns {
                ty: "list".to_string(),
                description: String::new(),
            },
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn default_layout_partitions_by_category() {
        let layout = ArtifactLayout::default();
        let spec = spec("Bubble Sort", "sorting");
        let paths: Vec<PathBuf> = ArtifactKind::ALL
            .iter()
            .map(|kind| layout.relative_path(*kind, &spec))
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("algolib/algorithms/sorting/bubble_sort.py"),
                PathBuf::from("tests/algorithms/sorting/test_bubble_sort.py"),
                PathBuf::from("docs/source/algorithms/sorting/bubble_sort.rst"),
                PathBuf::from("tests/benchmarks/sorting/test_bench_bubble_sort.py"),
            ]
        );
        for path in &paths {
            assert_eq!(
                path.parent().and_then(Path::file_name),
                Some(std::ffi::OsStr::new("sorting"))
            );
        }
    }

    #[test]
    fn default_layout_validates() {
        ArtifactLayout::default().validate().expect("valid");
    }

    #[test]
    fn validate_rejects_escaping_and_colliding_templates() {
        let layout = ArtifactLayout {
            code: "../{slug}.py".to_string(),
            ..ArtifactLayout::default()
        };
        assert!(layout.validate().is_err());

        let layout = ArtifactLayout {
            bench: "tests/algorithms/{category}/test_{slug}.py".to_string(),
            ..ArtifactLayout::default()
        };
        let err = layout.validate().unwrap_err().to_string();
        assert!(err.contains("collides"), "{err}");

        let layout = ArtifactLayout {
            doc: "docs/index.rst".to_string(),
            ..ArtifactLayout::default()
        };
        assert!(layout.validate().is_err());
    }
}

//! Prompt rendering for generation and correction requests.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::report::Diagnostic;
use crate::core::spec::Specification;
use crate::core::types::ArtifactKind;

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)
            .context("load generate template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix template")?;
        Ok(Self { env })
    }

    /// Prompt for one artifact. `path` is the repo-relative destination and
    /// `code_path` the primary artifact's, used to derive the import module.
    pub fn render_generate(
        &self,
        spec: &Specification,
        kind: ArtifactKind,
        path: &Path,
        code_path: &Path,
    ) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template
            .render(context! {
                spec => spec,
                slug => spec.slug(),
                kind => kind.as_str(),
                path => path.to_string_lossy(),
                module => module_path(code_path),
            })
            .with_context(|| format!("render {kind} prompt"))?;
        Ok(rendered)
    }

    pub fn render_fix(
        &self,
        path: &Path,
        content: &str,
        diagnostics: &[Diagnostic],
    ) -> Result<String> {
        let template = self.env.get_template("fix")?;
        let lines: Vec<String> = diagnostics.iter().map(Diagnostic::render).collect();
        let rendered = template
            .render(context! {
                path => path.to_string_lossy(),
                content => content.trim_end(),
                diagnostics => lines,
            })
            .context("render fix prompt")?;
        Ok(rendered)
    }
}

/// `algolib/algorithms/sorting/bubble_sort.py` -> `algolib.algorithms.sorting.bubble_sort`.
fn module_path(code_path: &Path) -> String {
    code_path
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CheckKind;

    const SPEC: &str = r#"
name: Bubble Sort
category: sorting
complexity:
  time_worst: O(n^2)
  time_average: O(n^2)
  time_best: O(n)
  space_worst: O(1)
parameters:
  - name: items
    type: list[int]
    description: values to sort
returns:
  type: list[int]
  description: sorted copy
dependencies: []
"#;

    #[test]
    fn module_path_drops_extension() {
        assert_eq!(
            module_path(Path::new("algolib/algorithms/sorting/bubble_sort.py")),
            "algolib.algorithms.sorting.bubble_sort"
        );
    }

    #[test]
    fn generate_prompt_mentions_spec_details() {
        let spec = Specification::from_yaml(SPEC).expect("spec");
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine
            .render_generate(
                &spec,
                ArtifactKind::Test,
                Path::new("tests/algorithms/sorting/test_bubble_sort.py"),
                Path::new("algolib/algorithms/sorting/bubble_sort.py"),
            )
            .expect("render");
        assert!(prompt.contains("Bubble Sort"));
        assert!(prompt.contains("`items` (list[int]): values to sort"));
        assert!(prompt.contains("from algolib.algorithms.sorting.bubble_sort import bubble_sort"));
        assert!(!prompt.contains("Allowed dependencies"));
    }

    #[test]
    fn fix_prompt_lists_diagnostics() {
        let engine = PromptEngine::new().expect("engine");
        let diags = vec![Diagnostic {
            check: "ruff-lint".to_string(),
            kind: CheckKind::Lint,
            line: Some(4),
            excerpt: "x.py:4:1: F401 unused import".to_string(),
        }];
        let prompt = engine
            .render_fix(Path::new("x.py"), "import os\n", &diags)
            .expect("render");
        assert!(prompt.contains("- [ruff-lint] line 4: x.py:4:1: F401 unused import"));
        assert!(prompt.contains("````\nimport os\n````"), "{prompt}");
    }
}

//! Algorithm specification records and slug derivation.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Declared asymptotic costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Complexity {
    pub time_worst: String,
    pub time_average: String,
    pub time_best: String,
    pub space_worst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Returns {
    #[serde(rename = "type")]
    pub ty: String,
    pub description: String,
}

/// One unit of work: an algorithm to generate artifacts for.
///
/// Immutable once loaded; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Specification {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub complexity: Complexity,
    pub parameters: Vec<Parameter>,
    pub returns: Returns,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Specification {
    /// Parse a YAML record and check it against the schema rules.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let spec: Specification = serde_yaml::from_str(raw).context("parse specification yaml")?;
        let errors = spec.violations();
        if !errors.is_empty() {
            bail!("schema violations:\n- {}", errors.join("\n- "));
        }
        Ok(spec)
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Return every schema rule the record breaks (empty when valid).
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        } else if self.name.trim() != self.name {
            errors.push("name must not have leading or trailing whitespace".to_string());
        } else if let Err(reason) = check_segment(&self.slug()) {
            errors.push(format!("name '{}' yields an unusable slug: {reason}", self.name));
        }

        if self.category.is_empty() {
            errors.push("category must not be empty".to_string());
        } else {
            for segment in self.category.split('/') {
                if let Err(reason) = check_segment(segment) {
                    errors.push(format!("category '{}': {reason}", self.category));
                    break;
                }
            }
        }

        let complexity = [
            ("time_worst", &self.complexity.time_worst),
            ("time_average", &self.complexity.time_average),
            ("time_best", &self.complexity.time_best),
            ("space_worst", &self.complexity.space_worst),
        ];
        for (field, value) in complexity {
            if value.trim().is_empty() {
                errors.push(format!("complexity.{field} must not be empty"));
            }
        }

        let mut seen = BTreeSet::new();
        for (idx, param) in self.parameters.iter().enumerate() {
            if param.name.trim().is_empty() {
                errors.push(format!("parameters[{idx}].name must not be empty"));
            } else if !seen.insert(param.name.as_str()) {
                errors.push(format!("duplicate parameter name '{}'", param.name));
            }
            if param.ty.trim().is_empty() {
                errors.push(format!("parameters[{idx}].type must not be empty"));
            }
        }

        if self.returns.ty.trim().is_empty() {
            errors.push("returns.type must not be empty".to_string());
        }

        for dep in &self.dependencies {
            if dep.trim().is_empty() {
                errors.push("dependencies must not contain empty names".to_string());
                break;
            }
        }

        errors
    }
}

/// Lower-case the name and turn spaces into underscores.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// A slug or category segment ends up in file paths and branch names.
fn check_segment(segment: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err("empty path segment".to_string());
    }
    if segment.starts_with('.') || segment.starts_with('-') {
        return Err(format!("'{segment}' must not start with '.' or '-'"));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("'{segment}' contains unsupported character '{bad}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUBBLE: &str = r#"
name: Bubble Sort
description: Repeatedly swaps adjacent out-of-order elements.
category: sorting
complexity:
  time_worst: O(n^2)
  time_average: O(n^2)
  time_best: O(n)
  space_worst: O(1)
parameters:
  - name: items
    type: list[int]
    description: Values to sort.
returns:
  type: list[int]
  description: Sorted values.
dependencies: []
"#;

    #[test]
    fn parses_valid_record_and_derives_slug() {
        let spec = Specification::from_yaml(BUBBLE).expect("parse");
        assert_eq!(spec.slug(), "bubble_sort");
        assert_eq!(spec.parameters[0].ty, "list[int]");
        assert_eq!(spec.complexity.time_best, "O(n)");
    }

    #[test]
    fn slug_is_stable_for_a_name() {
        assert_eq!(slugify("Binary Search"), slugify("Binary Search"));
        assert_eq!(slugify("Union Find"), "union_find");
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = BUBBLE.replace("dependencies: []", "dependencies: []\nextra: 1");
        let err = Specification::from_yaml(&raw).unwrap_err();
        assert!(format!("{err:#}").contains("extra"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let raw = BUBBLE.replace("category: sorting\n", "");
        assert!(Specification::from_yaml(&raw).is_err());
    }

    #[test]
    fn reports_schema_violations() {
        let raw = BUBBLE
            .replace("name: Bubble Sort", "name: ../escape")
            .replace("time_best: O(n)", "time_best: ''");
        let err = Specification::from_yaml(&raw).unwrap_err().to_string();
        assert!(err.contains("unusable slug"), "{err}");
        assert!(err.contains("complexity.time_best"), "{err}");
    }

    #[test]
    fn nested_category_segments_are_allowed() {
        let raw = BUBBLE.replace("category: sorting", "category: graph/traversal");
        let spec = Specification::from_yaml(&raw).expect("parse");
        assert_eq!(spec.category, "graph/traversal");

        let raw = BUBBLE.replace("category: sorting", "category: graph//x");
        assert!(Specification::from_yaml(&raw).is_err());
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let raw = BUBBLE.replace(
            "    description: Values to sort.\n",
            "    description: Values to sort.\n  - name: items\n    type: int\n    description: again\n",
        );
        let err = Specification::from_yaml(&raw).unwrap_err().to_string();
        assert!(err.contains("duplicate parameter name 'items'"), "{err}");
    }
}

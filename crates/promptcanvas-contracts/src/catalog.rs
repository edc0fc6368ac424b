use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_CATALOG_JSON: &str = include_str!("../resources/prompt_catalog.json");

/// Literal placeholder replaced by the user's request in every category template.
pub const REQUEST_PLACEHOLDER: &str = "{request}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Marketing,
    Design,
    #[default]
    General,
    It,
    Hr,
    Business,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Marketing,
        Category::Design,
        Category::General,
        Category::It,
        Category::Hr,
        Category::Business,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Marketing => "marketing",
            Self::Design => "design",
            Self::General => "general",
            Self::It => "it",
            Self::Hr => "hr",
            Self::Business => "business",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Marketing => "Marketing",
            Self::Design => "Design",
            Self::General => "General",
            Self::It => "IT",
            Self::Hr => "HR",
            Self::Business => "Business",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_key(raw);
        Self::ALL
            .into_iter()
            .find(|category| category.key() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown category '{}' (expected one of: {})",
                    raw.trim(),
                    Self::ALL.map(|c| c.key()).join(", ")
                )
            })
    }
}

/// Visual tone appended to a composed prompt. `None` is the no-style sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleDescriptor {
    #[default]
    None,
    Cinematic,
    Minimalist,
    Cyberpunk,
    Watercolor,
    Photorealistic,
    FlatIllustration,
    Vintage,
}

impl StyleDescriptor {
    pub const ALL: [StyleDescriptor; 8] = [
        StyleDescriptor::None,
        StyleDescriptor::Cinematic,
        StyleDescriptor::Minimalist,
        StyleDescriptor::Cyberpunk,
        StyleDescriptor::Watercolor,
        StyleDescriptor::Photorealistic,
        StyleDescriptor::FlatIllustration,
        StyleDescriptor::Vintage,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Cinematic => "cinematic",
            Self::Minimalist => "minimalist",
            Self::Cyberpunk => "cyberpunk",
            Self::Watercolor => "watercolor",
            Self::Photorealistic => "photorealistic",
            Self::FlatIllustration => "flat_illustration",
            Self::Vintage => "vintage",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Cinematic => "Cinematic",
            Self::Minimalist => "Minimalist",
            Self::Cyberpunk => "Cyberpunk",
            Self::Watercolor => "Watercolor",
            Self::Photorealistic => "Photorealistic",
            Self::FlatIllustration => "Flat Illustration",
            Self::Vintage => "Vintage",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for StyleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StyleDescriptor {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_key(raw);
        if normalized.is_empty() {
            return Ok(Self::None);
        }
        Self::ALL
            .into_iter()
            .find(|style| style.key() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown style '{}' (expected one of: {})",
                    raw.trim(),
                    Self::ALL.map(|s| s.key()).join(", ")
                )
            })
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(|ch: char| ch == ' ' || ch == '-', "_")
}

/// Category templates and style clauses, loaded once per process.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCatalog {
    templates: IndexMap<Category, String>,
    clauses: IndexMap<StyleDescriptor, String>,
}

impl PromptCatalog {
    /// The table embedded in the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self {
            templates: IndexMap::new(),
            clauses: IndexMap::new(),
        };
        catalog.merge_json(DEFAULT_CATALOG_JSON);
        catalog
    }

    /// Built-in table with an optional override file merged over it.
    /// An unreadable override is logged and skipped.
    pub fn load(override_path: Option<&Path>) -> Self {
        let mut catalog = Self::builtin();
        if let Some(path) = override_path {
            match std::fs::read_to_string(path) {
                Ok(raw) => catalog.merge_json(&raw),
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    "prompt catalog override unreadable: {err}"
                ),
            }
        }
        catalog
    }

    /// Merges `{"categories": {key: template}, "styles": {key: clause}}`.
    pub fn merge_json(&mut self, raw: &str) {
        let Ok(payload) = serde_json::from_str::<Value>(raw) else {
            tracing::warn!("prompt catalog is not valid JSON; ignoring");
            return;
        };

        if let Some(categories) = payload.get("categories").and_then(Value::as_object) {
            for (key, value) in categories {
                let Ok(category) = key.parse::<Category>() else {
                    continue;
                };
                let Some(template) = value.as_str() else {
                    continue;
                };
                if !template.contains(REQUEST_PLACEHOLDER) {
                    tracing::warn!(
                        category = category.key(),
                        "template without {REQUEST_PLACEHOLDER} placeholder ignored"
                    );
                    continue;
                }
                self.templates.insert(category, template.to_string());
            }
        }

        if let Some(styles) = payload.get("styles").and_then(Value::as_object) {
            for (key, value) in styles {
                let Ok(style) = key.parse::<StyleDescriptor>() else {
                    continue;
                };
                if style.is_none() {
                    continue;
                }
                let Some(clause) = value.as_str().map(str::trim).filter(|c| !c.is_empty()) else {
                    continue;
                };
                self.clauses.insert(style, clause.to_string());
            }
        }
    }

    pub fn template(&self, category: Category) -> &str {
        self.templates
            .get(&category)
            .map(String::as_str)
            .unwrap_or(REQUEST_PLACEHOLDER)
    }

    /// `None` for the no-style sentinel and for styles without a clause.
    pub fn clause(&self, style: StyleDescriptor) -> Option<&str> {
        if style.is_none() {
            return None;
        }
        self.clauses.get(&style).map(String::as_str)
    }
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_covers_every_category_and_style() {
        let catalog = PromptCatalog::builtin();
        for category in Category::ALL {
            let template = catalog.template(category);
            assert!(template.contains(REQUEST_PLACEHOLDER), "{category}");
            assert_ne!(template, REQUEST_PLACEHOLDER, "{category}");
        }
        for style in StyleDescriptor::ALL {
            if style.is_none() {
                assert!(catalog.clause(style).is_none());
            } else {
                assert!(catalog.clause(style).is_some(), "{style}");
            }
        }
    }

    #[test]
    fn parse_keys_and_labels() {
        assert_eq!("IT".parse::<Category>(), Ok(Category::It));
        assert_eq!(" hr ".parse::<Category>(), Ok(Category::Hr));
        assert_eq!(
            "Flat Illustration".parse::<StyleDescriptor>(),
            Ok(StyleDescriptor::FlatIllustration)
        );
        assert_eq!(
            "flat-illustration".parse::<StyleDescriptor>(),
            Ok(StyleDescriptor::FlatIllustration)
        );
        assert_eq!("".parse::<StyleDescriptor>(), Ok(StyleDescriptor::None));
        assert!("legal".parse::<Category>().is_err());
    }

    #[test]
    fn override_merges_over_builtin_and_skips_invalid_rows() {
        let mut catalog = PromptCatalog::builtin();
        let original_design = catalog.template(Category::Design).to_string();
        catalog.merge_json(
            r#"{
                "categories": {
                    "general": "Draw exactly this: {request}",
                    "design": "missing placeholder",
                    "legal": "unknown {request}"
                },
                "styles": {
                    "cinematic": "Style: noir.",
                    "none": "should never apply"
                }
            }"#,
        );
        assert_eq!(
            catalog.template(Category::General),
            "Draw exactly this: {request}"
        );
        assert_eq!(catalog.template(Category::Design), original_design);
        assert_eq!(
            catalog.clause(StyleDescriptor::Cinematic),
            Some("Style: noir.")
        );
        assert_eq!(catalog.clause(StyleDescriptor::None), None);
    }

    #[test]
    fn load_reads_override_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("catalog.json");
        std::fs::write(&path, r#"{"styles": {"vintage": "Style: sepia."}}"#)?;

        let catalog = PromptCatalog::load(Some(&path));
        assert_eq!(catalog.clause(StyleDescriptor::Vintage), Some("Style: sepia."));

        let missing = PromptCatalog::load(Some(&temp.path().join("missing.json")));
        assert_eq!(missing, PromptCatalog::builtin());
        Ok(())
    }
}

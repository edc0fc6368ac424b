//! Builds the final instruction text from a request, a category and a style.

use promptcanvas_contracts::catalog::{
    Category, PromptCatalog, StyleDescriptor, REQUEST_PLACEHOLDER,
};
use promptcanvas_contracts::errors::{CanvasError, Result};
use promptcanvas_contracts::request::EnhancedPrompt;

pub const EDIT_FRAMING: &str = "Apply the following edit to the provided image and return \
                                only the edited image, with no accompanying text.";

#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    catalog: PromptCatalog,
}

impl PromptComposer {
    pub fn new(catalog: PromptCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn compose(
        &self,
        raw_instruction: &str,
        category: Category,
        style: StyleDescriptor,
    ) -> Result<EnhancedPrompt> {
        compose(&self.catalog, raw_instruction, category, style)
    }
}

/// Substitutes the trimmed instruction into the category template and, unless
/// the style is `None`, appends the style clause as its own paragraph.
pub fn compose(
    catalog: &PromptCatalog,
    raw_instruction: &str,
    category: Category,
    style: StyleDescriptor,
) -> Result<EnhancedPrompt> {
    let instruction = raw_instruction.trim();
    if instruction.is_empty() {
        return Err(CanvasError::InvalidInput(
            "enter an instruction describing the image".to_string(),
        ));
    }

    let mut text = catalog
        .template(category)
        .replacen(REQUEST_PLACEHOLDER, instruction, 1);
    if let Some(clause) = catalog.clause(style) {
        text.push_str("\n\n");
        text.push_str(clause);
    }
    Ok(EnhancedPrompt::new(text))
}

/// Wraps a prompt so image models answer with an edited image rather than prose.
pub fn frame_edit(prompt: &str) -> String {
    format!("{EDIT_FRAMING}\n\n{prompt}")
}

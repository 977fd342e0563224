//! /models and /model - list and select models

use oji_ai::ModelDescriptor;

pub struct ModelCommand;

impl ModelCommand {
    /// Resolve a /model argument against the discovered models.
    ///
    /// With nothing discovered yet any id is accepted as typed.
    pub fn resolve(query: &str, available: &[ModelDescriptor]) -> Result<String, String> {
        if available.is_empty() {
            return Ok(query.to_string());
        }
        find_model(query, available)
            .map(|m| m.id.clone())
            .ok_or_else(|| {
                format!(
                    "No model found matching '{}'\nUse /models to list available models",
                    query
                )
            })
    }

    /// List models as text
    pub fn list_models_text(current: &str, available: &[ModelDescriptor]) -> String {
        if available.is_empty() {
            return format!(
                "Current model: {}\nNo models discovered yet, run /probe to fetch them",
                current
            );
        }

        let mut output = String::from("Available models:\n");
        for model in available {
            let marker = if model.id == current { " *" } else { "" };
            match &model.owned_by {
                Some(owner) => output.push_str(&format!("  {}{} ({})\n", model.id, marker, owner)),
                None => output.push_str(&format!("  {}{}\n", model.id, marker)),
            }
        }
        output.push_str("\nSwitch with: /model <id>");
        output
    }
}

fn find_model<'a>(query: &str, models: &'a [ModelDescriptor]) -> Option<&'a ModelDescriptor> {
    let query_lower = query.to_lowercase();

    // Exact match first
    if let Some(model) = models.iter().find(|m| m.id.to_lowercase() == query_lower) {
        return Some(model);
    }

    // Partial match
    models
        .iter()
        .find(|m| m.id.to_lowercase().contains(&query_lower))
}

use std::collections::HashMap;

use crate::error::TemplateError;

/// Values bound to template placeholders
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Prompt text with named `{placeholder}` slots.
///
/// Only the placeholders declared for the template are substituted. Any other
/// brace-delimited text, such as the JSON examples embedded in the prompts, is
/// left exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
    placeholders: Vec<String>,
}

impl PromptTemplate {
    /// Fails if `text` never mentions one of `placeholders`.
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        placeholders: &[&str],
    ) -> Result<Self, TemplateError> {
        let template = Self {
            name: name.into(),
            text: text.into(),
            placeholders: placeholders.iter().map(|p| p.to_string()).collect(),
        };
        let referenced = template.referenced();
        if let Some(unused) = template
            .placeholders
            .iter()
            .find(|p| !referenced.contains(&p.as_str()))
        {
            return Err(TemplateError::UnusedPlaceholder {
                template: template.name.clone(),
                placeholder: unused.clone(),
            });
        }
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Identifiers appearing as `{identifier}` anywhere in the text
    fn referenced(&self) -> Vec<&str> {
        let mut found = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match placeholder_at(after) {
                Some(name) => {
                    found.push(name);
                    rest = &after[name.len() + 1..];
                }
                None => rest = after,
            }
        }
        found
    }

    /// Substitute every declared placeholder in a single pass. Bound values
    /// are inserted verbatim and never rescanned.
    pub fn render(&self, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match placeholder_at(after).filter(|name| self.declares(name)) {
                Some(name) => {
                    let value =
                        bindings
                            .get(name)
                            .ok_or_else(|| TemplateError::MissingBinding {
                                template: self.name.clone(),
                                placeholder: name.to_string(),
                            })?;
                    rendered.push_str(value);
                    rest = &after[name.len() + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }
        rendered.push_str(rest);
        Ok(rendered)
    }

    fn declares(&self, name: &str) -> bool {
        self.placeholders.iter().any(|p| p == name)
    }
}

/// If `text` starts with `identifier}`, return the identifier.
fn placeholder_at(text: &str) -> Option<&str> {
    let close = text.find('}')?;
    let name = &text[..close];
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_declared_placeholders_and_leaves_others() {
        let template = PromptTemplate::new(
            "triage",
            r#"Symptoms: {symptoms}
Reply as {"urgency": "..."} and keep {unrelated} as is."#,
            &["symptoms"],
        )
        .unwrap();

        let rendered = template
            .render(&Bindings::new().bind("symptoms", "chest pain"))
            .unwrap();

        assert_eq!(
            rendered,
            r#"Symptoms: chest pain
Reply as {"urgency": "..."} and keep {unrelated} as is."#
        );
    }

    #[test]
    fn missing_binding_is_an_error() {
        let template =
            PromptTemplate::new("diagnosis", "{symptoms} / {history}", &["symptoms", "history"])
                .unwrap();
        let err = template
            .render(&Bindings::new().bind("symptoms", "fever"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingBinding {
                template: "diagnosis".to_string(),
                placeholder: "history".to_string(),
            }
        );
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let template = PromptTemplate::new("critic", "Review: {diagnosis}", &["diagnosis"]).unwrap();
        let rendered = template
            .render(&Bindings::new().bind("diagnosis", "{diagnosis} {\"a\": 1}"))
            .unwrap();
        assert_eq!(rendered, "Review: {diagnosis} {\"a\": 1}");
    }

    #[test]
    fn declared_placeholder_must_appear_in_text() {
        let err = PromptTemplate::new("broken", "no slots here", &["symptoms"]).unwrap_err();
        assert!(matches!(err, TemplateError::UnusedPlaceholder { .. }));
    }
}

//! Template rendering for reply bodies and subjects

use mailflow_common::types::Event;
use regex::Regex;

/// Renders reply templates by substituting event fields into
/// `{{placeholder}}` slots. Unknown placeholders are stripped.
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            // Matches {{variable}} style placeholders
            placeholder: Regex::new(r"\{\{[^}]+\}\}").expect("static regex"),
        }
    }

    /// Render a reply body template with event data
    pub fn render(&self, template: &str, event: &Event) -> String {
        let mut result = template.to_string();

        result = result.replace("{{email}}", &event.from.to_string());
        result = result.replace("{{name}}", self.display_name(event).as_str());
        result = result.replace("{{sender_domain}}", &event.from.domain);
        result = result.replace("{{subject}}", &event.subject);

        // First/last split of the display name (simple heuristic)
        let name = self.display_name(event);
        let parts: Vec<&str> = name.split_whitespace().collect();
        let first_name = parts.first().copied().unwrap_or("");
        let last_name = if parts.len() > 1 {
            parts[1..].join(" ")
        } else {
            String::new()
        };
        result = result.replace("{{first_name}}", first_name);
        result = result.replace("{{last_name}}", &last_name);

        self.remove_unused_placeholders(&result)
    }

    /// Render the reply subject. Falls back to "Re: <event subject>" when
    /// no subject template is configured.
    pub fn render_subject(&self, subject_template: Option<&str>, event: &Event) -> String {
        match subject_template {
            Some(template) => self.render(template, event),
            None => format!("Re: {}", event.subject),
        }
    }

    /// Sender display name, falling back to the local part of the address
    fn display_name(&self, event: &Event) -> String {
        event
            .sender_name
            .clone()
            .unwrap_or_else(|| event.from.local.clone())
    }

    /// Remove unused placeholder variables
    fn remove_unused_placeholders(&self, content: &str) -> String {
        self.placeholder.replace_all(content, "").to_string()
    }
}

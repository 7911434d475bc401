//! Explanation rendering
//!
//! Templates reference event parameters with placeholders:
//! - `{i}` raw value of parameter `i` (0..=3)
//! - `{i:d}` value looked up in mapping table `d` (`0` or negative = raw)
//! - `{i|filters}` / `{i:d|filters}` value passed through a filter chain
//!
//! Rendering never fails; anything that does not resolve is left as the raw
//! value or the literal text.

pub mod filters;
pub mod mappings;

use crate::models::DecodedEvent;
use filters::{apply_filters, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Subsystems whose explanations carry an arm label
const LABELLED_SUBSYSTEMS: [char; 6] = ['1', '3', '5', '8', '9', 'A'];

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("Failed to read explanation catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse explanation catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where an event came from, derived from its code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub subsystem: char,
    pub arm: char,
}

impl RenderContext {
    pub fn from_code(code: &str) -> Option<Self> {
        let mut chars = code.chars();
        let subsystem = chars.next()?.to_ascii_uppercase();
        let arm = chars.next()?.to_ascii_uppercase();
        Some(Self { subsystem, arm })
    }

    fn prefix(&self) -> Option<String> {
        let labelled = LABELLED_SUBSYSTEMS.contains(&self.subsystem);
        (labelled && ('1'..='4').contains(&self.arm)).then(|| format!("Arm {}", self.arm))
    }
}

/// Substitute parameters into `template`
pub fn render(template: &str, params: &[i32; 4], context: Option<&RenderContext>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let body = &after[..close];
        match render_placeholder(body, params) {
            Some(text) => out.push_str(&text),
            None => {
                out.push('{');
                out.push_str(body);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    match context.and_then(RenderContext::prefix) {
        Some(prefix) if out.is_empty() => prefix,
        Some(prefix) => format!("{} {}", prefix, out),
        None => out,
    }
}

/// Render `idx(:table)?(|filters)?`; `None` when the body is not a placeholder
fn render_placeholder(body: &str, params: &[i32; 4]) -> Option<String> {
    let (head, chain) = match body.split_once('|') {
        Some((head, chain)) => (head, Some(chain)),
        None => (body, None),
    };
    let (index, table) = match head.split_once(':') {
        Some((index, table)) => (index, Some(table.parse::<i32>().ok()?)),
        None => (head, None),
    };
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Out-of-range index stays literal
    let value = index.parse::<usize>().ok().and_then(|i| params.get(i).copied())?;

    let mapped = table
        .filter(|t| *t > 0)
        .and_then(|t| mappings::lookup(t, value));
    let base = match mapped {
        Some(name) => Value::Text(name.to_string()),
        None => Value::Number(value as f64),
    };

    let rendered = match chain {
        Some(chain) => apply_filters(base, chain),
        None => base,
    };
    Some(rendered.render())
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    codes: HashMap<String, String>,
}

/// Error code → template table
#[derive(Debug, Clone, Default)]
pub struct ExplanationCatalog {
    templates: HashMap<String, String>,
}

impl ExplanationCatalog {
    /// Parse a catalog from TOML:
    ///
    /// ```toml
    /// [codes]
    /// "a01e" = "Power on"
    /// "1300510e" = "Instrument UDI {0|highByte|ascii}"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, ExplainError> {
        let file: CatalogFile = toml::from_str(content)?;
        let templates = file
            .codes
            .into_iter()
            .map(|(code, template)| (code.to_ascii_lowercase(), template))
            .collect();
        Ok(Self { templates })
    }

    pub fn load(path: &Path) -> Result<Self, ExplainError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        debug!("Loaded {} explanation templates from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template for the full code, else for its four-character suffix
    pub fn template_for(&self, code: &str) -> Option<&str> {
        let code = code.to_ascii_lowercase();
        if let Some(t) = self.templates.get(&code) {
            return Some(t);
        }
        let suffix = code.get(code.len().saturating_sub(4)..)?;
        self.templates.get(suffix).map(String::as_str)
    }

    /// Rendered explanation for `event`, if the catalog knows its code
    pub fn explain(&self, event: &DecodedEvent) -> Option<String> {
        let template = self.template_for(&event.error_code)?;
        let context = RenderContext::from_code(&event.error_code);
        Some(render(template, &event.params(), context.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_raw_placeholders() {
        assert_eq!(render("p1={0} p4={3}", &[7, 0, 0, -2], None), "p1=7 p4=-2");
    }

    #[test]
    fn test_mapped_placeholders() {
        let text = render("from {0:1} to {1:1}", &[10, 20, 0, 0], None);
        assert_eq!(text, "from Standby to Master-slave control");

        assert_eq!(render("{2:3}", &[0, 0, 5, 0], None), "monopolar curved scissors");
        // Raw and forced-raw tables
        assert_eq!(render("{0:0} {0:-1}", &[10, 0, 0, 0], None), "10 10");
        // Unknown value falls back to the raw number
        assert_eq!(render("{0:1}", &[99, 0, 0, 0], None), "99");
    }

    #[test]
    fn test_filtered_placeholders() {
        let text = render("{0|div(10)|suffix(mm)} / {1:1|prefix(state )}", &[125, 13, 0, 0], None);
        assert_eq!(text, "12.5mm / state Master follow");
    }

    #[test]
    fn test_non_placeholders_left_alone() {
        assert_eq!(render("{name} {0", &[1, 0, 0, 0], None), "{name} {0");
        assert_eq!(render("{}", &[1, 0, 0, 0], None), "{}");
        assert_eq!(render("{7}", &[1, 0, 0, 0], None), "{7}");
        assert_eq!(render("{4|zpad(3)} {0}", &[1, 0, 0, 0], None), "{4|zpad(3)} 1");
    }

    #[test]
    fn test_context_prefix() {
        let ctx = RenderContext::from_code("1200501e").unwrap();
        assert_eq!(render("tool {0}", &[1, 0, 0, 0], Some(&ctx)), "Arm 2 tool 1");

        let no_arm = RenderContext::from_code("1000501e").unwrap();
        assert_eq!(render("tool {0}", &[1, 0, 0, 0], Some(&no_arm)), "tool 1");

        let other_subsystem = RenderContext::from_code("2200501e").unwrap();
        assert_eq!(render("x", &[0; 4], Some(&other_subsystem)), "x");
    }

    #[test]
    fn test_catalog_lookup_prefers_full_code() {
        let catalog = ExplanationCatalog::from_toml_str(
            r#"
[codes]
"310e" = "State {0:1} -> {1:1}"
"100310E" = "Controller state {1:1}"
"a01e" = "Power on"
"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.template_for("100310e"), Some("Controller state {1:1}"));
        assert_eq!(catalog.template_for("200310e"), Some("State {0:1} -> {1:1}"));
        assert_eq!(catalog.template_for("ffff"), None);
    }

    #[test]
    fn test_catalog_explain_event() {
        let catalog = ExplanationCatalog::from_toml_str("[codes]\n\"a01e\" = \"Power on ({0})\"\n").unwrap();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let ev = DecodedEvent::new(ts, "a01e", [3, 0, 0, 0]);
        assert_eq!(catalog.explain(&ev).as_deref(), Some("Power on (3)"));
    }

    #[test]
    fn test_catalog_parse_error() {
        assert!(matches!(
            ExplanationCatalog::from_toml_str("[codes"),
            Err(ExplainError::Parse(_))
        ));
    }
}

//! Message template rendering
//!
//! Templates embed feature values with `{{ variable[:aggregator][:format] }}`.
//! Rendering never fails: a missing value becomes `[?]`, a value that cannot
//! be formatted becomes `[Error]`, and both add a warning.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::features::{Aggregator, FeatureSnapshot};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)(?::([a-zA-Z0-9_]+))?(?::([^}]+))?\s*\}\}")
        .expect("placeholder regex is valid")
});

pub const MISSING_MARKER: &str = "[?]";
pub const ERROR_MARKER: &str = "[Error]";

/// Problem found while filling one placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    MissingValue { placeholder: String },
    BadFormat { placeholder: String, format: String },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::MissingValue { placeholder } => {
                write!(f, "placeholder {placeholder} has no value in the feature snapshot")
            }
            RenderWarning::BadFormat { placeholder, format } => {
                write!(f, "placeholder {placeholder} uses unsupported format '{format}'")
            }
        }
    }
}

/// Rendered text plus any warnings raised on the way
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub text: String,
    pub warnings: Vec<RenderWarning>,
}

impl RenderedMessage {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Fills placeholders from a feature snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, template: &str, features: &FeatureSnapshot) -> RenderedMessage {
        if template.is_empty() {
            return RenderedMessage::default();
        }

        let mut warnings = Vec::new();
        let text = PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                let placeholder = caps[0].to_string();
                let var = &caps[1];
                let agg = caps
                    .get(2)
                    .map(|m| m.as_str())
                    .unwrap_or(Aggregator::Current.as_str());
                let format = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");

                let Some(value) = features.get(var, agg) else {
                    warnings.push(RenderWarning::MissingValue { placeholder });
                    return MISSING_MARKER.to_string();
                };

                match format_value(value, format) {
                    Some(formatted) => formatted,
                    None => {
                        tracing::debug!(%placeholder, format, "unsupported placeholder format");
                        warnings.push(RenderWarning::BadFormat {
                            placeholder,
                            format: format.to_string(),
                        });
                        ERROR_MARKER.to_string()
                    }
                }
            })
            .into_owned();

        RenderedMessage { text, warnings }
    }
}

/// Format a value with a numeric format spec; `None` for unsupported specs.
///
/// Supported: empty (plain), `d`, `.Nf`, `.Ne`, `.N%`, `,` and `,.Nf`. `d` needs a
/// value inside the `i64` range.
pub fn format_value(value: f64, format: &str) -> Option<String> {
    let format = format.to_ascii_lowercase();
    match format.as_str() {
        "" => Some(plain(value)),
        "d" => (value.abs() < i64::MAX as f64).then(|| format!("{}", value.trunc() as i64)),
        "," => Some(group_thousands(&plain(value))),
        _ => {
            if let Some(spec) = format.strip_prefix(',') {
                let digits = precision(spec, 'f')?;
                return Some(group_thousands(&format!("{value:.digits$}")));
            }
            if let Some(digits) = precision(&format, 'f') {
                return Some(format!("{value:.digits$}"));
            }
            if let Some(digits) = precision(&format, 'e') {
                return Some(scientific(value, digits));
            }
            if let Some(digits) = precision(&format, '%') {
                return Some(format!("{:.digits$}%", value * 100.0));
            }
            None
        }
    }
}

/// Parse `.N<kind>` into `N`
fn precision(spec: &str, kind: char) -> Option<usize> {
    let digits = spec.strip_prefix('.')?.strip_suffix(kind)?;
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    digits.parse().ok()
}

fn plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// `1.23e+03` style, two-digit signed exponent
fn scientific(value: f64, digits: usize) -> String {
    let raw = format!("{value:.digits$e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}

fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

use serde_json::Value;
use std::fmt::Write;

use crate::types::{TagDescriptor, value_text};

/// Attributes that may contribute a selector clause, in emission order.
pub const ALLOWED_ATTRS: [&str; 13] = [
    "id",
    "class",
    "name",
    "aria-describedby",
    "aria-label",
    "type",
    "value",
    "placeholder",
    "href",
    "src",
    "alt",
    "title",
    "role",
];

pub const DEFAULT_TAG_TYPE: &str = "input";

/// Build a CSS selector from a tag descriptor.
///
/// Clauses follow `ALLOWED_ATTRS` order, not the descriptor's. Array values
/// are joined with a single space. Quotes inside values are not escaped.
pub fn build_selector(tag: &TagDescriptor) -> String {
    let mut selector = tag
        .tag_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TAG_TYPE)
        .to_string();

    for attr in ALLOWED_ATTRS {
        let text = match tag.attrs.get(attr) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
            Some(other) => value_text(other),
        };
        let _ = write!(selector, "[{}=\"{}\"]", attr, text);
    }

    selector
}

//! Structural round-trip comparison
//!
//! Siblings are grouped by element name and paired by position within each
//! group. An empty element carrying `null="true"` is a NULL, whatever text
//! it holds. Whitespace-only text in elements that also have children is
//! layout and is ignored.

use crate::core::encoding::{decode, detect};
use crate::core::verification::report::{ComparisonReport, ValueDiff};
use crate::domain::document::{parse_document, XmlElement};
use crate::domain::row::NULL_MARKER;
use crate::domain::Result;
use indexmap::IndexMap;
use std::time::Instant;

/// Compares two parsed documents
pub fn compare(original: &XmlElement, regenerated: &XmlElement) -> ComparisonReport {
    let start = Instant::now();
    let mut report = ComparisonReport::new();

    if original.name != regenerated.name {
        report.missing.push(original.name.clone());
        report.extra.push(regenerated.name.clone());
    } else {
        compare_element(&original.name, original, regenerated, &mut report);
    }

    report.set_duration(start.elapsed().as_millis() as u64);
    tracing::debug!(
        elements = report.elements_compared,
        missing = report.missing.len(),
        extra = report.extra.len(),
        value_diffs = report.value_diffs.len(),
        textual_diffs = report.textual_diffs.len(),
        "Documents compared"
    );
    report
}

/// Decodes, parses and compares two serialized documents
///
/// # Errors
///
/// Returns a parse error if either document cannot be decoded or parsed.
pub fn compare_documents(original: &[u8], regenerated: &[u8]) -> Result<ComparisonReport> {
    let original = parse_document(&decode(original, &detect(original))?)?;
    let regenerated = parse_document(&decode(regenerated, &detect(regenerated))?)?;
    Ok(compare(&original, &regenerated))
}

/// Semantic value of a leaf; `None` is NULL
fn leaf_value(element: &XmlElement) -> Option<&str> {
    if element.is_null() {
        None
    } else {
        Some(element.text_or_empty())
    }
}

/// Meaningful text of an element with children
fn mixed_text(element: &XmlElement) -> Option<&str> {
    element.text.as_deref().filter(|t| !t.trim().is_empty())
}

fn compare_values(path: String, a: Option<&str>, b: Option<&str>, report: &mut ComparisonReport) {
    if a == b {
        return;
    }
    let diff = ValueDiff {
        path,
        original: a.map(str::to_string),
        regenerated: b.map(str::to_string),
    };
    match (a, b) {
        (Some(x), Some(y)) if x.trim() == y.trim() => report.textual_diffs.push(diff),
        _ => report.value_diffs.push(diff),
    }
}

fn compare_element(path: &str, a: &XmlElement, b: &XmlElement, report: &mut ComparisonReport) {
    report.elements_compared += 1;

    for (name, value) in a.attributes.iter().filter(|(n, _)| n != NULL_MARKER) {
        let attr_path = format!("{path}/@{name}");
        match b.attribute(name) {
            Some(other) => compare_values(attr_path, Some(value.as_str()), Some(other), report),
            None => report.missing.push(attr_path),
        }
    }
    for (name, _) in b.attributes.iter().filter(|(n, _)| n != NULL_MARKER) {
        if a.attribute(name).is_none() {
            report.extra.push(format!("{path}/@{name}"));
        }
    }

    if a.is_leaf() && b.is_leaf() {
        compare_values(path.to_string(), leaf_value(a), leaf_value(b), report);
        return;
    }
    if a.is_null() != b.is_null() {
        compare_values(
            path.to_string(),
            leaf_value(a).map(|_| ""),
            leaf_value(b).map(|_| ""),
            report,
        );
    }
    compare_values(path.to_string(), mixed_text(a), mixed_text(b), report);

    let mut groups: IndexMap<&str, (Vec<&XmlElement>, Vec<&XmlElement>)> = IndexMap::new();
    for child in &a.children {
        groups.entry(child.name.as_str()).or_default().0.push(child);
    }
    for child in &b.children {
        groups.entry(child.name.as_str()).or_default().1.push(child);
    }

    for (name, (left, right)) in groups {
        let repeated = left.len().max(right.len()) > 1;
        for i in 0..left.len().max(right.len()) {
            let child_path = if repeated {
                format!("{path}/{name}[{}]", i + 1)
            } else {
                format!("{path}/{name}")
            };
            match (left.get(i), right.get(i)) {
                (Some(x), Some(y)) => compare_element(&child_path, x, y, report),
                (Some(_), None) => report.missing.push(child_path),
                (None, Some(_)) => report.extra.push(child_path),
                (None, None) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::{encode_document, Charset};

    fn parse(xml: &str) -> XmlElement {
        parse_document(xml).unwrap()
    }

    #[test]
    fn test_identical_documents_match() {
        let xml = r#"<items><item id="1"><name>sword</name><tags><tag>a</tag><tag>b</tag></tags></item></items>"#;
        let report = compare(&parse(xml), &parse(xml));
        assert!(report.matched());
        assert!(report.textual_diffs.is_empty());
        assert_eq!(report.elements_compared, 6);
    }

    #[test]
    fn test_layout_whitespace_ignored() {
        let compact = "<items><item><name>a</name></item></items>";
        let indented = "<items>\n  <item>\n    <name>a</name>\n  </item>\n</items>";
        assert!(compare(&parse(compact), &parse(indented)).matched());
    }

    #[test]
    fn test_null_marker_authoritative() {
        let original = r#"<items><item><price null="true"> </price></item></items>"#;
        let regenerated = r#"<items><item><price null="true"/></item></items>"#;
        assert!(compare(&parse(original), &parse(regenerated)).matched());

        let empty = "<items><item><price></price></item></items>";
        let report = compare(&parse(regenerated), &parse(empty));
        assert_eq!(report.value_diffs.len(), 1);
        assert_eq!(report.value_diffs[0].original, None);
        assert_eq!(report.value_diffs[0].regenerated.as_deref(), Some(""));
    }

    #[test]
    fn test_missing_extra_and_values() {
        let original = r#"<items><item id="1"><name>a</name><tag>x</tag><tag>y</tag></item></items>"#;
        let regenerated = r#"<items><item id="2" kind="k"><name> a </name><tag>x</tag><level>3</level></item></items>"#;
        let report = compare(&parse(original), &parse(regenerated));
        assert_eq!(report.missing, vec!["items/item/tag[2]"]);
        assert_eq!(report.extra, vec!["items/item/@kind", "items/item/level"]);
        assert_eq!(report.value_diffs.len(), 1);
        assert_eq!(report.value_diffs[0].path, "items/item/@id");
        assert_eq!(report.textual_diffs[0].path, "items/item/name");
        assert!(!report.matched());
    }

    #[test]
    fn test_positional_pairing_within_name_groups() {
        // interleaving with other names doesn't shift pairing
        let original = "<r><a>1</a><b>x</b><a>2</a></r>";
        let regenerated = "<r><a>1</a><a>2</a><b>x</b></r>";
        assert!(compare(&parse(original), &parse(regenerated)).matched());
    }

    #[test]
    fn test_compare_documents_across_encodings() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n<items><item>\u{00e9}</item></items>";
        let utf16 = encode_document(xml, Charset::Utf16Le, true).unwrap();
        let utf8 = xml.replace("UTF-16", "UTF-8");
        let report = compare_documents(&utf16, utf8.as_bytes()).unwrap();
        assert!(report.matched());
    }
}

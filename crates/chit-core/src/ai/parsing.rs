//! JSON extraction from model replies
//!
//! The audit prompt asks for free-text reasoning followed by a fenced JSON
//! block, but models drift: fences go missing, prose trails the JSON, extra
//! fence markers appear. Extraction is lenient about placement and strict
//! about content: a truncated or invalid candidate is reported, never
//! repaired.

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// Fenced ```json block holding an object; lazy so the first block wins,
/// (?s) so the object may span lines.
const FENCED_JSON: &str = r"(?s)```json\s*(\{.*?\})\s*```";

/// A model reply split into its JSON object and the prose around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// The parsed JSON object.
    pub json: Value,
    /// Everything outside the JSON candidate, fence markers stripped, trimmed.
    pub scratchpad: String,
}

/// Pull the embedded JSON object and surrounding scratchpad out of a reply.
///
/// Search order, first hit wins:
/// 1. an explicitly fenced ```json block containing a `{...}` object
/// 2. the widest window from the first `{` to the last `}`
///
/// Fails with [`Error::NoJsonFound`] when neither locates a candidate and
/// [`Error::MalformedJson`] when the candidate does not parse.
pub fn extract(raw: &str) -> Result<Extraction> {
    let span = candidate_span(raw)?;
    let candidate = &raw[span.clone()];

    let json: Value = serde_json::from_str(candidate).map_err(|e| Error::MalformedJson {
        reason: e.to_string(),
        raw: raw.to_string(),
    })?;

    let mut rest = String::with_capacity(raw.len() - candidate.len());
    rest.push_str(&raw[..span.start]);
    rest.push_str(&raw[span.end..]);
    let scratchpad = rest
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    Ok(Extraction { json, scratchpad })
}

/// Byte range of the JSON candidate within `raw`.
fn candidate_span(raw: &str) -> Result<std::ops::Range<usize>> {
    if let Some(caps) = Regex::new(FENCED_JSON)?.captures(raw) {
        if let Some(inner) = caps.get(1) {
            return Ok(inner.range());
        }
    }

    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(start..end + 1),
        _ => Err(Error::NoJsonFound(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced() {
        let raw = "Checking totals.\n```json\n{\"verdict\": \"clean\"}\n```";
        let result = extract(raw).unwrap();
        assert_eq!(result.json["verdict"], "clean");
        assert_eq!(result.scratchpad, "Checking totals.");
    }

    #[test]
    fn test_extract_fenced_with_trailing_prose() {
        let raw = "Some reasoning ```json\n{\"extracted_data\":{\"merchant_name\":\"ACME\",\"amount\":\"12.34\"},\"validation_result\":{\"reasoning\":\"ok\",\"conclusion\":\"No\"}}\n``` more text";
        let result = extract(raw).unwrap();
        assert_eq!(result.json["extracted_data"]["merchant_name"], "ACME");
        assert_eq!(result.json["extracted_data"]["amount"], "12.34");
        assert!(result.scratchpad.contains("Some reasoning"));
        assert!(result.scratchpad.contains("more text"));
        assert!(!result.scratchpad.contains('{'));
        assert!(!result.scratchpad.contains('}'));
    }

    #[test]
    fn test_extract_fenced_nested_objects() {
        let raw = r#"```json
{"outer": {"inner": {"deep": 1}}, "tail": "yes"}
```"#;
        let result = extract(raw).unwrap();
        assert_eq!(result.json["outer"]["inner"]["deep"], 1);
        assert_eq!(result.json["tail"], "yes");
        assert!(result.scratchpad.is_empty());
    }

    #[test]
    fn test_extract_first_fenced_block_wins() {
        let raw = "```json\n{\"pick\": 1}\n```\nmiddle\n```json\n{\"pick\": 2}\n```";
        let result = extract(raw).unwrap();
        assert_eq!(result.json["pick"], 1);
        // The second block loses its fences but its text survives as prose
        assert!(result.scratchpad.contains("middle"));
    }

    #[test]
    fn test_extract_unfenced() {
        let raw = r#"Here is the result:
{"merchant_name": "Trader Joe's", "amount": "45.60"}
That's it!"#;
        let result = extract(raw).unwrap();
        assert_eq!(result.json["merchant_name"], "Trader Joe's");
        assert!(result.scratchpad.contains("Here is the result:"));
        assert!(result.scratchpad.contains("That's it!"));
    }

    #[test]
    fn test_extract_unfenced_multiline() {
        let raw = "{\n  \"a\": 1,\n  \"b\": {\n    \"c\": 2\n  }\n}";
        let result = extract(raw).unwrap();
        assert_eq!(result.json["b"]["c"], 2);
        assert!(result.scratchpad.is_empty());
    }

    #[test]
    fn test_extract_no_braces() {
        let raw = "The model refused to answer in JSON.";
        match extract(raw) {
            Err(Error::NoJsonFound(text)) => assert_eq!(text, raw),
            other => panic!("expected NoJsonFound, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_open_brace_only() {
        let raw = "starts an object { but never closes it";
        assert!(matches!(extract(raw), Err(Error::NoJsonFound(_))));
    }

    #[test]
    fn test_extract_braces_in_wrong_order() {
        let raw = "} backwards {";
        assert!(matches!(extract(raw), Err(Error::NoJsonFound(_))));
    }

    #[test]
    fn test_extract_malformed_candidate() {
        let raw = "reasoning {\"amount\": 12.34,} trailing";
        match extract(raw) {
            Err(Error::MalformedJson { raw: r, .. }) => assert_eq!(r, raw),
            other => panic!("expected MalformedJson, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_truncated_json_not_repaired() {
        // A cut-off reply: first { to last } spans an incomplete object
        let raw = "{\"extracted_data\": {\"merchant_name\": \"ACME\"";
        assert!(matches!(extract(raw), Err(Error::NoJsonFound(_))));

        let raw = "{\"extracted_data\": {\"merchant_name\": \"ACME\"}";
        assert!(matches!(extract(raw), Err(Error::MalformedJson { .. })));
    }

    #[test]
    fn test_extract_strips_stray_fences() {
        let raw = "intro ``` {\"ok\": true} ``` outro";
        let result = extract(raw).unwrap();
        assert_eq!(result.json["ok"], true);
        assert!(!result.scratchpad.contains("```"));
        assert!(result.scratchpad.contains("intro"));
        assert!(result.scratchpad.contains("outro"));
    }

    #[test]
    fn test_extract_bare_object_empty_scratchpad() {
        let result = extract(r#"{"only": "json"}"#).unwrap();
        assert_eq!(result.json["only"], "json");
        assert_eq!(result.scratchpad, "");
    }
}

use crate::error::DecodeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Shape checks applied after a reply deserializes.
///
/// Serde only proves the JSON has the right fields; implementors reject values
/// that are well-typed but unusable (wrong counts, dangling references).
pub trait ReplyShape {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Type of a JSON node found by the structure scanner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    Object,
    Array,
}

/// Coordinates of a JSON structure within a larger text, including nested children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjCoords {
    pub start: usize,
    pub end: usize, // inclusive index of the closing bracket/brace
    pub kind: NodeType,
    pub children: Vec<ObjCoords>,
}

impl ObjCoords {
    pub fn new(start: usize, end: usize, kind: NodeType, children: Vec<ObjCoords>) -> Self {
        Self { start, end, kind, children }
    }

    fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end + 1]
    }
}

#[derive(Debug)]
struct Frame {
    start: usize,
    kind: NodeType,
    children: Vec<ObjCoords>,
}

/// Find all JSON object/array structures in the given text. Coordinates are byte indices.
///
/// Models routinely wrap JSON in prose or markdown fences; this scan lets callers
/// pick the structures out without caring about the surrounding text.
#[instrument(target = "book_quiz::json", skip(text))]
pub fn find_json_structures(text: &str) -> Vec<ObjCoords> {
    let bytes = text.as_bytes();
    let mut results: Vec<ObjCoords> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match b {
                b'\\' => escape = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let closing = match b {
            b'"' => {
                in_string = true;
                None
            }
            b'{' => {
                stack.push(Frame { start: i, kind: NodeType::Object, children: Vec::new() });
                None
            }
            b'[' => {
                stack.push(Frame { start: i, kind: NodeType::Array, children: Vec::new() });
                None
            }
            b'}' => Some(NodeType::Object),
            b']' => Some(NodeType::Array),
            _ => None,
        };

        let Some(kind) = closing else { continue };
        match stack.pop() {
            Some(frame) if frame.kind == kind => {
                let node = ObjCoords::new(frame.start, i, kind, frame.children);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => results.push(node),
                }
            }
            // Unbalanced: drop the frame and keep scanning.
            _ => {}
        }
    }

    debug!(target = "book_quiz::json", count = results.len(), "found root structures");
    results
}

/// Extract all occurrences of `T` from a response string.
///
/// Strategy (in order):
/// - If the entire string parses as `Vec<T>`, return it.
/// - Otherwise, scan for JSON structures. Each node is tried as `Vec<T>`, then as
///   `T`; nodes that match neither are descended into.
pub fn extract_all<T: DeserializeOwned>(text: &str) -> Vec<T> {
    collect_all(text).0
}

fn collect_all<T: DeserializeOwned>(text: &str) -> (Vec<T>, bool, Vec<ObjCoords>) {
    if let Ok(v) = serde_json::from_str::<Vec<T>>(text.trim()) {
        return (v, true, Vec::new());
    }

    fn collect_from_node<T: DeserializeOwned>(text: &str, node: &ObjCoords, out: &mut Vec<T>) -> bool {
        let s = node.slice(text);
        if let Ok(vs) = serde_json::from_str::<Vec<T>>(s) {
            out.extend(vs);
            return true;
        }
        if let Ok(v) = serde_json::from_str::<T>(s) {
            out.push(v);
            return true;
        }
        let mut consumed = false;
        for child in &node.children {
            consumed |= collect_from_node::<T>(text, child, out);
        }
        consumed
    }

    let mut out: Vec<T> = Vec::new();
    let mut consumed = false;
    let roots = find_json_structures(text);
    for node in &roots {
        consumed |= collect_from_node::<T>(text, node, &mut out);
    }
    (out, consumed, roots)
}

/// Decode every `T` in a reply. Fails when the reply holds no JSON at all, or
/// holds JSON of which nothing matches `T`.
pub fn decode_all<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, DecodeError> {
    let (items, consumed, roots) = collect_all::<T>(raw);
    if consumed {
        return Ok(items);
    }
    match roots.first() {
        None => Err(DecodeError::NoJson { raw: raw.to_string() }),
        Some(node) => {
            let source = match serde_json::from_str::<Vec<T>>(node.slice(raw)) {
                Err(e) => e,
                Ok(_) => serde::de::Error::custom("no element matched the expected type"),
            };
            Err(DecodeError::Shape { source, raw: raw.to_string() })
        }
    }
}

/// Decode the first structure in a reply that deserializes as `T` and passes
/// `T::check`. Nodes are tried parent-first so an envelope wins over its fields.
pub fn decode_reply<T: DeserializeOwned + ReplyShape>(raw: &str) -> Result<T, DecodeError> {
    let mut first_error: Option<serde_json::Error> = None;
    let mut rejection: Option<String> = None;

    let mut attempt = |candidate: &str| -> Option<T> {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => match value.check() {
                Ok(()) => Some(value),
                Err(reason) => {
                    rejection.get_or_insert(reason);
                    None
                }
            },
            Err(e) => {
                first_error.get_or_insert(e);
                None
            }
        }
    };

    if let Some(value) = attempt(raw.trim()) {
        return Ok(value);
    }

    fn walk<T>(text: &str, node: &ObjCoords, attempt: &mut dyn FnMut(&str) -> Option<T>) -> Option<T> {
        if let Some(value) = attempt(node.slice(text)) {
            return Some(value);
        }
        node.children.iter().find_map(|child| walk(text, child, attempt))
    }

    let roots = find_json_structures(raw);
    for node in &roots {
        if let Some(value) = walk(raw, node, &mut attempt) {
            return Ok(value);
        }
    }

    let raw = raw.to_string();
    if let Some(reason) = rejection {
        return Err(DecodeError::Invalid { reason, raw });
    }
    match (roots.is_empty(), first_error) {
        (false, Some(source)) => Err(DecodeError::Shape { source, raw }),
        _ => Err(DecodeError::NoJson { raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        a: u8,
        b: u8,
    }

    impl ReplyShape for Pair {
        fn check(&self) -> Result<(), String> {
            if self.a < self.b {
                Ok(())
            } else {
                Err(format!("{} is not below {}", self.a, self.b))
            }
        }
    }

    #[test]
    fn finds_nested_structures() {
        let roots = find_json_structures(r#"x {"a":[1,{"b":2}]} y [3]"#);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].kind, NodeType::Object);
        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].children.len(), 1);
        assert_eq!(roots[1].kind, NodeType::Array);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let roots = find_json_structures(r#"{"text":"a } b { c"}"#);
        assert_eq!(roots.len(), 1);
        assert!(roots[0].children.is_empty());
    }

    #[test]
    fn decode_reply_skips_structures_failing_checks() {
        let raw = r#"first {"a":5,"b":1} then {"a":1,"b":5}"#;
        assert_eq!(decode_reply::<Pair>(raw).unwrap(), Pair { a: 1, b: 5 });
    }

    #[test]
    fn decode_reply_names_the_failure() {
        assert!(matches!(decode_reply::<Pair>("no json here"), Err(DecodeError::NoJson { .. })));
        assert!(matches!(decode_reply::<Pair>(r#"{"a":"x"}"#), Err(DecodeError::Shape { .. })));
        assert!(matches!(decode_reply::<Pair>(r#"{"a":9,"b":2}"#), Err(DecodeError::Invalid { .. })));
    }

    #[test]
    fn decode_all_accepts_empty_array() {
        let items: Vec<Pair> = decode_all("nothing to grade: []").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn decode_all_rejects_unrelated_json() {
        assert!(matches!(decode_all::<Pair>(r#"{"c":1}"#), Err(DecodeError::Shape { .. })));
        assert!(matches!(decode_all::<Pair>("plain"), Err(DecodeError::NoJson { .. })));
    }
}

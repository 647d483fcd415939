//! Agent response decoding with free-text fallbacks
//!
//! Agents often wrap their JSON in prose or a fenced block. Decoding tries,
//! in order: the whole text, each fenced block, then balanced `{...}`
//! regions found by depth scanning. The first candidate that is a JSON object
//! carrying an `action` key wins, and its decode errors are final.

use serde_json::Value;
use tracing::debug;

use super::{Action, AgentResponse, ProtocolError};

/// Decode a raw agent reply into an [`AgentResponse`]
pub fn parse_response(raw: &str) -> Result<AgentResponse, ProtocolError> {
    debug!(raw_len = raw.len(), "parse_response: called");
    let mut saw_object = false;

    for candidate in candidates(raw) {
        let value: Value = match serde_json::from_str(candidate) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let Some(obj) = value.as_object() else {
            continue;
        };
        saw_object = true;
        if !obj.contains_key("action") {
            debug!("parse_response: object without action key, trying next candidate");
            continue;
        }
        debug!(candidate_len = candidate.len(), "parse_response: decoding candidate");
        return decode_value(value);
    }

    if saw_object {
        debug!("parse_response: objects found but none carried an action");
        return Err(ProtocolError::Malformed {
            reason: "payload has no 'action' field".to_string(),
        });
    }
    debug!("parse_response: no payload recovered");
    Err(ProtocolError::NoPayload)
}

/// Decode an already-parsed JSON value
pub fn decode_value(value: Value) -> Result<AgentResponse, ProtocolError> {
    debug!("decode_value: called");
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed {
            reason: "'action' must be a string".to_string(),
        })?;
    let action: Action = action.parse()?;

    // Check sub-action tags up front so an unknown tag is reported as such
    // rather than as a generic deserialization failure.
    if action == Action::Parallel
        && let Some(actions) = value
            .get("action_params")
            .and_then(|p| p.get("actions"))
            .and_then(Value::as_array)
    {
        for sub in actions {
            match sub.get("type").and_then(Value::as_str) {
                Some(tag) => {
                    tag.parse::<Action>()?;
                }
                None => {
                    return Err(ProtocolError::Malformed {
                        reason: "sub-action is missing 'type'".to_string(),
                    });
                }
            }
        }
    }

    let response: AgentResponse = serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
        reason: e.to_string(),
    })?;
    response.validate()?;
    debug!(action = %response.action, "decode_value: decoded");
    Ok(response)
}

/// Candidate payload slices in priority order
///
/// Each fallback scan runs only once the earlier candidates are used up, so a
/// reply that parses whole is never brace-scanned.
fn candidates(raw: &str) -> impl Iterator<Item = &str> {
    std::iter::once(raw.trim())
        .chain(std::iter::once_with(move || fenced_blocks(raw)).flatten())
        .chain(std::iter::once_with(move || balanced_regions(raw)).flatten())
}

/// Contents of every ``` fenced block, language tag stripped
pub fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string (e.g. `json`) up to the end of the line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].trim());
                rest = &body[close + 3..];
            }
            None => break,
        }
    }

    debug!(count = blocks.len(), "fenced_blocks: found");
    blocks
}

/// Balanced `{...}` regions, scanned left to right
///
/// Depth counting ignores braces inside JSON string literals. A region that
/// closes is yielded; scanning resumes at the next `{` after its opening brace
/// so a bad outer region does not hide a good inner one.
pub fn balanced_regions(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut regions = Vec::new();
    let mut start = 0;

    while let Some(offset) = raw[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            regions.push(&raw[open..=close]);
        }
        start = open + 1;
    }

    regions
}

/// Index of the brace closing the one at `open`, if the region is balanced
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_direct_json() {
        let raw = r#"{"action": "run_command", "action_params": {"command": "cargo test"}}"#;
        let response = parse_response(raw).unwrap();

        assert_eq!(response.action, Action::RunCommand);
        assert_eq!(response.params().command.as_deref(), Some("cargo test"));
    }

    #[test]
    fn test_parse_fenced_block_inside_prose() {
        let raw = "I'll read the config first.\n\n```json\n{\"action\": \"read_files\", \"action_params\": {\"paths\": [\"Cargo.toml\"]}}\n```\n\nThen I'll continue.";
        let response = parse_response(raw).unwrap();

        assert_eq!(response.action, Action::ReadFiles);
        assert_eq!(response.params().paths, vec!["Cargo.toml"]);
    }

    #[test]
    fn test_parse_bare_fence_without_language() {
        let raw = "Plan ready:\n```\n{\"action\": \"done\", \"message\": \"the plan\"}\n```";
        let response = parse_response(raw).unwrap();

        assert_eq!(response.action, Action::Done);
        assert_eq!(response.message.as_deref(), Some("the plan"));
    }

    #[test]
    fn test_parse_balanced_region_with_nested_braces() {
        let raw = r#"Sure. {"action": "write_file", "action_params": {"path": "src/lib.rs", "content": "fn main() { println!(\"}\"); }"}} trailing {"#;
        let response = parse_response(raw).unwrap();

        assert_eq!(response.action, Action::WriteFile);
        assert_eq!(
            response.params().content.as_deref(),
            Some("fn main() { println!(\"}\"); }")
        );
    }

    #[test]
    fn test_parse_skips_non_action_objects() {
        let raw = r#"Example config: {"name": "demo"} and my reply: {"action": "done"}"#;
        let response = parse_response(raw).unwrap();
        assert_eq!(response.action, Action::Done);
    }

    #[test]
    fn test_parse_no_payload() {
        let err = parse_response("I am thinking about it, no JSON here.").unwrap_err();
        assert_eq!(err, ProtocolError::NoPayload);
    }

    #[test]
    fn test_parse_object_without_action_is_malformed() {
        let err = parse_response(r#"{"thinking": "hmm"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn test_parse_unknown_action() {
        let err = parse_response(r#"{"action": "format_disk"}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownAction {
                action: "format_disk".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unknown_sub_action() {
        let raw = r#"{"action": "parallel", "action_params": {"actions": [{"type": "teleport", "params": {}}]}}"#;
        let err = parse_response(raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownAction {
                action: "teleport".to_string()
            }
        );
    }

    #[test]
    fn test_parse_nested_parallel_rejected() {
        let raw = r#"{"action": "parallel", "action_params": {"actions": [{"type": "parallel", "params": {"actions": []}}]}}"#;
        assert_eq!(parse_response(raw).unwrap_err(), ProtocolError::NestedParallel);
    }

    #[test]
    fn test_parse_parallel_batch() {
        let raw = r#"{
            "thinking": "read both then build",
            "action": "parallel",
            "action_params": {"actions": [
                {"type": "read_files", "params": {"paths": ["a.txt"]}},
                {"type": "run_command", "params": {"command": "make"}}
            ]},
            "state": {"step": 2}
        }"#;
        let response = parse_response(raw).unwrap();

        let batch = response.sub_actions();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, Action::ReadFiles);
        assert_eq!(batch[1].kind, Action::RunCommand);
        assert_eq!(response.thinking.as_deref(), Some("read both then build"));
    }

    #[test]
    fn test_parse_direct_json_with_brace_heavy_content() {
        let content = "{".repeat(200_000);
        let raw = serde_json::json!({
            "action": "write_file",
            "action_params": {"path": "big.txt", "content": content},
        })
        .to_string();

        let start = std::time::Instant::now();
        let response = parse_response(&raw).unwrap();

        assert_eq!(response.action, Action::WriteFile);
        assert!(start.elapsed() < std::time::Duration::from_secs(2), "took {:?}", start.elapsed());
    }

    #[test]
    fn test_fenced_blocks_unterminated_ignored() {
        assert!(fenced_blocks("```json\n{\"a\": 1}").is_empty());
    }

    proptest! {
        #[test]
        fn prop_balanced_region_recovers_embedded_payload(prefix in "[a-zA-Z .,]{0,40}", suffix in "[a-zA-Z .,]{0,40}", msg in "[a-zA-Z{} ]{0,20}") {
            let payload = serde_json::json!({"action": "done", "message": msg}).to_string();
            let raw = format!("{prefix}{payload}{suffix}");
            let response = parse_response(&raw).unwrap();
            prop_assert_eq!(response.action, Action::Done);
            prop_assert_eq!(response.message, Some(msg));
        }
    }
}

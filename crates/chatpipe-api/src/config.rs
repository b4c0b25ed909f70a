// Tool policy configuration from environment variables
//
// The sanitization allowlist and exclusion set are an explicit per-tool-name
// table with a pass-through default. Environment format:
//
//   CHATPIPE_EXCLUDED_TOOLS="renderCanvas,previewWidget"
//   CHATPIPE_TOOL_INPUT_ALLOWLIST="createPersona:displayName;search:query|limit"

use chatpipe_core::ToolPolicies;

/// Build the tool policy table from environment variables.
///
/// Unset variables yield the pass-through default: every tool materializes
/// a part and its input is persisted unmodified.
pub fn tool_policies_from_env() -> ToolPolicies {
    parse_tool_policies(
        std::env::var("CHATPIPE_EXCLUDED_TOOLS").ok().as_deref(),
        std::env::var("CHATPIPE_TOOL_INPUT_ALLOWLIST")
            .ok()
            .as_deref(),
    )
}

fn parse_tool_policies(excluded: Option<&str>, allowlists: Option<&str>) -> ToolPolicies {
    let mut builder = ToolPolicies::builder();

    if let Some(excluded) = excluded {
        for tool in excluded.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            builder = builder.exclude(tool);
        }
    }

    if let Some(allowlists) = allowlists {
        for entry in allowlists.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((tool, fields)) = entry.split_once(':') else {
                tracing::warn!(entry, "Ignoring malformed tool allowlist entry");
                continue;
            };
            let fields: Vec<&str> = fields
                .split('|')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            if tool.trim().is_empty() || fields.is_empty() {
                tracing::warn!(entry, "Ignoring malformed tool allowlist entry");
                continue;
            }
            builder = builder.allow_input_fields(tool.trim(), fields);
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_env_is_pass_through() {
        let policies = parse_tool_policies(None, None);
        assert!(!policies.is_excluded("anything"));
        assert_eq!(
            policies.sanitize_input("anything", json!({"a": 1})),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_excluded_tools_parsed() {
        let policies = parse_tool_policies(Some("renderCanvas, previewWidget"), None);
        assert!(policies.is_excluded("renderCanvas"));
        assert!(policies.is_excluded("previewWidget"));
        assert!(!policies.is_excluded("search"));
    }

    #[test]
    fn test_allowlist_parsed() {
        let policies =
            parse_tool_policies(None, Some("createPersona:displayName;search:query|limit"));
        assert_eq!(
            policies.sanitize_input(
                "createPersona",
                json!({"displayName": "Ada", "backstory": "secret"})
            ),
            json!({"displayName": "Ada"})
        );
        assert_eq!(
            policies.sanitize_input("search", json!({"query": "x", "limit": 5, "debug": true})),
            json!({"query": "x", "limit": 5})
        );
    }

    #[test]
    fn test_malformed_entries_ignored() {
        let policies = parse_tool_policies(None, Some("nofields;:orphan;ok:field"));
        assert_eq!(
            policies.sanitize_input("ok", json!({"field": 1, "extra": 2})),
            json!({"field": 1})
        );
        assert_eq!(
            policies.sanitize_input("nofields", json!({"x": 1})),
            json!({"x": 1})
        );
    }
}

// Per-tool-name rendering and persistence policy
//
// Some tool inputs carry fields that must not reach the client or the
// durable record (privacy-sensitive payloads), and some tools are fully
// redundant with an accompanying data-* channel and should not materialize
// a part at all. Both are expressed here as an explicit table keyed by
// tool name. The default for unlisted tools is pass-through.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Policy for one tool name
#[derive(Debug, Clone, Default)]
struct ToolRule {
    /// Retain only these input fields. None = pass input through unchanged.
    input_allowlist: Option<Vec<String>>,
    /// Never materialize a part for this tool.
    excluded: bool,
}

/// Tool-name-keyed policy table
#[derive(Debug, Clone, Default)]
pub struct ToolPolicies {
    rules: HashMap<String, ToolRule>,
}

impl ToolPolicies {
    /// Empty table: every tool passes through unchanged
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ToolPoliciesBuilder {
        ToolPoliciesBuilder {
            policies: Self::new(),
        }
    }

    /// Whether parts for this tool are suppressed entirely
    pub fn is_excluded(&self, tool_name: &str) -> bool {
        self.rules.get(tool_name).is_some_and(|r| r.excluded)
    }

    /// Apply the input allowlist for this tool, if one is registered.
    ///
    /// Non-object inputs pass through untouched; an allowlist only makes
    /// sense against object payloads.
    pub fn sanitize_input(&self, tool_name: &str, input: Value) -> Value {
        let Some(allowlist) = self
            .rules
            .get(tool_name)
            .and_then(|r| r.input_allowlist.as_ref())
        else {
            return input;
        };
        let Value::Object(fields) = input else {
            return input;
        };

        let kept: Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| allowlist.iter().any(|allowed| allowed == key))
            .collect();
        Value::Object(kept)
    }
}

/// Builder for [`ToolPolicies`]
pub struct ToolPoliciesBuilder {
    policies: ToolPolicies,
}

impl ToolPoliciesBuilder {
    /// Retain only the named input fields for this tool
    pub fn allow_input_fields(
        mut self,
        tool_name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let rule = self.policies.rules.entry(tool_name.into()).or_default();
        rule.input_allowlist = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Suppress part materialization for this tool; its effects surface
    /// only through the accompanying data-* events
    pub fn exclude(mut self, tool_name: impl Into<String>) -> Self {
        self.policies.rules.entry(tool_name.into()).or_default().excluded = true;
        self
    }

    pub fn build(self) -> ToolPolicies {
        self.policies
    }
}

// ============================================
// Tests
// ============================================

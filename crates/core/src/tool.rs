//! Tool trait: the abstraction over agent capabilities.
//!
//! Three tools exist: area resolution, point-of-interest discovery, and
//! listing filtering. All of them are held in a [`ToolSet`] built once at
//! startup; each turn derives a [`ToolRegistry`] from it for its [`Phase`].

use crate::error::ToolError;
use crate::message::ToolCallRecord;
use crate::provider::ToolDefinition;
use crate::turn::{Phase, TurnContext};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The model-facing name of every tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ResolveArea,
    DiscoverInterests,
    FilterListings,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [Self::ResolveArea, Self::DiscoverInterests, Self::FilterListings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveArea => "resolve_area",
            Self::DiscoverInterests => "discover_interests",
            Self::FilterListings => "filter_listings",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a tool hands back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text fed back to the model as the tool result
    pub text: String,

    /// Optional structured data for callers other than the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    /// Pretty-printed JSON as the text, with the value kept as data.
    pub fn json(value: serde_json::Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self {
            text,
            data: Some(value),
        }
    }
}

/// Deserialize tool arguments into a typed struct.
pub fn parse_arguments<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolName;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool for the given turn.
    async fn execute(
        &self,
        ctx: &TurnContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError>;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Every tool the process knows about, built once at startup.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Replaces any existing tool of the same kind.
    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.insert(tool);
        self
    }

    /// The registry offered to the model during `phase`.
    ///
    /// Tools the phase names but this set lacks are simply left out.
    pub fn registry_for(&self, phase: Phase) -> ToolRegistry {
        let tools = phase
            .tools()
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect();
        ToolRegistry { tools }
    }
}

/// The tools available to one turn, in the order they are offered.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool of the same kind.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.kind() == tool.kind()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by its model-facing name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.iter().any(|t| t.kind() == name)
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call against this registry.
    pub async fn execute(
        &self,
        ctx: &TurnContext,
        call: &ToolCallRecord,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(ctx, call.input.clone()).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConversationId;

    /// Echoes its `text` argument, standing in for any tool kind.
    struct EchoTool(ToolName);

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn kind(&self) -> ToolName {
            self.0
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            _ctx: &TurnContext,
            arguments: serde_json::Value,
        ) -> Result<ToolOutput, ToolError> {
            let args: EchoArgs = parse_arguments(arguments)?;
            Ok(ToolOutput::text(args.text))
        }
    }

    fn full_set() -> ToolSet {
        ToolName::ALL
            .into_iter()
            .fold(ToolSet::new(), |set, name| set.with(Arc::new(EchoTool(name))))
    }

    fn ctx() -> TurnContext {
        TurnContext::new(ConversationId::from("c1"), "hi")
    }

    #[test]
    fn discovery_registry() {
        let registry = full_set().registry_for(Phase::Discovery);
        assert_eq!(registry.names(), vec!["resolve_area", "discover_interests"]);
        assert!(registry.get("filter_listings").is_none());
    }

    #[test]
    fn region_registry() {
        let registry = full_set().registry_for(Phase::Region);
        assert_eq!(registry.names(), vec!["discover_interests", "filter_listings"]);
        assert!(!registry.contains(ToolName::ResolveArea));
    }

    #[test]
    fn register_replaces_same_kind() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolName::ResolveArea)));
        registry.register(Arc::new(EchoTool(ToolName::ResolveArea)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let registry = full_set().registry_for(Phase::Discovery);
        let call = ToolCallRecord {
            id: "toolu_1".into(),
            name: "resolve_area".into(),
            input: serde_json::json!({"text": "hello world"}),
        };
        let output = registry.execute(&ctx(), &call).await.unwrap();
        assert_eq!(output.text, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_tool_outside_phase() {
        let registry = full_set().registry_for(Phase::Discovery);
        let call = ToolCallRecord {
            id: "toolu_1".into(),
            name: "filter_listings".into(),
            input: serde_json::json!({}),
        };
        let err = registry.execute(&ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_arguments_are_invalid() {
        let registry = full_set().registry_for(Phase::Discovery);
        let call = ToolCallRecord {
            id: "toolu_1".into(),
            name: "resolve_area".into(),
            input: serde_json::json!({"text": 42}),
        };
        let err = registry.execute(&ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

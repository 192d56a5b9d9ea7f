//! Workflow graph types

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Config literal meaning "take this value from the upstream node"
pub const INHERIT_SENTINEL: &str = "fromPrevious";

/// A unique identifier for a node within a workflow
pub type NodeId = String;

/// Operation a node performs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Trigger,
    Bridge,
    Transfer,
    Swap,
    Stake,
    Condition,
    CustomContract,
    /// Kinds this engine has no special handling for
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Bridge => "bridge",
            NodeKind::Transfer => "transfer",
            NodeKind::Swap => "swap",
            NodeKind::Stake => "stake",
            NodeKind::Condition => "condition",
            NodeKind::CustomContract => "custom-contract",
            NodeKind::Other(kind) => kind,
        }
    }
}

impl From<String> for NodeKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "trigger" => NodeKind::Trigger,
            "bridge" => NodeKind::Bridge,
            "transfer" => NodeKind::Transfer,
            "swap" => NodeKind::Swap,
            "stake" => NodeKind::Stake,
            "condition" => NodeKind::Condition,
            "custom-contract" => NodeKind::CustomContract,
            _ => NodeKind::Other(kind),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Declared type of a node input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Token,
    Amount,
    Address,
    Transaction,
}

impl ValueType {
    /// Whether `value` can be used where this type is declared
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::Amount => match value {
                Value::Number(n) => n.as_f64().map(|v| v >= 0.0).unwrap_or(false),
                Value::String(s) => crate::sdk::parse_decimal(s).is_some(),
                _ => false,
            },
            ValueType::Address => value
                .as_str()
                .map(|s| s.starts_with("0x") && Address::from_str(s).is_ok())
                .unwrap_or(false),
            ValueType::Transaction => value
                .as_str()
                .and_then(|s| s.strip_prefix("0x"))
                .and_then(|h| hex::decode(h).ok())
                .map(|bytes| bytes.len() == 32)
                .unwrap_or(false),
            ValueType::Token => match value {
                Value::String(s) => !s.trim().is_empty(),
                Value::Object(_) => true,
                _ => false,
            },
        }
    }
}

/// A node config entry: a literal or the inherit sentinel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ConfigValue {
    Inherit,
    Literal(Value),
}

impl ConfigValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        ConfigValue::Literal(value.into())
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, ConfigValue::Inherit)
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ConfigValue::Literal(value) => Some(value),
            ConfigValue::Inherit => None,
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(ref s) if s == INHERIT_SENTINEL => ConfigValue::Inherit,
            other => ConfigValue::Literal(other),
        }
    }
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Inherit => Value::String(INHERIT_SENTINEL.to_string()),
            ConfigValue::Literal(v) => v,
        }
    }
}

/// Named slot on a node, carrying a typed value once known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTypedValue {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl NamedTypedValue {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The value, unless it is absent or JSON null
    pub fn defined_value(&self) -> Option<&Value> {
        self.value.as_ref().filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(flatten)]
    pub slot: NamedTypedValue,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub outputs: Vec<NamedTypedValue>,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: BTreeMap::new(),
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_output(mut self, output: NamedTypedValue) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_input(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        required: bool,
    ) -> Self {
        self.inputs.push(NodeInput {
            slot: NamedTypedValue::new(name, value_type),
            required,
        });
        self
    }

    /// Literal config value for `key`, skipping the inherit sentinel
    pub fn literal(&self, key: &str) -> Option<&Value> {
        self.config.get(key).and_then(ConfigValue::as_literal)
    }
}

/// Directed value flow from one node's output to another node's input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    pub id: String,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub source_output_name: String,
    pub target_input_name: String,
}

/// A named workflow: nodes connected by value-flow edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created: now,
            updated: now,
        }
    }

    pub fn with_node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self.updated = Utc::now();
        self
    }

    /// Add an edge from `source.output` to `target.input`
    pub fn connect(
        mut self,
        source: &str,
        output: &str,
        target: &str,
        input: &str,
    ) -> Self {
        self.edges.push(WorkflowEdge {
            id: uuid::Uuid::new_v4().to_string(),
            source_node_id: source.to_string(),
            target_node_id: target.to_string(),
            source_output_name: output.to_string(),
            target_input_name: input.to_string(),
        });
        self.updated = Utc::now();
        self
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Edges feeding `input` on `node_id`, in edge-list order
    pub fn incoming_edges<'a>(
        &'a self,
        node_id: &'a str,
        input: &'a str,
    ) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target_node_id == node_id && e.target_input_name == input)
    }
}

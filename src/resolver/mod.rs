//! Value resolution across workflow edges
//!
//! A node config entry set to the inherit sentinel takes its value from the
//! node feeding that input. Resolution never fails: when no value can be
//! found the sentinel comes back unchanged and the caller must treat the
//! input as unresolved (never as zero or null).

use crate::error::{EngineError, EngineResult};
use crate::graph::{ConfigValue, NamedTypedValue, ValueType, Workflow, WorkflowNode};

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Config keys that can stand in for an amount-typed input
const AMOUNT_FALLBACK_KEYS: &[&str] = &["amount", "value"];
/// Config keys that can stand in for an address-typed input
const ADDRESS_FALLBACK_KEYS: &[&str] = &["recipient", "address"];

/// Type an input key is expected to carry, if the key is a known one
pub fn expected_type(input_key: &str) -> Option<ValueType> {
    match input_key {
        "amount" | "toAmount" | "fromAmount" | "iterations" => Some(ValueType::Amount),
        "address" | "recipient" => Some(ValueType::Address),
        "token" | "fromToken" | "toToken" => Some(ValueType::Token),
        "txHash" | "transactionHash" => Some(ValueType::Transaction),
        _ => None,
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Not the sentinel; returned as-is
    Literal,
    Output { node_id: String, output: String },
    UpstreamConfig { node_id: String, key: String },
    /// No edge (or only dangling edges) feeds this input
    NoProducer,
    /// A producer exists but has nothing usable
    NoValue { node_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub value: ConfigValue,
    #[serde(flatten)]
    pub source: ResolutionSource,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !self.value.is_inherit()
    }
}

/// Resolve one input of `node_id`, returning `raw` when it cannot be resolved
pub fn resolve(workflow: &Workflow, node_id: &str, input_key: &str, raw: &ConfigValue) -> ConfigValue {
    resolve_traced(workflow, node_id, input_key, raw).value
}

/// Same as [`resolve`], also reporting where the value came from
pub fn resolve_traced(
    workflow: &Workflow,
    node_id: &str,
    input_key: &str,
    raw: &ConfigValue,
) -> Resolution {
    if !raw.is_inherit() {
        return Resolution {
            value: raw.clone(),
            source: ResolutionSource::Literal,
        };
    }

    // First edge whose producer exists; dangling edges count as no producer.
    let producer = workflow
        .incoming_edges(node_id, input_key)
        .find_map(|edge| workflow.node(&edge.source_node_id));

    let Some(producer) = producer else {
        debug!("No producer for {}.{}", node_id, input_key);
        crate::metrics::record_unresolved_input();
        return Resolution {
            value: raw.clone(),
            source: ResolutionSource::NoProducer,
        };
    };

    let expected = expected_type(input_key);

    if let Some(output) = pick_output(&producer.outputs, input_key, expected) {
        debug!(
            "Resolved {}.{} from output {}.{}",
            node_id, input_key, producer.id, output.name
        );
        // pick_output only returns outputs with a defined value
        let value = output.defined_value().cloned().unwrap_or(Value::Null);
        return Resolution {
            value: ConfigValue::Literal(value),
            source: ResolutionSource::Output {
                node_id: producer.id.clone(),
                output: output.name.clone(),
            },
        };
    }

    if let Some((key, value)) = pick_config_fallback(producer, expected) {
        debug!(
            "Resolved {}.{} from upstream config {}.{}",
            node_id, input_key, producer.id, key
        );
        return Resolution {
            value: ConfigValue::Literal(value.clone()),
            source: ResolutionSource::UpstreamConfig {
                node_id: producer.id.clone(),
                key: key.to_string(),
            },
        };
    }

    debug!(
        "Producer {} has no value for {}.{}",
        producer.id, node_id, input_key
    );
    crate::metrics::record_unresolved_input();
    Resolution {
        value: raw.clone(),
        source: ResolutionSource::NoValue {
            node_id: producer.id.clone(),
        },
    }
}

/// Output priority: matching type, then matching name, then anything defined.
/// With an expected type, a value must also be convertible to it.
fn pick_output<'a>(
    outputs: &'a [NamedTypedValue],
    input_key: &str,
    expected: Option<ValueType>,
) -> Option<&'a NamedTypedValue> {
    let usable = |o: &&NamedTypedValue| match (o.defined_value(), expected) {
        (Some(v), Some(t)) => t.accepts(v),
        (Some(_), None) => true,
        (None, _) => false,
    };

    outputs
        .iter()
        .filter(usable)
        .find(|o| expected == Some(o.value_type))
        .or_else(|| outputs.iter().filter(usable).find(|o| o.name == input_key))
        .or_else(|| outputs.iter().find(usable))
}

fn pick_config_fallback(
    producer: &WorkflowNode,
    expected: Option<ValueType>,
) -> Option<(&'static str, &Value)> {
    let (expected, keys) = match expected? {
        ValueType::Amount => (ValueType::Amount, AMOUNT_FALLBACK_KEYS),
        ValueType::Address => (ValueType::Address, ADDRESS_FALLBACK_KEYS),
        _ => return None,
    };

    keys.iter().find_map(|key| {
        producer
            .literal(key)
            .filter(|v| !v.is_null() && expected.accepts(v))
            .map(|v| (*key, v))
    })
}

/// A node's config with every inheritable entry resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub node_id: String,
    pub values: BTreeMap<String, ConfigValue>,
    /// Keys still holding the inherit sentinel
    pub unresolved: Vec<String>,
}

impl EffectiveConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).and_then(ConfigValue::as_literal)
    }

    /// String form of a literal, accepting numbers as well
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Fail if any entry is still unresolved
    pub fn require_resolved(&self) -> EngineResult<()> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Unresolved {
                node_id: self.node_id.clone(),
                keys: self.unresolved.clone(),
            })
        }
    }
}

/// Resolve every config entry of `node_id`
pub fn resolve_config(workflow: &Workflow, node_id: &str) -> EngineResult<EffectiveConfig> {
    let node = workflow
        .node(node_id)
        .ok_or_else(|| EngineError::NodeNotFound {
            workflow_id: workflow.id.clone(),
            node_id: node_id.to_string(),
        })?;

    let mut values = BTreeMap::new();
    let mut unresolved = Vec::new();

    for (key, raw) in &node.config {
        let resolved = resolve(workflow, node_id, key, raw);
        if resolved.is_inherit() {
            unresolved.push(key.clone());
        }
        values.insert(key.clone(), resolved);
    }

    Ok(EffectiveConfig {
        node_id: node_id.to_string(),
        values,
        unresolved,
    })
}

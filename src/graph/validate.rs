//! Structural checks run when a workflow is built or edited
//!
//! Resolution itself never fails on a malformed graph. These checks exist so
//! problems are reported at construction time instead:
//! - Duplicate node ids
//! - Edges pointing at missing nodes
//! - Inputs fed by more than one edge
//! - Cycles
//! - Required inputs with no way of getting a value

use super::model::{ConfigValue, Workflow};
use crate::error::{EngineError, EngineResult};

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum GraphIssue {
    DuplicateNode { node_id: String },
    DanglingEdge { edge_id: String, missing_node: String },
    MultipleProducers { node_id: String, input: String, edge_ids: Vec<String> },
    Cycle { node_ids: Vec<String> },
    UnsatisfiedInput { node_id: String, input: String },
}

impl GraphIssue {
    pub fn severity(&self) -> Severity {
        match self {
            // resolution already treats these as "no producer"
            GraphIssue::DanglingEdge { .. } | GraphIssue::UnsatisfiedInput { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            GraphIssue::DuplicateNode { node_id } => format!("duplicate node id {}", node_id),
            GraphIssue::DanglingEdge { edge_id, missing_node } => {
                format!("edge {} references missing node {}", edge_id, missing_node)
            }
            GraphIssue::MultipleProducers { node_id, input, edge_ids } => format!(
                "input {}.{} has {} producers ({})",
                node_id,
                input,
                edge_ids.len(),
                edge_ids.join(", ")
            ),
            GraphIssue::Cycle { node_ids } => format!("cycle through {}", node_ids.join(", ")),
            GraphIssue::UnsatisfiedInput { node_id, input } => {
                format!("required input {}.{} has no edge and no literal", node_id, input)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<GraphIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &GraphIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GraphIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Warning)
    }
}

/// Run every structural check over `workflow`
pub fn validate(workflow: &Workflow) -> ValidationReport {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }

    for edge in &workflow.edges {
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !seen.contains(endpoint.as_str()) {
                issues.push(GraphIssue::DanglingEdge {
                    edge_id: edge.id.clone(),
                    missing_node: endpoint.clone(),
                });
            }
        }
    }

    // (target, input) -> edge ids, ordered for stable reports
    let mut producers: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
    for edge in &workflow.edges {
        producers
            .entry((edge.target_node_id.as_str(), edge.target_input_name.as_str()))
            .or_default()
            .push(edge.id.clone());
    }
    for ((node_id, input), edge_ids) in &producers {
        if edge_ids.len() > 1 {
            issues.push(GraphIssue::MultipleProducers {
                node_id: node_id.to_string(),
                input: input.to_string(),
                edge_ids: edge_ids.clone(),
            });
        }
    }

    if let Some(node_ids) = find_cycle_members(workflow, &seen) {
        issues.push(GraphIssue::Cycle { node_ids });
    }

    for node in &workflow.nodes {
        for input in node.inputs.iter().filter(|i| i.required) {
            let name = input.slot.name.as_str();
            let fed = producers.contains_key(&(node.id.as_str(), name));
            let literal = matches!(node.config.get(name), Some(ConfigValue::Literal(_)));
            if !fed && !literal && input.slot.defined_value().is_none() {
                issues.push(GraphIssue::UnsatisfiedInput {
                    node_id: node.id.clone(),
                    input: name.to_string(),
                });
            }
        }
    }

    ValidationReport { issues }
}

/// Nodes left over after a topological sort, i.e. those on or behind a cycle
fn find_cycle_members(workflow: &Workflow, known: &HashSet<&str>) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = known.iter().map(|id| (*id, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &workflow.edges {
        let (from, to) = (edge.source_node_id.as_str(), edge.target_node_id.as_str());
        if !known.contains(from) || !known.contains(to) {
            continue;
        }
        successors.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    while let Some(id) = queue.pop_front() {
        for next in successors.get(id).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    let mut remaining: Vec<String> = in_degree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id.to_string())
        .collect();

    if remaining.is_empty() {
        None
    } else {
        remaining.sort();
        Some(remaining)
    }
}

impl Workflow {
    /// Fail if the graph has any error-level issue
    pub fn ensure_valid(&self) -> EngineResult<()> {
        let report = validate(self);
        if report.is_valid() {
            return Ok(());
        }

        let details: Vec<String> = report.errors().map(GraphIssue::describe).collect();
        Err(EngineError::InvalidGraph(details.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{NodeKind, ValueType, WorkflowNode};

    fn node(id: &str, kind: NodeKind) -> WorkflowNode {
        WorkflowNode::new(id, kind)
    }

    #[test]
    fn test_linear_workflow_is_valid() {
        let wf = Workflow::new("linear")
            .with_node(node("trigger", NodeKind::Trigger))
            .with_node(node("bridge", NodeKind::Bridge))
            .with_node(node("stake", NodeKind::Stake))
            .connect("trigger", "amount", "bridge", "amount")
            .connect("bridge", "amount", "stake", "amount");

        let report = validate(&wf);
        assert!(report.is_valid());
        assert!(report.issues.is_empty());
        assert!(wf.ensure_valid().is_ok());
    }

    #[test]
    fn test_fan_in_is_rejected() {
        let wf = Workflow::new("fan-in")
            .with_node(node("a", NodeKind::Bridge))
            .with_node(node("b", NodeKind::Swap))
            .with_node(node("c", NodeKind::Stake))
            .connect("a", "amount", "c", "amount")
            .connect("b", "amount", "c", "amount");

        let report = validate(&wf);
        assert!(!report.is_valid());
        assert!(matches!(
            report.errors().next(),
            Some(GraphIssue::MultipleProducers { node_id, input, edge_ids })
                if node_id == "c" && input == "amount" && edge_ids.len() == 2
        ));

        let err = wf.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("2 producers"));
    }

    #[test]
    fn test_dangling_edge_is_only_a_warning() {
        let wf = Workflow::new("dangling")
            .with_node(node("stake", NodeKind::Stake))
            .connect("ghost", "amount", "stake", "amount");

        let report = validate(&wf);
        assert!(report.is_valid());
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_cycle_and_duplicate_detection() {
        let wf = Workflow::new("loop")
            .with_node(node("a", NodeKind::Swap))
            .with_node(node("b", NodeKind::Swap))
            .with_node(node("b", NodeKind::Stake))
            .connect("a", "amount", "b", "amount")
            .connect("b", "amount", "a", "amount");

        let report = validate(&wf);
        assert!(report
            .issues
            .contains(&GraphIssue::DuplicateNode { node_id: "b".into() }));
        assert!(report.issues.contains(&GraphIssue::Cycle {
            node_ids: vec!["a".into(), "b".into()]
        }));
    }

    #[test]
    fn test_unsatisfied_required_input() {
        let wf = Workflow::new("unsatisfied").with_node(
            node("transfer", NodeKind::Transfer)
                .with_input("recipient", ValueType::Address, true)
                .with_config("recipient", ConfigValue::Inherit),
        );

        let report = validate(&wf);
        assert!(report.is_valid());
        assert_eq!(
            report.warnings().next(),
            Some(&GraphIssue::UnsatisfiedInput {
                node_id: "transfer".into(),
                input: "recipient".into()
            })
        );
    }
}

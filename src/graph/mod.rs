//! Workflow graph model
//!
//! A workflow is a set of operation nodes (bridge, swap, stake, ...) whose
//! named outputs feed named inputs of downstream nodes. The graph is treated
//! as read-only for the duration of a resolution pass.

pub mod model;
pub mod validate;

pub use model::{
    ConfigValue, NamedTypedValue, NodeId, NodeInput, NodeKind, ValueType, Workflow,
    WorkflowEdge, WorkflowNode, INHERIT_SENTINEL,
};
pub use validate::{validate, GraphIssue, Severity, ValidationReport};

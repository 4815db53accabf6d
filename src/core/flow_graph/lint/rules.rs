use super::{FlowLintRule, LintResult, LintSeverity};
use crate::core::flow_graph::actions::set_variable;
use crate::core::flow_graph::expression::ConditionEvaluator;
use crate::core::flow_graph::model::{Flow, NodeKind, NodeType};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

pub fn built_in_rules() -> Vec<Box<dyn FlowLintRule>> {
    vec![
        Box::new(UnreachableNodesRule),
        Box::new(ConditionBranchesRule),
        Box::new(AmbiguousOutgoingRule),
        Box::new(ExpressionParseFailureRule),
        Box::new(EndNodeOutgoingRule),
        Box::new(CycleRiskRule),
        Box::new(SetVariableParamsRule),
    ]
}

struct UnreachableNodesRule;

impl FlowLintRule for UnreachableNodesRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        let (graph, index_by_id) = build_node_graph(flow);
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut dfs = Dfs::empty(&graph);
        for start in flow.nodes_of_type(NodeType::Start) {
            let Some(index) = index_by_id.get(start.id.as_str()) else {
                continue;
            };
            dfs.move_to(*index);
            while let Some(visited) = dfs.next(&graph) {
                reachable.insert(graph[visited]);
            }
        }

        flow.nodes
            .iter()
            .filter(|node| !reachable.contains(node.id.as_str()))
            .map(|node| {
                LintResult::new(
                    "FLOW-LINT-001",
                    LintSeverity::Warning,
                    format!("{} node '{}' is unreachable from start", node.node_type(), node.id),
                    Some(node.id.clone()),
                    Some("connect the node from a reachable node or remove it".to_string()),
                )
            })
            .collect()
    }
}

struct ConditionBranchesRule;

impl FlowLintRule for ConditionBranchesRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        let mut out = Vec::new();
        for node in flow.nodes_of_type(NodeType::Condition) {
            let labels: HashSet<&str> = flow
                .outgoing(&node.id)
                .into_iter()
                .filter_map(|connection| connection.condition.as_deref().map(str::trim))
                .collect();
            for branch in ["true", "false"] {
                if !labels.contains(branch) {
                    out.push(LintResult::new(
                        "FLOW-LINT-002",
                        LintSeverity::Warning,
                        format!(
                            "condition node '{}' has no '{}' branch; runs end there when it evaluates {}",
                            node.id, branch, branch
                        ),
                        Some(node.id.clone()),
                        Some(format!("add a connection labelled '{}'", branch)),
                    ));
                }
            }
        }
        out
    }
}

struct AmbiguousOutgoingRule;

impl FlowLintRule for AmbiguousOutgoingRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        flow.nodes
            .iter()
            .filter(|node| !matches!(node.node_type(), NodeType::Condition | NodeType::End))
            .filter_map(|node| {
                let outgoing = flow.outgoing(&node.id);
                if outgoing.len() < 2 {
                    return None;
                }
                Some(LintResult::new(
                    "FLOW-LINT-003",
                    LintSeverity::Warning,
                    format!(
                        "{} node '{}' has {} outgoing connections; only '{}' is followed",
                        node.node_type(),
                        node.id,
                        outgoing.len(),
                        outgoing[0].id
                    ),
                    Some(node.id.clone()),
                    Some("keep a single outgoing connection or branch with a condition node".to_string()),
                ))
            })
            .collect()
    }
}

struct ExpressionParseFailureRule;

impl FlowLintRule for ExpressionParseFailureRule {
    fn check(&self, flow: &Flow, evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        let mut out = Vec::new();
        for node in &flow.nodes {
            let NodeKind::Condition(payload) = &node.kind else {
                continue;
            };
            if let Err(err) = evaluator.check_syntax(&payload.expression) {
                out.push(LintResult::new(
                    "FLOW-LINT-004",
                    LintSeverity::Error,
                    format!(
                        "condition '{}' on node '{}' does not parse: {}",
                        payload.expression, node.id, err
                    ),
                    Some(node.id.clone()),
                    Some("use comparisons (==, !=, <, <=, >, >=) joined by &&, || and !".to_string()),
                ));
            }
        }
        out
    }
}

struct EndNodeOutgoingRule;

impl FlowLintRule for EndNodeOutgoingRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        flow.nodes_of_type(NodeType::End)
            .filter(|node| !flow.outgoing(&node.id).is_empty())
            .map(|node| {
                LintResult::new(
                    "FLOW-LINT-005",
                    LintSeverity::Info,
                    format!("end node '{}' has outgoing connections that never run", node.id),
                    Some(node.id.clone()),
                    Some("remove the connections leaving the end node".to_string()),
                )
            })
            .collect()
    }
}

/// Node ids as graph weights; connections with a missing endpoint are skipped.
fn build_node_graph(flow: &Flow) -> (DiGraph<&str, ()>, HashMap<&str, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut index_by_id: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &flow.nodes {
        let idx = graph.add_node(node.id.as_str());
        index_by_id.insert(node.id.as_str(), idx);
    }
    for connection in &flow.connections {
        if let (Some(source), Some(target)) = (
            index_by_id.get(connection.source.as_str()),
            index_by_id.get(connection.target.as_str()),
        ) {
            graph.add_edge(*source, *target, ());
        }
    }
    (graph, index_by_id)
}

struct CycleRiskRule;

impl FlowLintRule for CycleRiskRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        let (graph, _) = build_node_graph(flow);
        let mut out = Vec::new();

        for component in tarjan_scc(&graph) {
            let is_cycle = if component.len() > 1 {
                true
            } else {
                let idx = component[0];
                graph.find_edge(idx, idx).is_some()
            };
            if !is_cycle {
                continue;
            }

            let mut ids: Vec<&str> = component.iter().map(|idx| graph[*idx]).collect();
            ids.sort_unstable();
            out.push(LintResult::new(
                "FLOW-LINT-006",
                LintSeverity::Warning,
                format!(
                    "nodes [{}] form a cycle; runs stop with CycleDetected when a node repeats",
                    ids.join(", ")
                ),
                ids.first().map(|id| id.to_string()),
                Some("break the loop or enable engine.allow_revisits".to_string()),
            ));
        }
        out
    }
}

struct SetVariableParamsRule;

impl FlowLintRule for SetVariableParamsRule {
    fn check(&self, flow: &Flow, _evaluator: &ConditionEvaluator) -> Vec<LintResult> {
        let mut out = Vec::new();
        for node in &flow.nodes {
            let NodeKind::Action(payload) = &node.kind else {
                continue;
            };
            if payload.action != set_variable::KIND {
                continue;
            }
            let missing: Vec<&str> = ["name", "value"]
                .into_iter()
                .filter(|key| !payload.params.contains_key(*key))
                .collect();
            if missing.is_empty() {
                continue;
            }
            out.push(LintResult::new(
                "FLOW-LINT-007",
                LintSeverity::Error,
                format!(
                    "set_variable node '{}' is missing parameter(s): {}",
                    node.id,
                    missing.join(", ")
                ),
                Some(node.id.clone()),
                Some("set both 'name' and 'value'".to_string()),
            ));
        }
        out
    }
}

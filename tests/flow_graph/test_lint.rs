#[path = "../common/mod.rs"]
mod common;

use chatflow::core::flow_graph::lint::{LintRegistry, LintResult, LintSeverity};
use chatflow::core::flow_graph::{Connection, Flow, Node};
use common::{age_branch_flow, dead_end_flow, params};

fn linear() -> Flow {
    let mut flow = Flow::new("lint", "owner-1", "Lint");
    flow.add_node(Node::start("start"))
        .add_node(Node::message("hello", "Hello"))
        .add_node(Node::end("end"));
    flow.connect("start", "hello").connect("hello", "end");
    flow
}

fn with_code<'a>(results: &'a [LintResult], code: &str) -> Vec<&'a LintResult> {
    results.iter().filter(|result| result.code == code).collect()
}

fn severity_rank(severity: LintSeverity) -> u8 {
    match severity {
        LintSeverity::Error => 3,
        LintSeverity::Warning => 2,
        LintSeverity::Info => 1,
    }
}

#[test]
fn clean_flow_has_no_findings() {
    let results = LintRegistry::new().run(&age_branch_flow());
    assert!(results.is_empty(), "unexpected findings: {:?}", results);
    assert!(!LintRegistry::has_errors(&results));
}

#[test]
fn unreachable_node_is_reported() {
    let mut flow = linear();
    flow.add_node(Node::message("island", "never sent"));

    let results = LintRegistry::new().run(&flow);
    let findings = with_code(&results, "FLOW-LINT-001");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, LintSeverity::Warning);
    assert_eq!(findings[0].location.as_deref(), Some("island"));
}

#[test]
fn missing_false_branch_is_reported_once() {
    let results = LintRegistry::new().run(&dead_end_flow());
    let findings = with_code(&results, "FLOW-LINT-002");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].location.as_deref(), Some("check"));
    assert!(findings[0].message.contains("'false'"));
}

#[test]
fn second_outgoing_connection_is_flagged_as_ignored() {
    let mut flow = Flow::new("lint", "owner-1", "Lint");
    flow.add_node(Node::start("start"))
        .add_node(Node::message("hello", "Hello"))
        .add_node(Node::end("end"));
    flow.connect("start", "hello")
        .connect("start", "end")
        .connect("hello", "end");

    let results = LintRegistry::new().run(&flow);
    let findings = with_code(&results, "FLOW-LINT-003");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].location.as_deref(), Some("start"));
    assert!(findings[0].message.contains("only 'c1' is followed"));
}

#[test]
fn unparsable_condition_is_an_error() {
    let mut flow = age_branch_flow();
    for node in flow.nodes.iter_mut().filter(|node| node.id == "check") {
        *node = Node::condition("check", "{{age}} >=");
    }

    let results = LintRegistry::new().run(&flow);
    let findings = with_code(&results, "FLOW-LINT-004");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, LintSeverity::Error);
    assert!(LintRegistry::has_errors(&results));
}

#[test]
fn end_node_with_outgoing_edge_is_informational() {
    let mut flow = linear();
    flow.add_connection(Connection::new("back", "end", "hello"));

    let results = LintRegistry::new().run(&flow);
    let end_findings = with_code(&results, "FLOW-LINT-005");
    assert_eq!(end_findings.len(), 1);
    assert_eq!(end_findings[0].severity, LintSeverity::Info);

    let cycles = with_code(&results, "FLOW-LINT-006");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].location.as_deref(), Some("end"));
    assert!(cycles[0].message.contains("[end, hello]"));
}

#[test]
fn self_loop_counts_as_cycle() {
    let mut flow = linear();
    flow.add_connection(Connection::new("again", "hello", "hello"));

    let results = LintRegistry::new().run(&flow);
    let cycles = with_code(&results, "FLOW-LINT-006");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].location.as_deref(), Some("hello"));
}

#[test]
fn set_variable_without_value_is_an_error() {
    let mut flow = Flow::new("lint", "owner-1", "Lint");
    flow.add_node(Node::start("start"))
        .add_node(Node::action("set", "set_variable", params(&[("name", "city")])))
        .add_node(Node::end("end"));
    flow.connect("start", "set").connect("set", "end");

    let results = LintRegistry::new().run(&flow);
    let findings = with_code(&results, "FLOW-LINT-007");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, LintSeverity::Error);
    assert!(findings[0].message.contains("value"));
    assert!(!findings[0].message.contains("name,"));
}

#[test]
fn lint_results_are_stably_sorted() {
    let mut flow = Flow::new("messy", "owner-1", "Messy");
    flow.add_node(Node::start("start"))
        .add_node(Node::condition("check", "{{age}} >="))
        .add_node(Node::message("greet", "Hello"))
        .add_node(Node::action("set", "set_variable", params(&[])))
        .add_node(Node::message("island", "never sent"))
        .add_node(Node::end("end"));
    flow.connect("start", "check")
        .connect("start", "greet")
        .connect_when("check", "greet", "true")
        .connect("greet", "set")
        .connect("set", "greet")
        .connect("set", "end")
        .connect("end", "start");

    let results = LintRegistry::new().run(&flow);
    assert!(!results.is_empty());
    for pair in results.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        let left_rank = severity_rank(left.severity);
        let right_rank = severity_rank(right.severity);
        assert!(
            left_rank > right_rank || (left_rank == right_rank && left.code <= right.code),
            "out of order: {:?} before {:?}",
            left,
            right
        );
    }
    assert_eq!(results[0].severity, LintSeverity::Error);
    assert_eq!(results.last().map(|r| r.code.as_str()), Some("FLOW-LINT-005"));

    let again = LintRegistry::new().run(&flow);
    assert_eq!(keys(&results), keys(&again));
}

fn keys(results: &[LintResult]) -> Vec<(String, Option<String>)> {
    results
        .iter()
        .map(|result| (result.code.clone(), result.location.clone()))
        .collect()
}

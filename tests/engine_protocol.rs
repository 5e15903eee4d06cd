use testloader::context::wire::{parse_record, parse_tree, EngineRecord};
use testloader::types::{NodeKind, Outcome};

#[test]
fn run_records_are_parsed_by_event_tag() {
    let started = parse_record(
        r#"{"event":"test_started","node":{"name":"Adds","full_name":"Core.Adds","kind":"case"}}"#,
    );
    match started {
        Some(EngineRecord::TestStarted { node }) => {
            assert_eq!(node.full_name, "Core.Adds");
            assert_eq!(node.kind, NodeKind::Case);
            assert!(!node.ignored);
        }
        other => panic!("unexpected {other:?}"),
    }

    let finished = parse_record(
        r#"  {"event":"test_finished","result":{"full_name":"Core.Adds","kind":"case","outcome":"failed","message":"boom","elapsed_ms":12}}  "#,
    );
    match finished {
        Some(EngineRecord::TestFinished { result }) => {
            assert_eq!(result.outcome, Outcome::Failed);
            assert_eq!(result.message.as_deref(), Some("boom"));
            assert_eq!(result.elapsed_ms, 12);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(matches!(
        parse_record(r#"{"event":"suite_started","node":{"name":"Core","full_name":"Core","kind":"suite"}}"#),
        Some(EngineRecord::SuiteStarted { .. })
    ));
    assert!(matches!(
        parse_record(r#"{"event":"suite_finished","result":{"full_name":"Core","kind":"suite","outcome":"passed"}}"#),
        Some(EngineRecord::SuiteFinished { .. })
    ));
    assert!(matches!(
        parse_record(r#"{"event":"run_finished","result":{"full_name":"Core","kind":"suite","outcome":"ignored"}}"#),
        Some(EngineRecord::RunFinished { .. })
    ));
}

#[test]
fn anything_else_is_output() {
    assert_eq!(parse_record("Running 3 tests..."), None);
    assert_eq!(parse_record(""), None);
    assert_eq!(parse_record("{ not json at all"), None);
    assert_eq!(parse_record(r#"{"event":"unknown_event"}"#), None);
    assert_eq!(parse_record(r#"{"message":"structured log line"}"#), None);
}

#[test]
fn listed_tree_is_parsed() {
    let tree = parse_tree(
        r#"
{"name":"Core","full_name":"Core","kind":"suite","children":[
  {"name":"Adds","full_name":"Core.Adds","kind":"case"},
  {"name":"Slow","full_name":"Core.Slow","kind":"case","ignored":true,"description":"takes minutes"}
]}
"#,
    )
    .unwrap();

    assert_eq!(tree.test_count(), 2);
    let slow = tree.find("Core.Slow").unwrap();
    assert!(slow.ignored);
    assert_eq!(slow.description.as_deref(), Some("takes minutes"));
}

#[test]
fn garbage_tree_output_is_an_error() {
    let err = parse_tree("no tests found").unwrap_err();
    assert!(format!("{err:#}").contains("parsing test tree"));
}

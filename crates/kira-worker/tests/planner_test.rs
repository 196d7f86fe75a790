//! Additional `PlanParser` coverage beyond the inline unit tests: prose
//! surrounding the JSON, braces inside string values, and a few malformed
//! shapes the two-stage parse must still reject cleanly.

use kira_worker::executors::planner::PlanParser;

#[test]
fn braces_inside_a_string_value_do_not_confuse_the_brace_scanner() {
    let output = r#"Thinking out loud... {"cards": [{"title": "Document the {config} syntax"}]} done."#;
    let plan = PlanParser::parse(output).unwrap();
    assert_eq!(plan.cards.len(), 1);
    assert_eq!(plan.cards[0].title, "Document the {config} syntax");
}

#[test]
fn fenced_block_takes_priority_over_a_balanced_brace_match_in_the_surrounding_prose() {
    let output = r#"Here's a rough idea {"cards": []} but the real plan is below:
```json
{"cards": [{"title": "Real card"}]}
```"#;
    let plan = PlanParser::parse(output).unwrap();
    assert_eq!(plan.cards.len(), 1);
    assert_eq!(plan.cards[0].title, "Real card");
}

#[test]
fn multiple_balanced_objects_returns_the_first_with_a_cards_key() {
    let output = r#"{"board_name": "ignored, no cards key"} then {"cards": [{"title": "Found it"}]}"#;
    let plan = PlanParser::parse(output).unwrap();
    assert_eq!(plan.cards.len(), 1);
    assert_eq!(plan.cards[0].title, "Found it");
}

#[test]
fn empty_cards_array_is_a_valid_plan() {
    let plan = PlanParser::parse(r#"{"cards": []}"#).unwrap();
    assert!(plan.cards.is_empty());
}

#[test]
fn cards_as_the_wrong_type_is_rejected() {
    assert!(PlanParser::parse(r#"{"cards": "not an array"}"#).is_err());
}

#[test]
fn truncated_json_never_panics_the_brace_scanner() {
    assert!(PlanParser::parse(r#"{"cards": [{"title": "unterminated"#).is_err());
}

#[test]
fn whitespace_only_output_is_rejected() {
    assert!(PlanParser::parse("   \n\t  ").is_err());
}

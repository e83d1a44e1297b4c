//! Unit tests for command template substitution.

use agent_conduit::custom::template::resolve;

#[test]
fn positional_placeholders_substitute_in_order() {
    assert_eq!(
        resolve("compare $1 with $2", "left right"),
        "compare left with right"
    );
}

#[test]
fn arguments_placeholder_takes_the_whole_remainder() {
    assert_eq!(
        resolve("review: $ARGUMENTS", "src/lib.rs and tests"),
        "review: src/lib.rs and tests"
    );
}

#[test]
fn unconsumed_positionals_are_removed() {
    assert_eq!(resolve("run $1 $2 $3", "only"), "run only  ");
}

#[test]
fn dollar_dollar_escapes_to_literal_dollar() {
    assert_eq!(resolve("costs $$5", "ignored args"), "costs $5 ignored args");
}

#[test]
fn escaped_dollar_before_digit_is_not_a_placeholder() {
    // `$$1` is a literal `$` followed by the character `1`.
    assert_eq!(resolve("price $$1 and $1", "apple"), "price $1 and apple");
}

#[test]
fn template_without_placeholders_appends_raw_arguments() {
    assert_eq!(
        resolve("Summarize the repository", "with extra care"),
        "Summarize the repository with extra care"
    );
}

#[test]
fn template_without_placeholders_and_no_args_is_unchanged() {
    assert_eq!(resolve("Summarize the repository", "  "), "Summarize the repository");
}

#[test]
fn template_with_placeholders_does_not_append() {
    assert_eq!(resolve("lint $1", "a b c"), "lint a");
}

#[test]
fn lone_dollar_is_literal() {
    assert_eq!(resolve("echo $PATH", ""), "echo $PATH");
}

#[test]
fn arguments_placeholder_with_empty_args() {
    assert_eq!(resolve("say $ARGUMENTS", ""), "say ");
}

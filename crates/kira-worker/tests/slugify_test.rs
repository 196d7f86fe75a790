//! Dedicated coverage of the `gitlab_push` branch-name slugifier, exercised
//! as the `gitlab_push` executor uses it: arbitrary prompt/title text in,
//! a `git checkout -b`-safe branch fragment out.

use kira_worker::executors::gitlab::slugify;

#[test]
fn empty_input_slugifies_to_empty() {
    assert_eq!(slugify(""), "");
}

#[test]
fn single_word_is_left_alone() {
    assert_eq!(slugify("widget"), "widget");
}

#[test]
fn digits_are_preserved() {
    assert_eq!(slugify("Release v2.4.0"), "release-v2-4-0");
}

#[test]
fn non_ascii_letters_are_dropped_not_transliterated() {
    // `to_lowercase` happily lowercases non-ASCII, but only
    // `is_ascii_alphanumeric` characters survive into the slug.
    assert_eq!(slugify("naïve café"), "na-ve-caf");
}

#[test]
fn runs_of_punctuation_collapse_to_one_dash() {
    assert_eq!(slugify("fix: the---bug!!!"), "fix-the-bug");
}

#[test]
fn purely_punctuation_input_slugifies_to_empty() {
    assert_eq!(slugify("!!! ??? ..."), "");
}

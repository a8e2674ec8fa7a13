use serde_json::json;
use u2l_core::db::open_db_in_memory;
use u2l_core::{ExpandService, SqliteFactRepository, VerifyError, VerifyService};

fn verify(config: serde_json::Value) -> Result<(), VerifyError> {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteFactRepository::new(&conn);
    ExpandService::new(repo).load_json(&config).unwrap();
    VerifyService::new(repo).verify()
}

#[test]
fn command_markup_without_reverse_is_reported_by_name() {
    let err = verify(json!([
        ["x", "unicode-to-text", "\\`foo"],
        ["y", "unicode-to-math", "y_1"],
        ["z", "unicode-is-text", "\\z"]
    ]))
    .unwrap_err();

    match err {
        VerifyError::Consistency(err) => {
            assert_eq!(err.missing, vec!["\\`foo".to_string(), "y_1".to_string()]);
            assert!(err
                .to_string()
                .lines()
                .any(|line| line == "Missing tex2ucode mapping for \"\\\\`foo\""));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn plain_and_spaced_markup_need_no_reverse() {
    verify(json!([
        ["A", "unicode-to-text", "A"],
        ["\u{2009}", "unicode-to-text", "\\, "],
        ["§", "unicode-to-text", "\\S{}"],
        ["\\S", "tex-to-unicode", "§"]
    ]))
    .unwrap();
}

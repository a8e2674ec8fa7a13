use serde_json::json;
use u2l_core::db::open_db_in_memory;
use u2l_core::{
    ConfigError, Direction, ExpandError, ExpandService, FactListQuery, FactRepository, Mode,
    SqliteFactRepository,
};

#[test]
fn unicode_is_text_stores_forward_and_reverse_fact() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteFactRepository::new(&conn);

    let inserted = ExpandService::new(repo)
        .load_json(&json!([["é", "unicode-is-text", "\\'e"]]))
        .unwrap();
    assert_eq!(inserted, 2);

    let facts = repo.list_facts(&FactListQuery::default()).unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].fact.direction, Direction::UnicodeTo(Mode::Text));
    assert_eq!(facts[1].fact.direction, Direction::TexToUnicode);
    assert!(facts.iter().all(|stored| stored.fact.markup == "\\'e"));
}

#[test]
fn trailing_empty_argument_is_stripped_on_insert() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteFactRepository::new(&conn);

    ExpandService::new(repo)
        .load_json(&json!([["§", "unicode-is-tex", "\\S{}"]]))
        .unwrap();

    let facts = repo.list_facts(&FactListQuery::default()).unwrap();
    assert_eq!(facts.len(), 3);
    assert!(facts.iter().all(|stored| stored.fact.markup == "\\S"));
}

#[test]
fn shape_errors_leave_store_untouched() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteFactRepository::new(&conn);

    let err = ExpandService::new(repo)
        .load_json(&json!([
            ["a", "unicode-to-text", "a"],
            ["b", "unicode-to-ascii", "b"]
        ]))
        .unwrap_err();
    assert!(matches!(
        err,
        ExpandError::Config(ConfigError::UnknownRelation { index: 1, .. })
    ));
    assert_eq!(repo.count_facts().unwrap(), 0);
}

#[test]
fn duplicate_keys_name_the_declaration() {
    let mut conn = open_db_in_memory().unwrap();
    let tx = conn.transaction().unwrap();
    let err = ExpandService::new(SqliteFactRepository::new(&tx))
        .load_json(&json!([
            ["μ", "unicode-to-math", "\\mu"],
            ["μ", "unicode-to-math", "\\upmu"]
        ]))
        .unwrap_err();
    drop(tx);

    match err {
        ExpandError::Repo { index, source } => {
            assert_eq!(index, 1);
            assert!(source.to_string().contains("\\\\upmu"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(SqliteFactRepository::new(&conn).count_facts().unwrap(), 0);
}

use serde_json::{json, Value};
use u2l_core::db::open_db_in_memory;
use u2l_core::model::table::DiacriticCommand;
use u2l_core::{ExpandService, Mode, SqliteFactRepository, TableService, Tables};

fn tables(config: Value) -> Tables {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteFactRepository::new(&conn);
    ExpandService::new(repo).load_json(&config).unwrap();
    TableService::new(repo).build().unwrap()
}

#[test]
fn ascii_entry_carries_only_declared_fields() {
    let tables = tables(json!([["é", "unicode-is-text", "\\'e", {}]]));
    assert_eq!(
        serde_json::to_value(&tables.ascii["é"]).unwrap(),
        json!({"text": "\\'e"})
    );
    assert_eq!(serde_json::to_value(&tables.latex["\\'e"]).unwrap(), json!("é"));
}

#[test]
fn package_lists_merge_across_modes() {
    let tables = tables(json!([
        ["ℵ", "unicode-to-math", "\\aleph", {"mathpackages": "amssymb"}],
        ["ℵ", "unicode-to-text", "\\textaleph", {"textpackages": ["textcomp"], "space": true}]
    ]));
    assert_eq!(
        serde_json::to_value(&tables.ascii["ℵ"]).unwrap(),
        json!({
            "text": "\\textaleph{}",
            "math": "\\aleph{}",
            "textpackages": ["textcomp"],
            "mathpackages": ["amssymb"],
            "space": true,
            "commandspacer": true
        })
    );
    assert_eq!(
        serde_json::to_value(&tables.bibtex["ℵ"]).unwrap(),
        json!({
            "text": "\\textaleph{}",
            "textpackages": ["textcomp"],
            "space": true,
            "commandspacer": true
        })
    );
}

#[test]
fn combining_diacritic_is_indexed_under_every_permutation() {
    let tables = tables(json!([
        ["\u{0300}\u{0304}", "unicode-is-text", "\\textgravemacron", {"combiningdiacritic": true}]
    ]));

    for key in ["\u{0300}\u{0304}", "\u{0304}\u{0300}"] {
        let entry = &tables.ascii[key];
        assert_eq!(entry.text.as_deref(), Some("\\textgravemacron{}"));
        assert!(entry.combiningdiacritic);
        assert_eq!(
            tables.diacritics.tolatex[key],
            DiacriticCommand {
                mode: Mode::Text,
                command: "textgravemacron".to_string()
            }
        );
    }
    assert_eq!(
        tables.diacritics.tounicode["textgravemacron"],
        "\u{0300}\u{0304}"
    );
    assert_eq!(tables.diacritics.commands, vec!["textgravemacron".to_string()]);
    assert_eq!(
        serde_json::to_value(&tables.latex["\\textgravemacron"]).unwrap(),
        json!({"combiningdiacritic": "\u{0300}\u{0304}"})
    );
}

#[test]
fn permutation_never_replaces_declared_entry() {
    let tables = tables(json!([
        ["a\u{0301}", "unicode-to-text", "\\x", {"combiningdiacritic": true}],
        ["\u{0301}a", "unicode-to-text", "y"]
    ]));
    assert_eq!(tables.ascii["\u{0301}a"].text.as_deref(), Some("y"));
    assert_eq!(tables.ascii["a\u{0301}"].text.as_deref(), Some("\\x{}"));
}

#[test]
fn text_command_wins_over_math_in_diacritic_map() {
    let tables = tables(json!([
        ["\u{0307}", "unicode-to-math", "\\dot", {"combiningdiacritic": true}],
        ["\u{0307}", "unicode-to-text", "\\.", {"combiningdiacritic": true}]
    ]));
    assert_eq!(
        tables.diacritics.tolatex["\u{0307}"],
        DiacriticCommand {
            mode: Mode::Text,
            command: ".".to_string()
        }
    );
    assert_eq!(tables.diacritics.tounicode["dot"], "\u{0307}");
    assert_eq!(tables.diacritics.tounicode["."], "\u{0307}");
}

#[test]
fn unicode_table_keeps_only_escaping_characters() {
    let tables = tables(json!([
        ["<", "unicode-to-text", "\\textless"],
        ["\u{00A0}", "unicode-to-text", "~"],
        ["a", "unicode-to-text", "a"],
        ["\u{2060}", "unicode-to-text", "\\nobreak "]
    ]));
    let keys: Vec<&str> = tables.unicode.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["<", "\u{00A0}"]);
    assert_eq!(tables.unicode["<"].text.as_deref(), Some("\\textless{}"));
    assert!(tables.unicode["<"].commandspacer);
    assert_eq!(tables.ascii.len(), 4);
}

#[test]
fn bibtex_wraps_markup_containing_diacritic_commands() {
    let tables = tables(json!([
        ["\u{0301}", "unicode-is-text", "\\'", {"combiningdiacritic": true}],
        ["ǻ", "unicode-is-text", "\\'{\\aa}"],
        ["ĳ", "unicode-is-text", "\\ij"],
        ["∑", "unicode-is-math", "\\sum"]
    ]));
    assert_eq!(tables.bibtex["ǻ"].text.as_deref(), Some("{{\\'{\\aa}}}"));
    assert!(!tables.bibtex["ǻ"].commandspacer);
    assert_eq!(tables.bibtex["ĳ"].text.as_deref(), Some("\\ij{}"));
    assert!(tables.bibtex["ĳ"].commandspacer);
    assert!(!tables.bibtex.contains_key("∑"));
    assert!(tables.ascii.contains_key("∑"));
}

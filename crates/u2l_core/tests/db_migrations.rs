use rusqlite::Connection;
use u2l_core::db::migrations::latest_version;
use u2l_core::db::{open_db, open_db_in_memory, open_fresh_db, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "ucode2tex");
    assert_table_exists(&conn, "tex2ucode");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staging.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "ucode2tex");
}

#[test]
fn fresh_database_drops_facts_from_earlier_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staging.db");

    let conn = open_db(&path).unwrap();
    conn.execute(
        "INSERT INTO tex2ucode (tex, ucode) VALUES ('\\alpha', 'α');",
        [],
    )
    .unwrap();
    drop(conn);

    let conn = open_fresh_db(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tex2ucode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn schema_rejects_empty_markup_and_unknown_modes() {
    let conn = open_db_in_memory().unwrap();
    assert!(conn
        .execute(
            "INSERT INTO ucode2tex (ucode, tex, mode) VALUES ('a', '', 'text');",
            [],
        )
        .is_err());
    assert!(conn
        .execute(
            "INSERT INTO ucode2tex (ucode, tex, mode) VALUES ('a', 'a', 'bibtex');",
            [],
        )
        .is_err());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

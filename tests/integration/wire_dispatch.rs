#![allow(missing_docs)]

use std::sync::Arc;

use canopy::db::{DatabasePool, PoolConfig};
use canopy::server::dispatch::{self, GREETING};
use canopy::server::protocol;

fn pool(dir: &tempfile::TempDir) -> Arc<DatabasePool> {
    Arc::new(DatabasePool::new(PoolConfig {
        data_dir: dir.path().to_path_buf(),
        volatile: false,
    }))
}

fn ask(pool: &DatabasePool, tokens: &[&str]) -> String {
    let payload = tokens.join("\n");
    dispatch::handle_payload(pool, &payload).expect("dispatch")
}

#[test]
fn test_op_returns_the_greeting() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);
    assert_eq!(ask(&pool, &["USE", "db", "test"]), GREETING);
}

#[test]
fn unroutable_requests_get_the_malformed_sentinel() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);
    assert_eq!(ask(&pool, &["garbage"]), "-1");
    assert_eq!(ask(&pool, &["PUT", "db", "GET"]), "-1");
    assert_eq!(ask(&pool, &["USE", "bad-name", "GET"]), "-1");
    assert_eq!(ask(&pool, &["USE", "db", "FROB"]), "Unknown command.");
}

#[test]
fn set_get_del_round_trip_over_the_wire_shape() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    assert_eq!(ask(&pool, &["USE", "db", "SET", "fruit", "apple"]), "2");
    assert_eq!(ask(&pool, &["USE", "db", "SET", "fruit", "apple"]), "0");
    assert_eq!(ask(&pool, &["USE", "db", "GET", "fruit"]), "apple");
    assert_eq!(ask(&pool, &["USE", "db", "LS", "fruit"]), "apple");
    assert_eq!(ask(&pool, &["USE", "db", "COUNT", "fruit"]), "1");
    assert_eq!(ask(&pool, &["USE", "db", "IS", "fruit", "apple"]), "1");
    assert_eq!(ask(&pool, &["USE", "db", "DEL", "fruit", "apple"]), "1");
    assert_eq!(ask(&pool, &["USE", "db", "GET", "fruit"]), "<none>");
    assert_eq!(ask(&pool, &["USE", "db", "COUNT", "ghost"]), "-1");
    assert_eq!(ask(&pool, &["USE", "db", "IS", "ghost"]), "0");
}

#[test]
fn tree_and_empty_tree_sentinel() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    assert_eq!(ask(&pool, &["USE", "db", "TREE"]), "<empty>");
    ask(&pool, &["USE", "db", "SET", "a", "b"]);
    assert_eq!(ask(&pool, &["USE", "db", "TREE"]), "{\na\n{\nb\n}\n}");
    assert_eq!(ask(&pool, &["USE", "db", "TRE"]), "{\na\n{\nb\n}\n}");
    assert_eq!(ask(&pool, &["USE", "db", "TREEN"]), ask(&pool, &["USE", "db", "TREN"]));
}

#[test]
fn upd_splits_arguments_at_the_colon() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    ask(&pool, &["USE", "db", "SET", "users", "name"]);
    assert_eq!(
        ask(&pool, &["USE", "db", "UPD", "users", "name", ":", "nick"]),
        "0"
    );
    assert_eq!(ask(&pool, &["USE", "db", "GET", "users"]), "nick");
    // Missing one side of the split is unroutable.
    assert_eq!(ask(&pool, &["USE", "db", "UPD", "users", "name"]), "-1");
}

#[test]
fn use_reports_first_load_then_available() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    assert_eq!(ask(&pool, &["USE", "db", "USE", "other"]), "0");
    assert_eq!(ask(&pool, &["USE", "db", "USE", "other"]), "1");
    assert_eq!(ask(&pool, &["USE", "db", "USE", "no/slash"]), "-1");
    assert_eq!(ask(&pool, &["USE", "db", "USE", "a", "b"]), "-1");
}

#[test]
fn dblist_names_loaded_databases() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    ask(&pool, &["USE", "beta", "test"]);
    ask(&pool, &["USE", "alpha", "test"]);
    assert_eq!(ask(&pool, &["USE", "alpha", "DBLIST"]), "alpha\nbeta");
}

#[test]
fn compact_surfaces_unimplemented() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);
    assert_eq!(ask(&pool, &["USE", "db", "COMPACT"]), "-1");
}

#[test]
fn get_output_is_display_escaped() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    // A token with an escaped newline on the wire stores a real newline.
    let payload = protocol::build_payload("db", "SET", &["multi\nline".to_string()]);
    assert_eq!(dispatch::handle_payload(&pool, &payload).unwrap(), "1");
    // Rendered back out, the newline is visible as an escape again.
    assert_eq!(ask(&pool, &["USE", "db", "GET"]), "multi\\nline");
}

#[test]
fn frames_carry_requests_end_to_end() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let pool = pool(&dir);

    let payload = protocol::build_payload("db", "SET", &["k".to_string(), "v".to_string()]);
    let mut buffer = protocol::encode_frame(&payload).into_bytes();
    let extracted = protocol::next_frame(&mut buffer).unwrap().unwrap();
    assert_eq!(dispatch::handle_payload(&pool, &extracted).unwrap(), "2");
}

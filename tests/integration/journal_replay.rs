#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;

use canopy::db::{Database, PoolConfig};
use tempfile::TempDir;

fn config(dir: &TempDir) -> PoolConfig {
    PoolConfig {
        data_dir: dir.path().to_path_buf(),
        volatile: false,
    }
}

fn path(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

fn child_set(db: &Database, tokens: &[&str]) -> BTreeSet<String> {
    db.get(&path(tokens)).unwrap().values.into_iter().collect()
}

#[test]
fn reload_reproduces_child_sets() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["fruit", "apple"])).unwrap();
    db.set(&path(&["fruit", "pear"])).unwrap();
    db.set(&path(&["basket", "apple"])).unwrap();
    db.set(&path(&["fruit", "apple", "red"])).unwrap();
    db.del(&path(&["fruit", "pear"])).unwrap();
    let live_root = child_set(&db, &[]);
    let live_fruit = child_set(&db, &["fruit"]);
    let live_apple = child_set(&db, &["fruit", "apple"]);
    let nodes = db.node_count();
    let edges = db.edge_count();
    drop(db);

    let (db, stats) = Database::open("t", &config(&dir)).unwrap();
    assert_eq!(stats.nodes, nodes);
    assert_eq!(stats.edges, edges);
    assert_eq!(child_set(&db, &[]), live_root);
    assert_eq!(child_set(&db, &["fruit"]), live_fruit);
    assert_eq!(child_set(&db, &["fruit", "apple"]), live_apple);
    assert_eq!(child_set(&db, &["basket"]), ["apple".to_string()].into());
}

#[test]
fn reload_after_drop_is_empty() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["a", "b"])).unwrap();
    db.drop_all().unwrap();
    db.set(&path(&["after"])).unwrap();
    drop(db);

    let (db, _) = Database::open("t", &config(&dir)).unwrap();
    assert_eq!(db.node_count(), 1);
    assert_eq!(child_set(&db, &[]), ["after".to_string()].into());
}

#[test]
fn new_edge_ids_continue_past_reload() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["a", "b"])).unwrap();
    drop(db);

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["c"])).unwrap();
    drop(db);

    // Ids in file order: the post-reload edge must not collide with the
    // replayed ones.
    let journal = fs::read_to_string(dir.path().join("jrnl_t.txt")).unwrap();
    let mut ids = Vec::new();
    for line in journal.lines() {
        if let Some(rest) = line.strip_prefix("m|") {
            let (_, id) = rest.split_once('|').unwrap();
            ids.push(id.parse::<u64>().unwrap());
        }
    }
    assert_eq!(ids.len(), 3);
    assert!(ids[2] > ids[1]);
    let unique: BTreeSet<u64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn rename_of_a_sole_edge_survives_reload() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["a"])).unwrap();
    // Rename a leaf onto the same value: delete then re-set of one node.
    db.update(&path(&["a"]), &path(&["a"])).unwrap();
    assert_eq!(child_set(&db, &[]), ["a".to_string()].into());
    drop(db);

    let (db, _) = Database::open("t", &config(&dir)).unwrap();
    assert_eq!(child_set(&db, &[]), ["a".to_string()].into());
}

#[test]
fn comments_and_malformed_lines_do_not_stop_a_load() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let journal = dir.path().join("jrnl_t.txt");
    fs::write(&journal, "# hand-written note\ni|a\nm|0|1\nz|junk\nm\ni|b\nm|1|2\n").unwrap();

    let (db, stats) = Database::open("t", &config(&dir)).unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.edges, 2);
    assert!(db.is(&path(&["a", "b"])).unwrap());
}

#[test]
fn broken_id_references_fail_the_load() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let journal = dir.path().join("jrnl_t.txt");
    fs::write(&journal, "i|a\nm|0|1\nd|7|0\n").unwrap();

    let err = Database::open("t", &config(&dir)).unwrap_err();
    assert!(err.is_fatal(), "expected fatal corruption, got {err}");
}

#[test]
fn load_marks_accumulate_per_load() {
    let dir = tempfile::tempdir().expect("tmpdir");

    for _ in 0..2 {
        let (db, _) = Database::open("t", &config(&dir)).unwrap();
        drop(db);
    }
    let journal = fs::read_to_string(dir.path().join("jrnl_t.txt")).unwrap();
    assert_eq!(journal.lines().filter(|line| *line == "l").count(), 2);
}

#[test]
fn values_with_separators_and_newlines_round_trip() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["pi|pe", "multi\nline", "back\\slash"])).unwrap();
    drop(db);

    let (db, _) = Database::open("t", &config(&dir)).unwrap();
    assert_eq!(child_set(&db, &[]), ["pi|pe".to_string()].into());
    assert_eq!(child_set(&db, &["pi|pe"]), ["multi\nline".to_string()].into());
    assert!(db
        .is(&path(&["pi|pe", "multi\nline", "back\\slash"]))
        .unwrap());
}

#[test]
fn volatile_mode_still_replays_but_never_writes() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let (mut db, _) = Database::open("t", &config(&dir)).unwrap();
    db.set(&path(&["persisted"])).unwrap();
    drop(db);

    let volatile = PoolConfig {
        data_dir: dir.path().to_path_buf(),
        volatile: true,
    };
    let (mut db, _) = Database::open("t", &volatile).unwrap();
    assert!(db.is(&path(&["persisted"])).unwrap());
    db.set(&path(&["ephemeral"])).unwrap();
    drop(db);

    let (db, _) = Database::open("t", &config(&dir)).unwrap();
    assert!(db.is(&path(&["persisted"])).unwrap());
    assert!(!db.is(&path(&["ephemeral"])).unwrap());
}

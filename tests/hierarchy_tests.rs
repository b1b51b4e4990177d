//! Pass 1 tests: scanning a tree into the hierarchy map and reading it back.

use pretty_assertions::assert_eq;
use structdex::indexer::hierarchy::{self, HierarchyScanner};
use structdex::indexer::inheritance::{HierarchyIndex, ParentLookup};
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    dir
}

#[test]
fn nested_directories_are_scanned() {
    let dir = project(&[
        ("a/b/c/Deep.java", "package a.b.c; public class Deep { public void d() {} }"),
        ("Top.java", "public class Top extends Deep {}"),
        ("README.md", "not java"),
    ]);
    let map = HierarchyScanner::new().scan(dir.path()).unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Top", "a.b.c.Deep"]);
    assert_eq!(map["Top"].parent.as_deref(), Some("Deep"));
    assert!(map["Top"].public_methods.is_empty());
}

#[test]
fn interfaces_and_enums_are_not_classes() {
    let dir = project(&[(
        "Shapes.java",
        "interface Shape { double area(); } enum Kind { A, B } class Square { public double area() { return 1; } }",
    )]);
    let map = HierarchyScanner::new().scan(dir.path()).unwrap();
    assert_eq!(map.len(), 1);
    assert!(map.contains_key("Square"));
}

#[test]
fn persisted_map_drives_parent_lookup() {
    let dir = project(&[
        ("x/Base.java", "package x; public class Base { public void run() { go(); } }"),
        ("y/Base.java", "package y; public class Base { public void stop() { halt(); } }"),
    ]);
    let map = HierarchyScanner::new().scan(dir.path()).unwrap();
    let path = dir.path().join("hierarchy.json");
    hierarchy::persist(&map, &path).unwrap();

    let index = HierarchyIndex::new(hierarchy::load(&path).unwrap());
    // Same package wins when the simple name is ambiguous.
    assert_eq!(index.inherited_methods("Base", "y"), vec!["stop"]);
    assert_eq!(index.inherited_methods("Base", "x"), vec!["run"]);
    assert!(matches!(index.lookup("Missing", "x"), ParentLookup::Missing));
}

#[test]
fn corrupt_hierarchy_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hierarchy.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_eq!(hierarchy::load(&path).unwrap_err().kind(), "JsonError");
    assert!(hierarchy::load_or_empty(&path).is_empty());
}

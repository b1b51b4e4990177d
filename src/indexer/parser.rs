//! Native tree-sitter wrapper for Java sources.
//!
//! `CodeParser` carries no fields. Tree-sitter's `Parser` is `!Send`, so a
//! fresh one is created on every call; `Parser::new()` is a single
//! allocation and `set_language` is a pointer swap. That keeps the wrapper
//! usable from rayon workers during the hierarchy scan.
//!
//! The free functions below are the node queries shared by the hierarchy
//! scanner and the structural parser: byte-range text, kind search, and the
//! handful of Java declaration lookups both passes need to agree on.

use std::path::Path;

use tree_sitter::Node;

use crate::error::{Result, StructdexError};
use crate::types::NO_PACKAGE;

/// Extension of the source files this crate indexes.
pub const JAVA_EXTENSION: &str = "java";

/// Node kinds that can carry a type in a superclass clause or parameter.
const TYPE_NODE_KINDS: &[&str] = &[
    "type_identifier",
    "generic_type",
    "scoped_type_identifier",
    "array_type",
    "integral_type",
    "floating_point_type",
    "boolean_type",
    "void_type",
];

/// Thin wrapper around native tree-sitter parsing for Java.
pub struct CodeParser;

impl CodeParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse `content` (read from `path`) into a concrete syntax tree.
    pub fn parse(&self, path: &Path, content: &str) -> Result<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Self::language())
            .map_err(|e| StructdexError::parse(path, format!("Language version mismatch: {e}")))?;

        parser.parse(content, None).ok_or_else(|| {
            StructdexError::parse(path, "tree-sitter returned None (timeout or cancellation)")
        })
    }

    /// Read and parse the file at `path`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected so one stray byte in a
    /// comment does not cost us the whole file.
    pub fn parse_file(&self, path: &Path) -> Result<(String, tree_sitter::Tree)> {
        if !path.exists() {
            return Err(StructdexError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes).into_owned();
        let tree = self.parse(path, &source)?;
        Ok((source, tree))
    }

    #[must_use]
    pub fn language() -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    /// Whether `path` has the `.java` extension.
    #[must_use]
    pub fn is_supported(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(JAVA_EXTENSION)
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Node queries
// ---------------------------------------------------------------------------

/// Source text covered by `node`.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All descendants of `node` (including `node`) of the given kind, pre-order.
pub fn find_nodes_by_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    collect_by_kind(node, kind, &mut found);
    found
}

fn collect_by_kind<'t>(node: Node<'t>, kind: &str, out: &mut Vec<Node<'t>>) {
    if node.kind() == kind {
        out.push(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_by_kind(child, kind, out);
    }
}

/// First direct child of `node` with the given kind.
pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// Package declared in the compilation unit, or [`NO_PACKAGE`].
pub fn package_name(root: Node<'_>, source: &str) -> String {
    let Some(decl) = child_of_kind(root, "package_declaration") else {
        return NO_PACKAGE.to_string();
    };
    let mut cursor = decl.walk();
    let name = decl
        .children(&mut cursor)
        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        .map(|c| node_text(c, source).trim().to_string());
    match name {
        Some(name) if !name.is_empty() => name,
        // Fallback: strip the keyword and terminator from the raw text.
        _ => {
            let raw = node_text(decl, source)
                .replace("package", "")
                .replace(';', "");
            let raw = raw.trim();
            if raw.is_empty() {
                NO_PACKAGE.to_string()
            } else {
                raw.to_string()
            }
        }
    }
}

/// Text of a node that is really present in the source. Error recovery
/// inserts zero-width MISSING nodes; those count as absent.
pub fn present_text<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    let text = node_text(node, source);
    (!node.is_missing() && !text.is_empty()).then_some(text)
}

/// Text of the `field` child of `node`, if present in the source.
pub fn field_text<'s>(node: Node<'_>, field: &str, source: &'s str) -> Option<&'s str> {
    present_text(node.child_by_field_name(field)?, source)
}

/// Simple name of a class declaration (its first identifier child).
pub fn class_name(class_node: Node<'_>, source: &str) -> Option<String> {
    let name = child_of_kind(class_node, "identifier")?;
    present_text(name, source).map(str::to_string)
}

/// Type named in the `extends` clause, generic arguments truncated.
pub fn parent_class(class_node: Node<'_>, source: &str) -> Option<String> {
    let superclass = child_of_kind(class_node, "superclass")?;
    let mut cursor = superclass.walk();
    let type_node = superclass.children(&mut cursor).find(|c| {
        matches!(
            c.kind(),
            "type_identifier" | "generic_type" | "scoped_type_identifier"
        )
    })?;
    let raw = node_text(type_node, source);
    let name = strip_generics(raw).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Everything before the first `<`.
pub fn strip_generics(type_text: &str) -> &str {
    match type_text.find('<') {
        Some(idx) => &type_text[..idx],
        None => type_text,
    }
}

/// The `class_body` child of a class declaration.
pub fn class_body(class_node: Node<'_>) -> Option<Node<'_>> {
    class_node
        .child_by_field_name("body")
        .or_else(|| child_of_kind(class_node, "class_body"))
}

/// Whether a declaration's `modifiers` child contains the given keyword.
///
/// Keywords are anonymous nodes whose kind equals their text, so an
/// annotation like `@PublicApi` never counts as `public`.
pub fn has_modifier(decl: Node<'_>, keyword: &str) -> bool {
    let Some(modifiers) = child_of_kind(decl, "modifiers") else {
        return false;
    };
    let mut cursor = modifiers.walk();
    let found = modifiers.children(&mut cursor).any(|c| c.kind() == keyword);
    found
}

/// Modifier words of a declaration (annotations included), in source order.
pub fn modifier_words(decl: Node<'_>, source: &str) -> Vec<String> {
    child_of_kind(decl, "modifiers")
        .map(|m| {
            node_text(m, source)
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `kind` names a node that spells a type.
pub fn is_type_kind(kind: &str) -> bool {
    TYPE_NODE_KINDS.contains(&kind)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
package com.example.animals;

import java.util.List;

public class Dog extends Animal<String> implements Pet {
    private String breed;

    @Override
    public void bark() {
        System.out.println("Woof");
    }

    void wag() {}
}
"#;

    fn parse(source: &str) -> tree_sitter::Tree {
        CodeParser::new()
            .parse(Path::new("Dog.java"), source)
            .expect("should parse Java")
    }

    #[test]
    fn parse_java_returns_valid_tree() {
        let tree = parse(SOURCE);
        let root = tree.root_node();
        assert_eq!(root.kind(), "program");
        assert!(!root.has_error(), "tree should be error-free");
    }

    #[test]
    fn parse_empty_source_returns_tree() {
        let tree = parse("");
        assert_eq!(tree.root_node().child_count(), 0);
    }

    #[test]
    fn extracts_package_name() {
        let tree = parse(SOURCE);
        assert_eq!(package_name(tree.root_node(), SOURCE), "com.example.animals");
    }

    #[test]
    fn missing_package_is_sentinel() {
        let src = "class A {}";
        let tree = parse(src);
        assert_eq!(package_name(tree.root_node(), src), NO_PACKAGE);
    }

    #[test]
    fn recovered_method_name_is_absent() {
        let src = "class C { public int good() { return 1; } public int (int a) { return a; } }";
        let tree = parse(src);
        let names: Vec<Option<&str>> = find_nodes_by_kind(tree.root_node(), "method_declaration")
            .into_iter()
            .map(|m| field_text(m, "name", src))
            .collect();
        assert_eq!(names.first().copied().flatten(), Some("good"));
        assert!(names.iter().skip(1).all(Option::is_none));
    }

    #[test]
    fn class_name_and_parent_strip_generics() {
        let tree = parse(SOURCE);
        let classes = find_nodes_by_kind(tree.root_node(), "class_declaration");
        assert_eq!(classes.len(), 1);
        assert_eq!(class_name(classes[0], SOURCE).as_deref(), Some("Dog"));
        assert_eq!(parent_class(classes[0], SOURCE).as_deref(), Some("Animal"));
    }

    #[test]
    fn scoped_parent_is_kept_whole() {
        let src = "class A extends com.lib.Base {}";
        let tree = parse(src);
        let class = find_nodes_by_kind(tree.root_node(), "class_declaration")[0];
        assert_eq!(parent_class(class, src).as_deref(), Some("com.lib.Base"));
    }

    #[test]
    fn no_extends_means_no_parent() {
        let src = "class A {}";
        let tree = parse(src);
        let class = find_nodes_by_kind(tree.root_node(), "class_declaration")[0];
        assert_eq!(parent_class(class, src), None);
    }

    #[test]
    fn modifier_detection_ignores_annotations() {
        let src = "class A { @PublicApi void hidden() { run(); } public void shown() { run(); } }";
        let tree = parse(src);
        let methods = find_nodes_by_kind(tree.root_node(), "method_declaration");
        assert_eq!(methods.len(), 2);
        assert!(!has_modifier(methods[0], "public"));
        assert!(has_modifier(methods[1], "public"));
    }

    #[test]
    fn modifier_words_include_annotations() {
        let tree = parse(SOURCE);
        let bark = find_nodes_by_kind(tree.root_node(), "method_declaration")[0];
        assert_eq!(modifier_words(bark, SOURCE), vec!["@Override", "public"]);
    }

    #[test]
    fn collapse_whitespace_joins_runs() {
        assert_eq!(
            collapse_whitespace("  private   int\n\t count = 0; "),
            "private int count = 0;"
        );
    }

    #[test]
    fn is_supported_checks_extension() {
        assert!(CodeParser::is_supported(Path::new("src/Dog.java")));
        assert!(!CodeParser::is_supported(Path::new("src/Dog.kt")));
        assert!(!CodeParser::is_supported(Path::new("README")));
    }

    #[test]
    fn parse_file_missing_is_not_found() {
        let err = CodeParser::new()
            .parse_file(Path::new("/definitely/not/here/X.java"))
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}

//! Pass 2: context-aware structural parsing.
//!
//! Every public method and constructor with a non-trivial body becomes a
//! [`MethodChunk`] carrying the class context (package, fields, parent and
//! transitively inherited public methods), a normalized signature, the
//! custom parameter types it depends on, and a content-addressed id.
//!
//! # Signature format
//!
//! ```text
//! [modifiers] returnType name(Type a, Type b)
//! [modifiers] <Constructor> ClassName(Type a)
//! ```
//!
//! Parameter types are shown as written (generics and arrays kept); they
//! are only stripped for dependency tracking.

use std::path::Path;
use std::sync::Arc;

use tree_sitter::Node;

use crate::error::Result;
use crate::indexer::hierarchy;
use crate::indexer::identity::chunk_id;
use crate::indexer::inheritance::HierarchyIndex;
use crate::indexer::parser::{self, CodeParser};
use crate::types::{MethodChunk, CONSTRUCTOR_NAME};

/// Parameter types that never count as dependencies.
const EXCLUDED_DEPENDENCY_TYPES: &[&str] = &[
    // Primitives and wrappers
    "int", "Integer", "long", "Long", "short", "Short", "byte", "Byte", "float", "Float",
    "double", "Double", "boolean", "Boolean", "char", "Character", "void", "Void",
    // Core types
    "String", "Object",
    // Collections
    "List", "ArrayList", "Set", "HashSet", "Map", "HashMap", "Collection", "Iterable",
    "Iterator",
    // Other common types
    "Optional", "Stream",
];

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// One formal parameter of a method or constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Declared type as written, e.g. `List<Transaction>` or `int[]`.
    pub type_text: String,
    pub name: Option<String>,
    /// Trailing `...` parameter.
    pub variadic: bool,
}

impl Parameter {
    /// `Type name` as shown in a signature.
    pub fn display(&self) -> String {
        let ty = if self.variadic {
            format!("{}...", self.type_text)
        } else {
            self.type_text.clone()
        };
        match &self.name {
            Some(name) => format!("{ty} {name}"),
            None => ty,
        }
    }

    /// Type with generic arguments and array suffixes removed.
    pub fn base_type(&self) -> String {
        parser::strip_generics(&self.type_text)
            .replace("[]", "")
            .trim()
            .to_string()
    }
}

/// Parameter types minus the exclusion set, de-duplicated in first-seen order.
pub fn dependency_types(params: &[Parameter]) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for param in params {
        let base = param.base_type();
        if base.is_empty() || EXCLUDED_DEPENDENCY_TYPES.contains(&base.as_str()) {
            continue;
        }
        if !deps.contains(&base) {
            deps.push(base);
        }
    }
    deps
}

/// Whether a body is empty or holds nothing but comments.
pub fn is_empty_body(body: &str) -> bool {
    let mut inner = body.trim();
    if let Some(stripped) = inner.strip_prefix('{').and_then(|b| b.strip_suffix('}')) {
        inner = stripped.trim();
    }
    inner
        .lines()
        .map(str::trim)
        .all(|line| {
            line.is_empty() || line.starts_with("//") || line.starts_with("/*") || line.starts_with('*')
        })
}

/// Compose the class context descriptor attached to every chunk of a class.
pub fn format_class_context(
    package: &str,
    class_name: &str,
    fields: &[String],
    parent: Option<&str>,
    inherited: &[String],
) -> String {
    let fields = if fields.is_empty() {
        "None".to_string()
    } else {
        fields.join("; ")
    };
    let mut context = format!("Package: {package}, Class: {class_name}, Fields: {fields}");

    if let Some(parent) = parent {
        context.push_str(&format!(", Extends: {parent}"));
        if !inherited.is_empty() {
            context.push_str(&format!(", Inherited Methods: [{}]", inherited.join(", ")));
        }
    }
    context
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Per-class facts shared by all members of one declaration.
struct ClassScope {
    package: String,
    name: String,
    inherited: Vec<String>,
    context: String,
}

/// Extracts [`MethodChunk`]s from Java files against a shared hierarchy.
pub struct StructuralParser {
    parser: CodeParser,
    hierarchy: Arc<HierarchyIndex>,
}

impl StructuralParser {
    pub fn new(hierarchy: Arc<HierarchyIndex>) -> Self {
        Self {
            parser: CodeParser::new(),
            hierarchy,
        }
    }

    /// Load the persisted hierarchy file; a missing file means no
    /// inheritance context.
    pub fn from_hierarchy_file(path: &Path, max_depth: usize) -> Self {
        let map = hierarchy::load_or_empty(path);
        Self::new(Arc::new(HierarchyIndex::new(map).with_max_depth(max_depth)))
    }

    /// Parser with an empty hierarchy.
    pub fn without_hierarchy() -> Self {
        Self::new(Arc::new(HierarchyIndex::default()))
    }

    pub fn hierarchy(&self) -> &HierarchyIndex {
        &self.hierarchy
    }

    /// Parse one file on disk.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<MethodChunk>> {
        let (source, tree) = self.parser.parse_file(path)?;
        Ok(self.extract(path, tree.root_node(), &source))
    }

    /// Parse in-memory source attributed to `path`.
    pub fn parse_source(&self, path: &Path, source: &str) -> Result<Vec<MethodChunk>> {
        let tree = self.parser.parse(path, source)?;
        Ok(self.extract(path, tree.root_node(), source))
    }

    fn extract(&self, path: &Path, root: Node<'_>, source: &str) -> Vec<MethodChunk> {
        let package = parser::package_name(root, source);
        let mut chunks = Vec::new();

        for class_node in parser::find_nodes_by_kind(root, "class_declaration") {
            let Some(scope) = self.class_scope(class_node, source, &package) else {
                tracing::debug!(
                    "skipping unnamed class declaration in {} at byte {}",
                    path.display(),
                    class_node.start_byte()
                );
                continue;
            };
            let Some(body) = parser::class_body(class_node) else {
                continue;
            };

            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                let is_constructor = match member.kind() {
                    "method_declaration" => false,
                    "constructor_declaration" => true,
                    _ => continue,
                };
                if !parser::has_modifier(member, "public") {
                    continue;
                }
                if let Some(chunk) = extract_member(member, source, &scope, is_constructor) {
                    chunks.push(chunk);
                }
            }
        }

        tracing::debug!("{}: {} chunks", path.display(), chunks.len());
        chunks
    }

    fn class_scope(&self, class_node: Node<'_>, source: &str, package: &str) -> Option<ClassScope> {
        let name = parser::class_name(class_node, source)?;
        let fields = class_fields(class_node, source);
        let parent = parser::parent_class(class_node, source);
        let inherited = parent
            .as_deref()
            .map(|p| self.hierarchy.inherited_methods(p, package))
            .unwrap_or_default();
        let context = format_class_context(package, &name, &fields, parent.as_deref(), &inherited);

        Some(ClassScope {
            package: package.to_string(),
            name,
            inherited,
            context,
        })
    }
}

/// Field declarations of a class body, whitespace-collapsed.
fn class_fields(class_node: Node<'_>, source: &str) -> Vec<String> {
    let Some(body) = parser::class_body(class_node) else {
        return Vec::new();
    };
    let mut cursor = body.walk();
    let fields = body
        .children(&mut cursor)
        .filter(|c| c.kind() == "field_declaration")
        .map(|c| parser::collapse_whitespace(parser::node_text(c, source)))
        .collect();
    fields
}

/// Build the chunk for one public method or constructor, or `None` when the
/// declaration is malformed, has no body, or its body is empty.
fn extract_member(
    node: Node<'_>,
    source: &str,
    scope: &ClassScope,
    is_constructor: bool,
) -> Option<MethodChunk> {
    let body = node
        .child_by_field_name("body")
        .map(|b| parser::node_text(b, source).trim().to_string())?;
    if is_empty_body(&body) {
        return None;
    }

    let params = node
        .child_by_field_name("parameters")
        .map(|p| extract_parameters(p, source))
        .unwrap_or_default();
    let params_display = params
        .iter()
        .map(Parameter::display)
        .collect::<Vec<_>>()
        .join(", ");

    let mut parts = parser::modifier_words(node, source);
    let method_name = if is_constructor {
        parts.push(CONSTRUCTOR_NAME.to_string());
        parts.push(format!("{}({params_display})", scope.name));
        CONSTRUCTOR_NAME.to_string()
    } else {
        let Some(name) = parser::field_text(node, "name", source) else {
            tracing::debug!(
                "skipping method declaration without a name in {} at byte {}",
                scope.name,
                node.start_byte()
            );
            return None;
        };
        let name = name.to_string();
        let return_type = node
            .child_by_field_name("type")
            .map(|t| parser::collapse_whitespace(parser::node_text(t, source)))
            .unwrap_or_else(|| "void".to_string());
        parts.push(return_type);
        parts.push(format!("{name}({params_display})"));
        name
    };
    let signature = parts.join(" ");

    Some(MethodChunk {
        id: chunk_id(&scope.context, &signature),
        method_name,
        signature,
        body,
        class_context: scope.context.clone(),
        dependency_types: dependency_types(&params),
        package: scope.package.clone(),
        class_name: scope.name.clone(),
        inherited_methods: scope.inherited.clone(),
        file_path: None,
    })
}

/// Parameters of a `formal_parameters` node, including varargs.
fn extract_parameters(params_node: Node<'_>, source: &str) -> Vec<Parameter> {
    let mut cursor = params_node.walk();
    let mut params = Vec::new();

    for child in params_node.children(&mut cursor) {
        match child.kind() {
            "formal_parameter" => {
                let Some(type_node) = child.child_by_field_name("type") else {
                    continue;
                };
                let mut type_text = parser::collapse_whitespace(parser::node_text(type_node, source));
                if let Some(dims) = child.child_by_field_name("dimensions") {
                    type_text.push_str(&parser::collapse_whitespace(parser::node_text(dims, source)));
                }
                params.push(Parameter {
                    type_text,
                    name: child
                        .child_by_field_name("name")
                        .map(|n| parser::node_text(n, source).to_string()),
                    variadic: false,
                });
            }
            "spread_parameter" => {
                let mut inner = child.walk();
                let type_node = child.children(&mut inner).find(|c| parser::is_type_kind(c.kind()));
                let Some(type_node) = type_node else {
                    continue;
                };
                let name = parser::child_of_kind(child, "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"))
                    .map(|n| parser::node_text(n, source).to_string());
                params.push(Parameter {
                    type_text: parser::collapse_whitespace(parser::node_text(type_node, source)),
                    name,
                    variadic: true,
                });
            }
            _ => {}
        }
    }
    params
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

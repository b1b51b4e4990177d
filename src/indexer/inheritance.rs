//! Parent lookup and transitive inherited-method resolution.
//!
//! Lookups are two-tier: an exact fully-qualified key first, then a
//! heuristic match on simple name or `.Name` key suffix for parents written
//! without their package. When the heuristic finds several classes the
//! outcome is [`ParentLookup::Ambiguous`]: a candidate from the child's own
//! package wins, otherwise the first key in map order.
//!
//! The index is immutable after construction and shared behind an `Arc` by
//! every parser instance.

use std::collections::HashSet;

use crate::types::{package_of, ClassRecord, HierarchyMap};

/// Default cap on ancestor chain length.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Outcome of resolving a parent type name against the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLookup<'a> {
    /// The name is a key in the map.
    Exact {
        key: &'a str,
        record: &'a ClassRecord,
    },
    /// Exactly one class matched by simple name or key suffix.
    Heuristic {
        key: &'a str,
        record: &'a ClassRecord,
    },
    /// Several classes matched; `key` is the one chosen.
    Ambiguous {
        key: &'a str,
        record: &'a ClassRecord,
        candidates: Vec<&'a str>,
    },
    /// Not part of the scanned tree (library or JDK type).
    Missing,
}

impl<'a> ParentLookup<'a> {
    /// The resolved class, if any.
    pub fn resolved(&self) -> Option<(&'a str, &'a ClassRecord)> {
        match self {
            Self::Exact { key, record }
            | Self::Heuristic { key, record }
            | Self::Ambiguous { key, record, .. } => Some((key, record)),
            Self::Missing => None,
        }
    }
}

/// Read-only view of the project hierarchy used during structural parsing.
#[derive(Debug, Clone)]
pub struct HierarchyIndex {
    map: HierarchyMap,
    max_depth: usize,
}

impl Default for HierarchyIndex {
    fn default() -> Self {
        Self::new(HierarchyMap::new())
    }
}

impl HierarchyIndex {
    pub fn new(map: HierarchyMap) -> Self {
        Self {
            map,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ClassRecord> {
        self.map.get(key)
    }

    /// Resolve `parent` as written in a class declared in `from_package`.
    pub fn lookup(&self, parent: &str, from_package: &str) -> ParentLookup<'_> {
        if let Some((key, record)) = self.map.get_key_value(parent) {
            return ParentLookup::Exact {
                key: key.as_str(),
                record,
            };
        }

        let suffix = format!(".{parent}");
        let candidates: Vec<(&str, &ClassRecord)> = self
            .map
            .iter()
            .filter(|(key, record)| record.simple_name == parent || key.ends_with(&suffix))
            .map(|(key, record)| (key.as_str(), record))
            .collect();

        match candidates.len() {
            0 => ParentLookup::Missing,
            1 => ParentLookup::Heuristic {
                key: candidates[0].0,
                record: candidates[0].1,
            },
            _ => {
                let (key, record) = candidates
                    .iter()
                    .find(|(key, _)| package_of(key) == from_package)
                    .copied()
                    .unwrap_or(candidates[0]);
                ParentLookup::Ambiguous {
                    key,
                    record,
                    candidates: candidates.iter().map(|(k, _)| *k).collect(),
                }
            }
        }
    }

    /// Public methods inherited through the whole ancestor chain of a class
    /// declared in `from_package` that extends `parent`.
    ///
    /// Each ancestor contributes its own declared methods in declaration
    /// order, nearest ancestor first. The walk stops at the first ancestor
    /// missing from the map, at a class with no parent, on a repeated class,
    /// or after `max_depth` ancestors.
    pub fn inherited_methods(&self, parent: &str, from_package: &str) -> Vec<String> {
        let mut methods = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = parent.to_string();
        let mut package = from_package.to_string();

        for _ in 0..self.max_depth {
            let lookup = self.lookup(&current, &package);
            if let ParentLookup::Ambiguous {
                key, candidates, ..
            } = &lookup
            {
                tracing::warn!(
                    "ambiguous parent {current} (from package {package}): candidates {candidates:?}, using {key}"
                );
            }
            let Some((key, record)) = lookup.resolved() else {
                return methods;
            };
            if !visited.insert(key) {
                tracing::warn!("inheritance cycle through {key}; stopping ancestor walk");
                return methods;
            }

            methods.extend(record.public_methods.iter().cloned());

            match &record.parent {
                Some(next) => {
                    current = next.clone();
                    package = package_of(key).to_string();
                }
                None => return methods,
            }
        }

        tracing::warn!(
            "ancestor chain of {parent} exceeds {} levels; truncating",
            self.max_depth
        );
        methods
    }
}

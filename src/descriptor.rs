//! Descriptor sets
//!
//! A descriptor payload is the JSON encoding of a [`DescriptorSet`]: a list
//! of files, each declaring a package, the files it depends on, message
//! types, and extensions (reusable rule annotations). Every type is a JSON
//! Schema. Types reference each other with
//! `{"$ref": "#/definitions/<package>.<Name>"}`.
//!
//! Resolution checks the set is self-contained before any engine sees it:
//! - file names are unique and every dependency is present
//! - the file dependency graph is acyclic
//! - fully-qualified type names are well-formed and unique
//! - every `$ref` points at a type declared in the same file or in one of
//!   its transitive dependencies

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Prefix of references to other declared types
pub const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// A complete, self-contained set of schema files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSet {
    pub files: Vec<FileDescriptor>,
}

/// One schema file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Unique path-like name (e.g. "user/v1/user.json")
    pub name: String,
    /// Dotted package prefix for the types in this file (e.g. "user.v1")
    #[serde(default)]
    pub package: String,
    /// Names of files whose types this file references
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub messages: Vec<TypeDescriptor>,
    /// Rule annotations shared by messages
    #[serde(default)]
    pub extensions: Vec<TypeDescriptor>,
}

/// A named JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Message,
    Extension,
}

/// A type after resolution
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub full_name: String,
    pub kind: TypeKind,
    /// Name of the declaring file
    pub file: String,
    pub schema: Value,
}

/// The fully resolved, consistent set of types from one descriptor set
#[derive(Debug, Clone, Default)]
pub struct ResolvedDescriptors {
    types: BTreeMap<String, ResolvedType>,
}

impl ResolvedDescriptors {
    pub fn get(&self, full_name: &str) -> Option<&ResolvedType> {
        self.types.get(full_name)
    }

    /// All types, messages and extensions, ordered by name
    pub fn types(&self) -> impl Iterator<Item = &ResolvedType> {
        self.types.values()
    }

    pub fn messages(&self) -> impl Iterator<Item = &ResolvedType> {
        self.types.values().filter(|t| t.kind == TypeKind::Message)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &ResolvedType> {
        self.types.values().filter(|t| t.kind == TypeKind::Extension)
    }

    pub fn message_names(&self) -> Vec<String> {
        self.messages().map(|t| t.full_name.clone()).collect()
    }
}

impl DescriptorSet {
    /// Decode descriptor payload bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SchemaError::Descriptor(format!("payload is not a descriptor set: {}", e)))
    }

    /// Resolve every type and check the set is consistent
    pub fn resolve(&self) -> Result<ResolvedDescriptors> {
        let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(self.files.len(), self.files.len());
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::with_capacity(self.files.len());

        for file in &self.files {
            if file.name.is_empty() {
                return Err(SchemaError::Descriptor("file with empty name".to_string()));
            }
            if nodes.insert(file.name.as_str(), graph.add_node(file.name.as_str())).is_some() {
                return Err(SchemaError::Descriptor(format!("duplicate file '{}'", file.name)));
            }
        }

        for file in &self.files {
            let from = nodes[file.name.as_str()];
            for dep in &file.dependencies {
                let to = nodes.get(dep.as_str()).ok_or_else(|| {
                    SchemaError::Descriptor(format!(
                        "file '{}' depends on '{}', which is not in the set",
                        file.name, dep
                    ))
                })?;
                graph.add_edge(from, *to, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(SchemaError::Descriptor(format!(
                "dependency cycle involving file '{}'",
                graph[cycle.node_id()]
            )));
        }

        let mut owners: HashMap<String, NodeIndex> = HashMap::new();
        let mut types = BTreeMap::new();
        for file in &self.files {
            if !file.package.is_empty() && !file.package.split('.').all(is_identifier) {
                return Err(SchemaError::Descriptor(format!(
                    "file '{}' has invalid package '{}'",
                    file.name, file.package
                )));
            }

            let declared = file
                .messages
                .iter()
                .map(|t| (TypeKind::Message, t))
                .chain(file.extensions.iter().map(|t| (TypeKind::Extension, t)));
            for (kind, ty) in declared {
                if !is_identifier(&ty.name) {
                    return Err(SchemaError::Descriptor(format!(
                        "invalid type name '{}' in file '{}'",
                        ty.name, file.name
                    )));
                }
                let full_name = full_name(&file.package, &ty.name);
                if kind == TypeKind::Message {
                    check_message_schema(&full_name, &ty.schema)?;
                }
                if owners.insert(full_name.clone(), nodes[file.name.as_str()]).is_some() {
                    return Err(SchemaError::Descriptor(format!("duplicate type '{}'", full_name)));
                }
                types.insert(
                    full_name.clone(),
                    ResolvedType {
                        full_name,
                        kind,
                        file: file.name.clone(),
                        schema: ty.schema.clone(),
                    },
                );
            }
        }

        let mut visible: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
        for ty in types.values() {
            let node = nodes[ty.file.as_str()];
            let reachable = visible.entry(node).or_insert_with(|| {
                let mut seen = HashSet::new();
                let mut dfs = Dfs::new(&graph, node);
                while let Some(n) = dfs.next(&graph) {
                    seen.insert(n);
                }
                seen
            });

            let mut refs = Vec::new();
            collect_refs(&ty.schema, &mut refs);
            for reference in refs {
                check_ref(ty, reference, &owners, reachable)?;
            }
        }

        Ok(ResolvedDescriptors { types })
    }
}

fn full_name(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_message_schema(full_name: &str, schema: &Value) -> Result<()> {
    let obj = schema.as_object().ok_or_else(|| {
        SchemaError::Descriptor(format!("message '{}' schema must be a JSON object", full_name))
    })?;
    if obj.contains_key("definitions") {
        return Err(SchemaError::Descriptor(format!(
            "message '{}' declares 'definitions', which is reserved for resolved types",
            full_name
        )));
    }
    Ok(())
}

fn check_ref(
    ty: &ResolvedType,
    reference: &str,
    owners: &HashMap<String, NodeIndex>,
    reachable: &HashSet<NodeIndex>,
) -> Result<()> {
    if let Some(rest) = reference.strip_prefix(DEFINITIONS_PREFIX) {
        let target = rest.split('/').next().unwrap_or_default();
        return match owners.get(target) {
            Some(owner) if reachable.contains(owner) => Ok(()),
            Some(_) => Err(SchemaError::Descriptor(format!(
                "'{}' references '{}' from a file that is not a dependency of '{}'",
                ty.full_name, target, ty.file
            ))),
            None => Err(SchemaError::Descriptor(format!(
                "'{}' references unknown type '{}'",
                ty.full_name, target
            ))),
        };
    }
    // Pointers into the type's own schema
    if reference == "#" || reference.starts_with("#/") {
        return Ok(());
    }
    Err(SchemaError::Descriptor(format!(
        "'{}' uses external reference '{}'",
        ty.full_name, reference
    )))
}

/// Collect every `$ref` string in a schema
fn collect_refs<'a>(json: &'a Value, refs: &mut Vec<&'a str>) {
    match json {
        Value::Object(obj) => {
            for (key, value) in obj {
                match (key.as_str(), value) {
                    ("$ref", Value::String(target)) => refs.push(target),
                    _ => collect_refs(value, refs),
                }
            }
        }
        Value::Array(arr) => {
            for item in arr {
                collect_refs(item, refs);
            }
        }
        _ => {}
    }
}

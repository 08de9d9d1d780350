//! Static per-process metadata describing each object type: its composite
//! key layout, expiry policy and dependency edges.
//!
//! The graph is loaded once at startup from whatever source the host uses
//! (file, database, embedded tables) and is immutable afterwards. Deployment
//! overrides from [`CacheSettings`] are folded in at load time: expiry
//! overrides replace declared values, and ignore rules prune dependency
//! edges before anything else sees them. A load failure is fatal — the
//! owning process must not start without a usable graph.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::CacheSettings;
use crate::enums::ExpiryStrategy;
use crate::error::ConfigError;

/// One component of a composite key: where to read it and its position.
///
/// Orders within a key are a contiguous `1..=N` permutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyField {
    /// Path expression into the instance, in [`FieldReader`](crate::FieldReader) grammar.
    pub path: String,
    /// 1-based position within the flattened key.
    pub order: u32,
}

impl KeyField {
    pub fn new(path: impl Into<String>, order: u32) -> Self {
        Self {
            path: path.into(),
            order,
        }
    }
}

/// One candidate target of an indicator edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorCandidate {
    /// Target object type name.
    pub target: String,
    /// Paths into the *source* instance holding the candidate's key values.
    pub source_paths: Vec<KeyField>,
}

/// A dependency edge from one object type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyEdge {
    /// Fixed-target reference. With `list_path` set the source may carry
    /// zero or many instances of the dependency, found by probing
    /// `list_path[1]`, `list_path[2]`, … on the source instance.
    Direct {
        target: String,
        source_paths: Vec<KeyField>,
        list_path: Option<String>,
    },
    /// Closed-world polymorphic reference: which candidate applies is
    /// decided at runtime by which candidate's source paths all resolve,
    /// first declared match winning.
    Indicator { candidates: Vec<IndicatorCandidate> },
}

impl DependencyEdge {
    /// All type names this edge can resolve to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            DependencyEdge::Direct { target, .. } => vec![target.as_str()],
            DependencyEdge::Indicator { candidates } => {
                candidates.iter().map(|c| c.target.as_str()).collect()
            }
        }
    }
}

/// Type metadata: key layout, expiry policy, dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    /// Key components, held sorted by `order` after load.
    pub key_fields: Vec<KeyField>,
    /// Separator joining key component values; may be empty only for
    /// single-component keys.
    pub key_separator: String,
    /// Expiry window in minutes for cached entries of this type.
    pub expiry_minutes: i64,
    /// What to do when such an entry expires unresolved.
    pub expiry_strategy: ExpiryStrategy,
    pub dependencies: Vec<DependencyEdge>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, key_fields: Vec<KeyField>) -> Self {
        Self {
            name: name.into(),
            key_fields,
            key_separator: "|".to_string(),
            expiry_minutes: 0,
            expiry_strategy: ExpiryStrategy::Unknown,
            dependencies: Vec::new(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = separator.into();
        self
    }

    pub fn with_expiry(mut self, minutes: i64, strategy: ExpiryStrategy) -> Self {
        self.expiry_minutes = minutes;
        self.expiry_strategy = strategy;
        self
    }

    pub fn with_dependency(mut self, edge: DependencyEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    /// Key component paths in flattening order.
    pub fn ordered_key_paths(&self) -> impl Iterator<Item = &str> {
        self.key_fields.iter().map(|k| k.path.as_str())
    }
}

/// The loaded, override-pruned registry of object types.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    types: HashMap<String, ObjectType>,
    depended_upon: HashSet<String>,
}

impl TypeGraph {
    /// Build the graph from raw type declarations, applying deployment
    /// overrides and validating the result.
    pub fn load(types: Vec<ObjectType>, settings: &CacheSettings) -> Result<Self, ConfigError> {
        if types.is_empty() {
            return Err(ConfigError::EmptyTypeGraph);
        }
        settings.validate()?;

        let known_names: HashSet<String> = types.iter().map(|t| t.name.clone()).collect();
        if known_names.len() != types.len() {
            let mut seen = HashSet::new();
            for t in &types {
                if !seen.insert(t.name.as_str()) {
                    return Err(ConfigError::DuplicateType {
                        name: t.name.clone(),
                    });
                }
            }
        }

        let mut loaded = HashMap::with_capacity(types.len());
        for mut ty in types {
            validate_key_fields(&ty.name, &mut ty.key_fields)?;
            if ty.key_separator.is_empty() && ty.key_fields.len() > 1 {
                return Err(ConfigError::InvalidKeyLayout {
                    type_name: ty.name.clone(),
                    reason: "empty separator with a multi-component key".to_string(),
                });
            }

            ty.expiry_minutes = settings.expiry_minutes_for(&ty.name, ty.expiry_minutes);
            ty.expiry_strategy = settings.expiry_strategy_for(&ty.name, ty.expiry_strategy);
            if ty.expiry_minutes <= 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("expiry_minutes.{}", ty.name),
                    value: ty.expiry_minutes.to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
            if ty.expiry_strategy == ExpiryStrategy::Unknown {
                return Err(ConfigError::InvalidValue {
                    field: format!("expiry_strategy.{}", ty.name),
                    value: ty.expiry_strategy.to_string(),
                    reason: "expected EXPIRE or REQUEST".to_string(),
                });
            }

            let declared_edges = std::mem::take(&mut ty.dependencies);
            ty.dependencies = prune_edges(&ty.name, declared_edges, settings);
            for edge in &mut ty.dependencies {
                for target in edge.targets() {
                    if !known_names.contains(target) {
                        return Err(ConfigError::UnknownEdgeTarget {
                            source_type: ty.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
                validate_edge_paths(&ty.name, edge)?;
            }

            loaded.insert(ty.name.clone(), ty);
        }

        // One scan over the pruned graph to find every type that some other
        // type's edge set can resolve to.
        let mut depended_upon = HashSet::new();
        for ty in loaded.values() {
            for edge in &ty.dependencies {
                for target in edge.targets() {
                    depended_upon.insert(target.to_string());
                }
            }
        }

        Ok(Self {
            types: loaded,
            depended_upon,
        })
    }

    /// Metadata for a type, if the graph knows it.
    pub fn resolve(&self, type_name: &str) -> Option<&ObjectType> {
        self.types.get(type_name)
    }

    /// Whether objects of this type can have dependencies at all.
    ///
    /// Unknown types answer `false`: no caching policy applies to them,
    /// which is not an error.
    pub fn has_dependencies(&self, type_name: &str) -> bool {
        self.resolve(type_name)
            .map(|t| !t.dependencies.is_empty())
            .unwrap_or(false)
    }

    /// Whether some other type's (post-override) edge set targets this type.
    pub fn is_depended_upon(&self, type_name: &str) -> bool {
        self.depended_upon.contains(type_name)
    }

    /// Names of every type in the graph.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|n| n.as_str())
    }

    /// Names of types with at least one dependency edge.
    pub fn dependent_type_names(&self) -> impl Iterator<Item = &str> {
        self.types
            .values()
            .filter(|t| !t.dependencies.is_empty())
            .map(|t| t.name.as_str())
    }

    /// Names of types some other type depends on.
    pub fn depended_upon_type_names(&self) -> impl Iterator<Item = &str> {
        self.depended_upon.iter().map(|n| n.as_str())
    }
}

/// Sort by order and require a contiguous 1..=N permutation.
fn validate_key_fields(type_name: &str, fields: &mut Vec<KeyField>) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::InvalidKeyLayout {
            type_name: type_name.to_string(),
            reason: "no key components".to_string(),
        });
    }
    fields.sort_by_key(|f| f.order);
    for (idx, field) in fields.iter().enumerate() {
        if field.path.is_empty() {
            return Err(ConfigError::InvalidKeyLayout {
                type_name: type_name.to_string(),
                reason: format!("key component {} has an empty path", field.order),
            });
        }
        if field.order as usize != idx + 1 {
            return Err(ConfigError::InvalidKeyLayout {
                type_name: type_name.to_string(),
                reason: format!(
                    "key orders are not a contiguous 1..{} permutation",
                    fields.len()
                ),
            });
        }
    }
    Ok(())
}

/// Sort each path list by order and require contiguous 1..=N orders, so the
/// extractor reads dependency key values in flattening order.
fn validate_edge_paths(type_name: &str, edge: &mut DependencyEdge) -> Result<(), ConfigError> {
    let check = |paths: &mut Vec<KeyField>| -> Result<(), ConfigError> {
        paths.sort_by_key(|p| p.order);
        for (idx, field) in paths.iter().enumerate() {
            if field.order as usize != idx + 1 {
                return Err(ConfigError::InvalidKeyLayout {
                    type_name: type_name.to_string(),
                    reason: "dependency key orders are not contiguous".to_string(),
                });
            }
        }
        Ok(())
    };
    match edge {
        DependencyEdge::Direct { source_paths, .. } => check(source_paths),
        DependencyEdge::Indicator { candidates } => {
            for candidate in candidates {
                check(&mut candidate.source_paths)?;
            }
            Ok(())
        }
    }
}

/// Apply (source → target) ignore rules. Direct edges are dropped whole;
/// indicator edges lose the ignored candidates and disappear entirely when
/// none remain.
fn prune_edges(
    source: &str,
    edges: Vec<DependencyEdge>,
    settings: &CacheSettings,
) -> Vec<DependencyEdge> {
    edges
        .into_iter()
        .filter_map(|edge| match edge {
            DependencyEdge::Direct {
                target,
                source_paths,
                list_path,
            } => {
                if settings.ignore_dependency(source, &target) {
                    None
                } else {
                    Some(DependencyEdge::Direct {
                        target,
                        source_paths,
                        list_path,
                    })
                }
            }
            DependencyEdge::Indicator { candidates } => {
                let kept: Vec<IndicatorCandidate> = candidates
                    .into_iter()
                    .filter(|c| !settings.ignore_dependency(source, &c.target))
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(DependencyEdge::Indicator { candidates: kept })
                }
            }
        })
        .collect()
}

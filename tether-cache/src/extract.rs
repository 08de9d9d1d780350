//! Dependency discovery: walking a concrete instance against the type graph.

use std::sync::Arc;

use tether_core::typegraph::{DependencyEdge, KeyField};
use tether_core::{flatten_key, FieldReader, FlatKey, ObjectType, TypeGraph, ValidationError};

/// One dependency an instance was found to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyReference {
    pub target_type: String,
    /// Ordered key component values of the referenced object.
    pub key_values: Vec<String>,
    /// 1-based element index for references found through a repeated edge.
    pub repeated_index: Option<usize>,
}

/// Walks instances against the type graph to find the dependencies they
/// carry.
///
/// Extraction is deliberately forgiving: an edge whose source values are
/// absent is logged and skipped, never failing the rest of the object.
/// Partial dependency information must not abort processing.
pub struct DependencyExtractor {
    graph: Arc<TypeGraph>,
}

impl DependencyExtractor {
    pub fn new(graph: Arc<TypeGraph>) -> Self {
        Self { graph }
    }

    /// All dependency references `instance` carries according to `owner`'s
    /// (post-override) edge set. Empty when the type has no edges.
    pub fn extract(
        &self,
        instance: &dyn FieldReader,
        owner: &ObjectType,
    ) -> Vec<DependencyReference> {
        let mut references = Vec::new();
        for edge in &owner.dependencies {
            match edge {
                DependencyEdge::Direct {
                    target,
                    source_paths,
                    list_path,
                } => {
                    if !self.arity_matches(&owner.name, target, source_paths) {
                        continue;
                    }
                    match list_path {
                        None => match read_key_values(instance, "", source_paths) {
                            Ok(key_values) => references.push(DependencyReference {
                                target_type: target.clone(),
                                key_values,
                                repeated_index: None,
                            }),
                            Err(missing) => {
                                tracing::warn!(
                                    source = %owner.name,
                                    target = %target,
                                    path = %missing,
                                    "Dependency skipped: source path has no value"
                                );
                            }
                        },
                        Some(list_path) => {
                            self.extract_repeated(
                                instance,
                                owner,
                                target,
                                source_paths,
                                list_path,
                                &mut references,
                            );
                        }
                    }
                }
                DependencyEdge::Indicator { candidates } => {
                    // First candidate whose source fields are all present
                    // wins; presence alone decides, there is no separate
                    // discriminator field.
                    let matched = candidates.iter().find_map(|candidate| {
                        read_key_values(instance, "", &candidate.source_paths)
                            .ok()
                            .map(|key_values| DependencyReference {
                                target_type: candidate.target.clone(),
                                key_values,
                                repeated_index: None,
                            })
                    });
                    match matched {
                        Some(reference)
                            if self.arity_is_valid(&owner.name, &reference) =>
                        {
                            references.push(reference)
                        }
                        Some(_) => {}
                        None => {
                            tracing::warn!(
                                source = %owner.name,
                                "Indicator dependency skipped: no candidate's fields are present"
                            );
                        }
                    }
                }
            }
        }
        references
    }

    /// Extract and flatten the instance's own composite key.
    ///
    /// Unlike dependency extraction this is strict: an object whose own key
    /// cannot be derived cannot be tracked at all.
    pub fn extract_flat_key(
        &self,
        instance: &dyn FieldReader,
        ty: &ObjectType,
    ) -> Result<FlatKey, ValidationError> {
        let mut values = Vec::with_capacity(ty.key_fields.len());
        for field in &ty.key_fields {
            match instance.value_at(&field.path) {
                Some(value) => values.push(value),
                None => {
                    return Err(ValidationError::MissingKeyComponent {
                        type_name: ty.name.clone(),
                        path: field.path.clone(),
                    })
                }
            }
        }
        flatten_key(&values, &ty.key_separator)
    }

    fn extract_repeated(
        &self,
        instance: &dyn FieldReader,
        owner: &ObjectType,
        target: &str,
        source_paths: &[KeyField],
        list_path: &str,
        references: &mut Vec<DependencyReference>,
    ) {
        let mut index = 1usize;
        loop {
            let element = format!("{list_path}[{index}]");
            if !instance.contains(&element) {
                break;
            }
            match read_key_values(instance, &format!("{element}/"), source_paths) {
                Ok(key_values) => references.push(DependencyReference {
                    target_type: target.to_string(),
                    key_values,
                    repeated_index: Some(index),
                }),
                Err(missing) => {
                    tracing::warn!(
                        source = %owner.name,
                        target = %target,
                        path = %missing,
                        "Repeated dependency element skipped: source path has no value"
                    );
                }
            }
            index += 1;
        }
    }

    fn arity_matches(&self, source: &str, target: &str, source_paths: &[KeyField]) -> bool {
        match self.graph.resolve(target) {
            Some(target_type) if target_type.key_fields.len() == source_paths.len() => true,
            Some(target_type) => {
                tracing::warn!(
                    source = %source,
                    target = %target,
                    edge_components = source_paths.len(),
                    key_components = target_type.key_fields.len(),
                    "Dependency skipped: edge component count does not match target key"
                );
                false
            }
            None => {
                tracing::warn!(
                    source = %source,
                    target = %target,
                    "Dependency skipped: target type not in graph"
                );
                false
            }
        }
    }

    fn arity_is_valid(&self, source: &str, reference: &DependencyReference) -> bool {
        match self.graph.resolve(&reference.target_type) {
            Some(target_type) if target_type.key_fields.len() == reference.key_values.len() => {
                true
            }
            _ => {
                tracing::warn!(
                    source = %source,
                    target = %reference.target_type,
                    "Indicator dependency skipped: component count does not match target key"
                );
                false
            }
        }
    }
}

/// Read ordered key values off the instance, prefixing each path. Returns
/// the first missing path on failure.
fn read_key_values(
    instance: &dyn FieldReader,
    prefix: &str,
    source_paths: &[KeyField],
) -> Result<Vec<String>, String> {
    let mut values = Vec::with_capacity(source_paths.len());
    for field in source_paths {
        let path = format!("{prefix}{}", field.path);
        match instance.value_at(&path) {
            Some(value) => values.push(value),
            None => return Err(path),
        }
    }
    Ok(values)
}

//! Registry of generated resources: assembled once at startup, immutable afterwards.

use crate::error::ConfigError;
use crate::generator::{generate, normalize_prefix, EndpointSet, Resource};
use crate::model::{FieldType, Model, ModelDef};
use crate::store::Store;
use axum::Router;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Collects model definitions; [`RegistryBuilder::build`] runs the generator over each and checks
/// them against one another.
pub struct RegistryBuilder {
    api_prefix: String,
    defs: Vec<ModelDef>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_API_PREFIX)
    }
}

impl RegistryBuilder {
    pub fn new(api_prefix: impl Into<String>) -> Self {
        RegistryBuilder {
            api_prefix: api_prefix.into(),
            defs: Vec::new(),
        }
    }

    /// Register a model declared in code.
    pub fn model<M: Model>(self) -> Self {
        self.definition(M::definition())
    }

    pub fn definition(mut self, def: ModelDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn definitions(mut self, defs: impl IntoIterator<Item = ModelDef>) -> Self {
        self.defs.extend(defs);
        self
    }

    pub fn build(self) -> Result<Registry, ConfigError> {
        let mut names = HashSet::new();
        let mut segments = HashSet::new();
        let mut sets = Vec::with_capacity(self.defs.len());
        for def in self.defs {
            if !names.insert(def.name.clone()) {
                return Err(ConfigError::DuplicateModel(def.name));
            }
            let generated = generate(def, &self.api_prefix)?;
            if !segments.insert(generated.resource.path_segment.clone()) {
                return Err(ConfigError::DuplicatePathSegment(generated.resource.path_segment.clone()));
            }
            sets.push(generated.endpoints);
        }

        for set in &sets {
            let r = set.resource();
            for f in &r.def.fields {
                if let FieldType::ForeignKey { references } = &f.field_type {
                    if !names.contains(references) {
                        return Err(ConfigError::MissingReference {
                            kind: "model",
                            id: format!("{} (from {}.{})", references, r.name, f.name),
                        });
                    }
                }
            }
        }

        let sets = dependency_order(sets)?;
        for set in &sets {
            for (op, method, path) in set.endpoints() {
                tracing::debug!(model = %set.resource().name, operation = op.as_str(), %method, %path, "endpoint");
            }
        }
        Ok(Registry {
            api_prefix: normalize_prefix(&self.api_prefix),
            sets,
        })
    }
}

/// Order endpoint sets so every model comes after the models it references; registration order
/// is kept otherwise. Self references are allowed, longer cycles are not.
fn dependency_order(sets: Vec<EndpointSet>) -> Result<Vec<EndpointSet>, ConfigError> {
    let deps: HashMap<String, HashSet<String>> = sets
        .iter()
        .map(|s| {
            let r = s.resource();
            let refs = r
                .def
                .fields
                .iter()
                .filter_map(|f| match &f.field_type {
                    FieldType::ForeignKey { references } if *references != r.name => Some(references.clone()),
                    _ => None,
                })
                .collect();
            (r.name.clone(), refs)
        })
        .collect();

    let mut placed: HashSet<String> = HashSet::new();
    let mut pending = sets;
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let before = pending.len();
        let mut rest = Vec::new();
        for set in pending {
            let ready = deps[&set.resource().name].iter().all(|d| placed.contains(d));
            if ready {
                placed.insert(set.resource().name.clone());
                ordered.push(set);
            } else {
                rest.push(set);
            }
        }
        if rest.len() == before {
            let names: Vec<&str> = rest.iter().map(|s| s.resource().name.as_str()).collect();
            return Err(ConfigError::Validation(format!(
                "foreign key cycle between models: {}",
                names.join(", ")
            )));
        }
        pending = rest;
    }
    Ok(ordered)
}

/// Every registered model with exactly one schema and one endpoint set, in foreign-key
/// dependency order.
#[derive(Debug)]
pub struct Registry {
    api_prefix: String,
    sets: Vec<EndpointSet>,
}

impl Registry {
    pub fn builder(api_prefix: impl Into<String>) -> RegistryBuilder {
        RegistryBuilder::new(api_prefix)
    }

    /// Normalized prefix (`/api/v1`, or empty for root).
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn endpoint_sets(&self) -> &[EndpointSet] {
        &self.sets
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.sets.iter().map(|s| s.resource())
    }

    pub fn resource(&self, model: &str) -> Option<&Arc<Resource>> {
        self.resources().find(|r| r.name == model)
    }

    pub fn by_path_segment(&self, segment: &str) -> Option<&Arc<Resource>> {
        self.resources().find(|r| r.path_segment == segment)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// All generated routes, relative to the API prefix.
    pub fn router(&self, store: Arc<dyn Store>) -> Router {
        self.sets
            .iter()
            .fold(Router::new(), |router, set| router.merge(set.router(store.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDef;

    struct Note;

    impl Model for Note {
        fn definition() -> ModelDef {
            ModelDef::new("Note").field(FieldDef::text("title"))
        }
    }

    fn comment() -> ModelDef {
        ModelDef::new("Comment")
            .field(FieldDef::foreign_key("note_id", "Note"))
            .field(FieldDef::foreign_key("parent_id", "Comment").nullable())
    }

    #[test]
    fn builds_in_dependency_order() {
        let registry = Registry::builder("/api/v1/")
            .definition(comment())
            .model::<Note>()
            .build()
            .unwrap();
        let order: Vec<&str> = registry.resources().map(|r| r.name.as_str()).collect();
        assert_eq!(order, ["Note", "Comment"]);
        assert_eq!(registry.api_prefix(), "/api/v1");
        assert_eq!(registry.by_path_segment("comments").unwrap().name, "Comment");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_model_or_segment_is_rejected() {
        let err = RegistryBuilder::default().model::<Note>().model::<Note>().build().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModel(n) if n == "Note"));

        let err = RegistryBuilder::default()
            .definition(ModelDef::new("News"))
            .definition(ModelDef::new("news"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePathSegment(s) if s == "news"));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let err = RegistryBuilder::default().definition(comment()).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "model", .. }));
    }

    #[test]
    fn reference_cycle_is_rejected() {
        let err = RegistryBuilder::default()
            .definition(ModelDef::new("A").field(FieldDef::foreign_key("b_id", "B")))
            .definition(ModelDef::new("B").field(FieldDef::foreign_key("a_id", "A")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}

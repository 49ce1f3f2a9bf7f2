//! Declarative model definitions: a named list of typed fields, one per database table.

mod field;
mod loader;

pub use field::*;
pub use loader::load_from_dir;

use serde::{Deserialize, Serialize};

/// Server-assigned primary key.
pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Soft-activation flag present on every model; accepted in payloads, defaults to true.
pub const IS_ACTIVE_FIELD: &str = "is_active";

/// Names user-defined fields may not take.
pub const RESERVED_FIELDS: &[&str] = &[ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD, IS_ACTIVE_FIELD];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Model name, PascalCase by convention (e.g. "Widget"). Path and table names derive from it.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDef {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// The `is_active` field every model carries in addition to its own fields.
    pub fn is_active_field() -> FieldDef {
        FieldDef::boolean(IS_ACTIVE_FIELD).default_value(true)
    }
}

/// A model declared in code. Implement on a marker type and register it with
/// [`RegistryBuilder::model`](crate::registry::RegistryBuilder::model).
pub trait Model {
    fn definition() -> ModelDef;
}

//! Validation/serialization schema derived from a model definition: which fields a payload may
//! carry, which a response exposes, and the type and value rules for each.

mod coerce;
mod validation;

pub use coerce::{coerce_json, parse_query_value};

use crate::case::collection_name;
use crate::error::ConfigError;
use crate::model::{
    FieldAccess, FieldDef, FieldDefault, FieldRules, FieldType, ModelDef, CREATED_AT_FIELD, ID_FIELD,
    RESERVED_FIELDS, UPDATED_AT_FIELD,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Direction(s) in which a field crosses the API boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Accepted in create/update payloads only.
    Input,
    /// Server-assigned; returned but never accepted.
    Output,
    Both,
}

impl Access {
    pub fn accepts_input(self) -> bool {
        matches!(self, Access::Input | Access::Both)
    }

    pub fn exposes_output(self) -> bool {
        matches!(self, Access::Output | Access::Both)
    }
}

#[derive(Clone, Debug)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub access: Access,
    pub nullable: bool,
    pub unique: bool,
    pub required_on_create: bool,
    pub default: Option<FieldDefault>,
    pub rules: FieldRules,
    /// Compiled `rules.pattern`.
    pub pattern: Option<Regex>,
    /// Table referenced by a foreign key field.
    pub references_table: Option<String>,
}

impl SchemaField {
    fn from_def(model: &str, def: &FieldDef) -> Result<Self, ConfigError> {
        let pattern = def
            .rules
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("{}.{}: invalid pattern: {}", model, def.name, e)))?;
        let references_table = match &def.field_type {
            FieldType::ForeignKey { references } => Some(collection_name(references)),
            _ => None,
        };
        Ok(SchemaField {
            name: def.name.clone(),
            field_type: def.field_type.clone(),
            access: match def.access {
                FieldAccess::ReadWrite => Access::Both,
                FieldAccess::WriteOnly => Access::Input,
            },
            nullable: def.nullable,
            unique: def.unique,
            required_on_create: def.required_on_create(),
            default: def.default.clone(),
            rules: def.rules.clone(),
            pattern,
            references_table,
        })
    }

    fn server_assigned(name: &str, field_type: FieldType) -> Self {
        SchemaField {
            name: name.to_string(),
            field_type,
            access: Access::Output,
            nullable: false,
            unique: name == ID_FIELD,
            required_on_create: false,
            default: None,
            rules: FieldRules::default(),
            pattern: None,
            references_table: None,
        }
    }
}

/// Identifier rule for model-derived table, path and column names.
pub fn valid_identifier(s: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static identifier regex"))
        .is_match(s)
        && s.len() <= 63
}

#[derive(Clone, Debug)]
pub struct ModelSchema {
    pub model: String,
    /// In column order: `id`, model fields, `is_active`, `created_at`, `updated_at`.
    pub fields: Vec<SchemaField>,
}

impl ModelSchema {
    /// Derive the schema for one model. Fails on reserved, duplicate, or non-identifier field names
    /// and on invalid patterns.
    pub fn derive(def: &ModelDef) -> Result<Self, ConfigError> {
        let mut fields = vec![SchemaField::server_assigned(ID_FIELD, FieldType::BigInt)];
        let mut seen = HashSet::new();
        for f in &def.fields {
            if RESERVED_FIELDS.contains(&f.name.as_str()) {
                return Err(ConfigError::ReservedField {
                    model: def.name.clone(),
                    field: f.name.clone(),
                });
            }
            if !valid_identifier(&f.name) {
                return Err(ConfigError::InvalidIdentifier(format!("{}.{}", def.name, f.name)));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::DuplicateField {
                    model: def.name.clone(),
                    field: f.name.clone(),
                });
            }
            fields.push(SchemaField::from_def(&def.name, f)?);
        }
        fields.push(SchemaField::from_def(&def.name, &ModelDef::is_active_field())?);
        fields.push(SchemaField::server_assigned(CREATED_AT_FIELD, FieldType::Timestamp));
        fields.push(SchemaField::server_assigned(UPDATED_AT_FIELD, FieldType::Timestamp));
        Ok(ModelSchema {
            model: def.name.clone(),
            fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn input_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.access.accepts_input())
    }

    pub fn output_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.access.exposes_output())
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.unique && f.name != ID_FIELD)
    }

    /// Read view: keep only output fields, in schema order.
    pub fn project_output(&self, mut row: Map<String, Value>) -> Value {
        let mut out = Map::new();
        for f in self.output_fields() {
            out.insert(f.name.clone(), row.remove(&f.name).unwrap_or(Value::Null));
        }
        Value::Object(out)
    }
}

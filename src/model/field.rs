//! Field definitions: column type, constraints, and value rules.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Column type of a model field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// VARCHAR(n) when `max_length` is set, TEXT otherwise.
    Text {
        #[serde(default)]
        max_length: Option<u32>,
    },
    Integer,
    BigInt,
    Float,
    Boolean,
    Timestamp,
    Date,
    Uuid,
    Json,
    /// BIGINT referencing the `id` of another registered model (by model name).
    ForeignKey { references: String },
}

impl FieldType {
    /// PostgreSQL column type used in DDL and as the cast target for bound parameters.
    pub fn pg_type(&self) -> String {
        match self {
            FieldType::Text { max_length: Some(n) } => format!("varchar({})", n),
            FieldType::Text { max_length: None } => "text".into(),
            FieldType::Integer => "integer".into(),
            FieldType::BigInt | FieldType::ForeignKey { .. } => "bigint".into(),
            FieldType::Float => "double precision".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Timestamp => "timestamptz".into(),
            FieldType::Date => "date".into(),
            FieldType::Uuid => "uuid".into(),
            FieldType::Json => "jsonb".into(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::Text { .. })
    }

    /// Types with a meaningful ordering for `_min` / `_max` filters and `order_by`.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, FieldType::Json | FieldType::Boolean | FieldType::Uuid)
    }
}

/// Default applied by the database when a create payload omits the field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FieldDefault {
    /// A JSON value, rendered as a SQL literal.
    Value(Value),
    /// Raw SQL expression, e.g. `gen_random_uuid()` or `NOW()`.
    Expression(String),
}

impl<'de> Deserialize<'de> for FieldDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        match v {
            Value::Object(mut obj) => {
                if let Some(Value::String(expr)) = obj.remove("expression") {
                    return Ok(FieldDefault::Expression(expr));
                }
                if let Some(value) = obj.remove("value") {
                    return Ok(FieldDefault::Value(value));
                }
                Err(serde::de::Error::custom(format!(
                    "field default object must be {{ \"expression\": \"...\" }} or {{ \"value\": ... }}; got keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Ok(FieldDefault::Value(other)),
        }
    }
}

/// Whether a field is accepted in payloads, exposed in responses, or both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccess {
    #[default]
    ReadWrite,
    /// Accepted on create/update, never returned (e.g. password hashes).
    WriteOnly,
}

/// Value rules checked before a payload reaches the database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<FieldDefault>,
    #[serde(default)]
    pub access: FieldAccess,
    #[serde(default, flatten)]
    pub rules: FieldRules,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            nullable: false,
            unique: false,
            default: None,
            access: FieldAccess::ReadWrite,
            rules: FieldRules::default(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text { max_length: None })
    }

    /// VARCHAR(n); the length is also enforced before insert.
    pub fn varchar(name: impl Into<String>, max_length: u32) -> Self {
        let mut f = Self::new(name, FieldType::Text { max_length: Some(max_length) });
        f.rules.max_length = Some(max_length);
        f
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn big_int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::BigInt)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Uuid)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Json)
    }

    pub fn foreign_key(name: impl Into<String>, references: impl Into<String>) -> Self {
        Self::new(name, FieldType::ForeignKey { references: references.into() })
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn default_expression(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(FieldDefault::Expression(expression.into()));
        self
    }

    pub fn write_only(mut self) -> Self {
        self.access = FieldAccess::WriteOnly;
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.rules.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.rules.max_length = Some(n);
        self
    }

    pub fn minimum(mut self, n: f64) -> Self {
        self.rules.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.rules.maximum = Some(n);
        self
    }

    /// Inclusive numeric range, e.g. a 1..=5 rating.
    pub fn range(self, min: f64, max: f64) -> Self {
        self.minimum(min).maximum(max)
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rules.pattern = Some(pattern.into());
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rules.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// A create payload may omit the field when it is nullable or has a default.
    pub fn required_on_create(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

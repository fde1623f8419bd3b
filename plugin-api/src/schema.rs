//! A small, parse-returning-result validator over [`serde_json::Value`].
//!
//! The runtime validates everything that crosses a trust boundary — plugin
//! configs, initial contexts, event data, method inputs and outputs, and
//! outgoing telemetry signals — against one of these schemas. Validation
//! never panics and never throws for expected mismatches; it returns a
//! [`SchemaError`] carrying the JSON path of the offending value, suitable
//! for attaching to an [`ErrorObject`](crate::ErrorObject) as a diagnostic
//! cause.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// A structural schema for JSON values.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// Matches anything, including `null`.
    Any,
    Null,
    Bool,
    /// A number with no fractional part.
    Integer,
    /// Any JSON number.
    Number,
    String,
    /// Exactly the given value.
    Literal(Value),
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// A homogeneous array.
    Array(Box<Schema>),
    /// An object with named fields.
    Object(ObjectSchema),
    /// An object with arbitrary string keys and homogeneous values.
    Map(Box<Schema>),
    /// The inner schema, or `null`, or absent (when used as an object field).
    Optional(Box<Schema>),
    /// Any of the listed schemas.
    Union(Vec<Schema>),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ObjectSchema {
    fields: BTreeMap<String, Field>,
    allow_unknown: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct Field {
    schema: Schema,
    required: bool,
}

/// A validation failure, pointing at the offending value.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{path}: {kind}")]
pub struct SchemaError {
    /// JSON path of the value that failed, rooted at `$`.
    pub path: String,
    pub kind: SchemaErrorKind,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SchemaErrorKind {
    #[error("expected {expected}, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("expected one of {expected:?}, found `{found}`")]
    UnknownVariant {
        expected: Vec<String>,
        found: String,
    },
    #[error("expected the literal {0}")]
    LiteralMismatch(Value),
    #[error("no union variant matched")]
    NoVariantMatched,
}

impl SchemaError {
    fn mismatch(path: &str, expected: &'static str, value: &Value) -> Self {
        Self {
            path: path.to_owned(),
            kind: SchemaErrorKind::Mismatch {
                expected,
                found: type_name(value),
            },
        }
    }

    /// The error as a JSON diagnostic, for use as an error cause on the wire.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "path": self.path,
            "message": self.kind.to_string(),
        })
    }
}

impl Schema {
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    pub fn array(item: Schema) -> Schema {
        Schema::Array(Box::new(item))
    }

    pub fn map(values: Schema) -> Schema {
        Schema::Map(Box::new(values))
    }

    pub fn optional(inner: Schema) -> Schema {
        Schema::Optional(Box::new(inner))
    }

    pub fn literal(value: impl Into<Value>) -> Schema {
        Schema::Literal(value.into())
    }

    pub fn one_of<I, S>(variants: I) -> Schema
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::Enum(variants.into_iter().map(Into::into).collect())
    }

    pub fn union(variants: impl IntoIterator<Item = Schema>) -> Schema {
        Schema::Union(variants.into_iter().collect())
    }

    /// Validates `value`, returning the first failure encountered.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        self.check(value, "$")
    }

    /// Validates `value` and hands it back on success.
    pub fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        self.check(&value, "$")?;
        Ok(value)
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), SchemaError> {
        match self {
            Schema::Any => Ok(()),
            Schema::Null => match value {
                Value::Null => Ok(()),
                other => Err(SchemaError::mismatch(path, "null", other)),
            },
            Schema::Bool => match value {
                Value::Bool(_) => Ok(()),
                other => Err(SchemaError::mismatch(path, "a boolean", other)),
            },
            Schema::Integer => {
                if value.as_i64().is_some() || value.as_u64().is_some() {
                    Ok(())
                } else {
                    Err(SchemaError::mismatch(path, "an integer", value))
                }
            }
            Schema::Number => match value {
                Value::Number(_) => Ok(()),
                other => Err(SchemaError::mismatch(path, "a number", other)),
            },
            Schema::String => match value {
                Value::String(_) => Ok(()),
                other => Err(SchemaError::mismatch(path, "a string", other)),
            },
            Schema::Literal(expected) => {
                if value == expected {
                    Ok(())
                } else {
                    Err(SchemaError {
                        path: path.to_owned(),
                        kind: SchemaErrorKind::LiteralMismatch(expected.clone()),
                    })
                }
            }
            Schema::Enum(variants) => {
                let found = value
                    .as_str()
                    .ok_or_else(|| SchemaError::mismatch(path, "a string", value))?;
                if variants.iter().any(|v| v == found) {
                    Ok(())
                } else {
                    Err(SchemaError {
                        path: path.to_owned(),
                        kind: SchemaErrorKind::UnknownVariant {
                            expected: variants.clone(),
                            found: found.to_owned(),
                        },
                    })
                }
            }
            Schema::Array(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| SchemaError::mismatch(path, "an array", value))?;
                for (i, element) in items.iter().enumerate() {
                    item.check(element, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            Schema::Object(object) => object.check(value, path),
            Schema::Map(values) => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| SchemaError::mismatch(path, "an object", value))?;
                for (key, entry) in entries {
                    values.check(entry, &format!("{path}.{key}"))?;
                }
                Ok(())
            }
            Schema::Optional(inner) => match value {
                Value::Null => Ok(()),
                other => inner.check(other, path),
            },
            Schema::Union(variants) => {
                if variants.iter().any(|v| v.check(value, path).is_ok()) {
                    Ok(())
                } else {
                    Err(SchemaError {
                        path: path.to_owned(),
                        kind: SchemaErrorKind::NoVariantMatched,
                    })
                }
            }
        }
    }
}

impl ObjectSchema {
    /// Adds a required field.
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.insert(
            name.into(),
            Field {
                schema,
                required: true,
            },
        );
        self
    }

    /// Adds a field that may be absent or `null`.
    pub fn optional_field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.insert(
            name.into(),
            Field {
                schema: Schema::optional(schema),
                required: false,
            },
        );
        self
    }

    /// Permits fields beyond the declared ones.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn build(self) -> Schema {
        Schema::Object(self)
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), SchemaError> {
        let entries = value
            .as_object()
            .ok_or_else(|| SchemaError::mismatch(path, "an object", value))?;
        for (name, field) in &self.fields {
            match entries.get(name) {
                Some(entry) => field.schema.check(entry, &format!("{path}.{name}"))?,
                None if field.required => {
                    return Err(SchemaError {
                        path: path.to_owned(),
                        kind: SchemaErrorKind::MissingField(name.clone()),
                    })
                }
                None => {}
            }
        }
        if !self.allow_unknown {
            for key in entries.keys() {
                if !self.fields.contains_key(key) {
                    return Err(SchemaError {
                        path: path.to_owned(),
                        kind: SchemaErrorKind::UnknownField(key.clone()),
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_fields_are_checked_by_path() {
        let schema = Schema::object()
            .field("name", Schema::String)
            .optional_field("count", Schema::Integer)
            .build();

        assert!(schema.validate(&json!({"name": "p"})).is_ok());
        assert!(schema.validate(&json!({"name": "p", "count": 3})).is_ok());
        assert!(schema.validate(&json!({"name": "p", "count": null})).is_ok());

        let err = schema
            .validate(&json!({"name": "p", "count": "three"}))
            .unwrap_err();
        assert_eq!(err.path, "$.count");

        let err = schema.validate(&json!({"count": 3})).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::MissingField("name".into()));
    }

    #[test]
    fn unknown_fields_are_rejected_unless_allowed() {
        let strict = Schema::object().field("a", Schema::Bool).build();
        let err = strict.validate(&json!({"a": true, "b": 1})).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnknownField("b".into()));

        let lax = Schema::object()
            .field("a", Schema::Bool)
            .allow_unknown()
            .build();
        assert!(lax.validate(&json!({"a": true, "b": 1})).is_ok());
    }

    #[test]
    fn arrays_report_the_offending_index() {
        let schema = Schema::array(Schema::Integer);
        let err = schema.validate(&json!([1, 2, "x"])).unwrap_err();
        assert_eq!(err.path, "$[2]");
    }

    #[test]
    fn unions_accept_any_variant() {
        let schema = Schema::union([Schema::String, Schema::Integer]);
        assert!(schema.validate(&json!("s")).is_ok());
        assert!(schema.validate(&json!(5)).is_ok());
        assert_eq!(
            schema.validate(&json!(true)).unwrap_err().kind,
            SchemaErrorKind::NoVariantMatched
        );
    }

    #[test]
    fn enums_list_expected_variants() {
        let schema = Schema::one_of(["counter", "updown", "histogram"]);
        let err = schema.validate(&json!("gauge")).unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::UnknownVariant { .. }));
    }
}

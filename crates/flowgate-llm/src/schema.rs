//! Declared output shapes and the values that conform to them.
//!
//! A [`Schema`] is built once, validated at construction, and then shared
//! cheaply (`Arc` inside). [`Schema::parse`] is the only way to obtain a
//! [`TypedResult`], so every `TypedResult` in the system is known to conform
//! to the schema that produced it.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use flowgate_utils::error::SchemaError;
use flowgate_utils::json::parse_json_payload;

use crate::types::ResponseFormat;

/// Type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
    /// The inner type or `null`. Absent optional fields parse as `null`.
    Optional(Box<FieldType>),
    List(Box<FieldType>),
    Object(Vec<Field>),
}

impl FieldType {
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    #[must_use]
    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    #[must_use]
    pub fn object(fields: Vec<Field>) -> Self {
        Self::Object(fields)
    }

    fn describe(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Enum(values) => format!("one of {values:?}"),
            Self::Optional(inner) => format!("{} or null", inner.describe()),
            Self::List(inner) => format!("list of {}", inner.describe()),
            Self::Object(_) => "object".to_string(),
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Number => json!({"type": "number"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Enum(values) => json!({"type": "string", "enum": values}),
            Self::Optional(inner) => {
                let mut schema = inner.to_json_schema();
                if let Some(obj) = schema.as_object_mut() {
                    if let Some(Value::String(ty)) = obj.get("type").cloned() {
                        obj.insert("type".to_string(), json!([ty, "null"]));
                    }
                    if let Some(Value::Array(values)) = obj.get_mut("enum") {
                        values.push(Value::Null);
                    }
                }
                schema
            }
            Self::List(inner) => json!({"type": "array", "items": inner.to_json_schema()}),
            Self::Object(fields) => object_json_schema(fields, None),
        }
    }
}

/// A named, typed field of a schema or nested object.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    description: Option<String>,
    ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
        }
    }

    /// Attach a description that is forwarded to the model.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

fn object_json_schema(fields: &[Field], description: Option<&str>) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut schema = field.ty.to_json_schema();
        if let (Some(desc), Some(obj)) = (&field.description, schema.as_object_mut()) {
            obj.insert("description".to_string(), json!(desc));
        }
        properties.insert(field.name.clone(), schema);
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    });
    if let (Some(desc), Some(obj)) = (description, schema.as_object_mut()) {
        obj.insert("description".to_string(), json!(desc));
    }
    schema
}

#[derive(Debug, PartialEq)]
struct SchemaInner {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
}

/// Immutable description of a structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner.fields.iter().find(|f| f.name == name)
    }

    /// Render as a strict JSON Schema: every field required, no additional
    /// properties, optional fields nullable.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        object_json_schema(&self.inner.fields, self.description())
    }

    #[must_use]
    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat {
            name: self.inner.name.clone(),
            schema: self.to_json_schema(),
        }
    }

    /// Check `value` against this schema and normalize it.
    ///
    /// Normalization fills absent optional fields with `null` and turns
    /// integral floats (`3.0`) into integers for integer fields.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found, with a dotted field path.
    pub fn parse(&self, value: Value) -> Result<TypedResult, SchemaError> {
        let fields = check_object(&self.inner.name, "", &self.inner.fields, value)?;
        Ok(TypedResult {
            schema: self.inner.name.clone(),
            fields,
        })
    }

    /// Parse model text, tolerating markdown fences around the JSON payload.
    ///
    /// # Errors
    ///
    /// `SchemaError::Malformed` if no JSON can be read, otherwise as [`Self::parse`].
    pub fn parse_text(&self, text: &str) -> Result<TypedResult, SchemaError> {
        let value = parse_json_payload(text).map_err(|e| SchemaError::Malformed {
            schema: self.inner.name.clone(),
            reason: e.to_string(),
        })?;
        self.parse(value)
    }
}

/// Builder for [`Schema`]; the definition is checked in [`SchemaBuilder::build`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(Field::new(name, ty));
        self
    }

    #[must_use]
    pub fn described_field(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(Field::new(name, ty).describe(description));
        self
    }

    /// # Errors
    ///
    /// `SchemaError::InvalidDefinition` for an invalid schema name, empty,
    /// dotted or duplicate field names, empty or duplicate enum values, or
    /// nested optionals.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidDefinition {
            schema: self.name.clone(),
            reason,
        };

        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(format!(
                "schema name '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.name
            )));
        }
        check_fields(&self.fields, "").map_err(invalid)?;

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                description: self.description,
                fields: self.fields,
            }),
        })
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn check_fields(fields: &[Field], path: &str) -> Result<(), String> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.is_empty() {
            return Err(format!("empty field name in '{path}'"));
        }
        // `.` separates path segments in `TypedResult::lookup`.
        if field.name.contains('.') {
            return Err(format!(
                "field name '{}' must not contain '.'",
                join_path(path, &field.name)
            ));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(format!(
                "duplicate field '{}'",
                join_path(path, &field.name)
            ));
        }
        check_type(&field.ty, &join_path(path, &field.name))?;
    }
    Ok(())
}

fn check_type(ty: &FieldType, path: &str) -> Result<(), String> {
    match ty {
        FieldType::Enum(values) => {
            if values.is_empty() {
                return Err(format!("enum field '{path}' has no values"));
            }
            let unique: HashSet<_> = values.iter().collect();
            if unique.len() != values.len() {
                return Err(format!("enum field '{path}' has duplicate values"));
            }
            Ok(())
        }
        FieldType::Optional(inner) => {
            if matches!(**inner, FieldType::Optional(_)) {
                return Err(format!("field '{path}' nests optional inside optional"));
            }
            check_type(inner, path)
        }
        FieldType::List(inner) => check_type(inner, &format!("{path}[]")),
        FieldType::Object(fields) => check_fields(fields, path),
        _ => Ok(()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(
    schema: &str,
    path: &str,
    fields: &[Field],
    value: Value,
) -> Result<Map<String, Value>, SchemaError> {
    let Value::Object(mut map) = value else {
        return Err(SchemaError::NotAnObject {
            schema: schema.to_string(),
            path: path.to_string(),
        });
    };

    let mut out = Map::new();
    for field in fields {
        let field_path = join_path(path, &field.name);
        let checked = match map.remove(&field.name) {
            Some(v) => check_value(schema, &field_path, &field.ty, v)?,
            None if matches!(field.ty, FieldType::Optional(_)) => Value::Null,
            None => {
                return Err(SchemaError::MissingField {
                    schema: schema.to_string(),
                    field: field_path,
                });
            }
        };
        out.insert(field.name.clone(), checked);
    }

    if let Some(extra) = map.keys().next() {
        return Err(SchemaError::UnexpectedField {
            schema: schema.to_string(),
            field: join_path(path, extra),
        });
    }

    Ok(out)
}

fn check_value(schema: &str, path: &str, ty: &FieldType, value: Value) -> Result<Value, SchemaError> {
    let mismatch = |value: &Value| SchemaError::TypeMismatch {
        schema: schema.to_string(),
        field: path.to_string(),
        expected: ty.describe(),
        found: json_kind(value).to_string(),
    };

    match ty {
        FieldType::String if value.is_string() => Ok(value),
        FieldType::Number if value.is_number() => Ok(value),
        FieldType::Boolean if value.is_boolean() => Ok(value),
        FieldType::Integer => {
            if value.is_i64() || value.is_u64() {
                return Ok(value);
            }
            match value.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                    Ok(json!(f as i64))
                }
                _ => Err(mismatch(&value)),
            }
        }
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => Ok(value),
            Some(s) => Err(SchemaError::InvalidEnumValue {
                schema: schema.to_string(),
                field: path.to_string(),
                value: s.to_string(),
                allowed: allowed.clone(),
            }),
            None => Err(mismatch(&value)),
        },
        FieldType::Optional(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                check_value(schema, path, inner, value)
            }
        }
        FieldType::List(inner) => match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| check_value(schema, &format!("{path}[{i}]"), inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(mismatch(&other)),
        },
        FieldType::Object(fields) => check_object(schema, path, fields, value).map(Value::Object),
        _ => Err(mismatch(&value)),
    }
}

/// A value known to conform to the schema named by [`TypedResult::schema_name`].
///
/// Read-only: fields are reachable through accessors, and the whole value can
/// be converted into a Rust type with [`TypedResult::into_typed`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedResult {
    schema: String,
    fields: Map<String, Value>,
}

impl TypedResult {
    #[must_use]
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a dotted path such as `details.location`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.lookup(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.lookup(field).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.lookup(field).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.lookup(field).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn get_list(&self, field: &str) -> Option<&[Value]> {
        self.lookup(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// The whole result as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }

    /// Convert into a Rust type.
    ///
    /// # Errors
    ///
    /// `SchemaError::Malformed` when `T` does not match the schema's shape.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, SchemaError> {
        let schema = self.schema.clone();
        serde_json::from_value(self.into_json()).map_err(|e| SchemaError::Malformed {
            schema,
            reason: e.to_string(),
        })
    }
}

impl Serialize for TypedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl fmt::Display for TypedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// A Rust type with a declared output schema.
///
/// ```rust
/// use flowgate_llm::{FieldType, Schema, Structured};
/// use flowgate_utils::error::SchemaError;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Verdict {
///     ok: bool,
/// }
///
/// impl Structured for Verdict {
///     fn schema() -> Result<Schema, SchemaError> {
///         Schema::builder("verdict").field("ok", FieldType::Boolean).build()
///     }
/// }
///
/// let result = Verdict::schema()?.parse(serde_json::json!({"ok": true}))?;
/// assert!(result.into_typed::<Verdict>()?.ok);
/// # Ok::<(), SchemaError>(())
/// ```
pub trait Structured: DeserializeOwned {
    /// # Errors
    ///
    /// `SchemaError::InvalidDefinition` if the declaration is inconsistent.
    fn schema() -> Result<Schema, SchemaError>;
}

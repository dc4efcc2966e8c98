//! Declarative input validation.
//!
//! A schema maps field names to rule strings (see [`rule`] for the grammar).
//! Every field is evaluated independently, in schema order; within a field
//! the rules run left to right and stop at the first failure, so a field
//! contributes at most one message per schema pass. All failing fields are
//! collected into a single [`ValidationError`].
//!
//! Fields whose value is absent (missing or `null`) and whose rule chain does
//! not contain `required` are optional and skipped entirely.
//!
//! # Examples
//!
//! ```
//! use invocation_core::validation::Schema;
//! use serde_json::json;
//!
//! let schema = Schema::parse([
//!     ("title", "required|string|min:3"),
//!     ("priority", "in:low,medium,high"),
//! ])
//! .unwrap();
//!
//! let err = schema
//!     .validate(&json!({ "title": "ab", "priority": "urgent" }))
//!     .unwrap_err();
//!
//! assert_eq!(err.messages("title").unwrap(), ["title must be at least 3 characters"]);
//! assert_eq!(err.messages("priority").unwrap(), ["priority must be one of: low, medium, high"]);
//! ```

pub mod rule;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result, ValidationError};

pub use rule::{tokenize, Rule, RuleParseError, RuleToken};

#[derive(Debug, Clone)]
struct FieldRules {
    name: String,
    rules: Vec<Rule>,
    required: bool,
}

impl FieldRules {
    fn check(&self, data: &Value) -> Option<String> {
        let value = data.get(&self.name);
        if !self.required && matches!(value, None | Some(Value::Null)) {
            return None;
        }
        self.rules
            .iter()
            .find_map(|rule| rule.check(&self.name, value).err())
    }
}

/// A compiled, reusable set of field rules.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldRules>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `(field, rule string)` pairs, keeping their order.
    pub fn parse<I, K, R>(fields: I) -> Result<Self, RuleParseError>
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: AsRef<str>,
    {
        fields
            .into_iter()
            .try_fold(Schema::new(), |schema, (name, rules)| {
                schema.field(name, rules.as_ref())
            })
    }

    /// Appends a field with its rule string.
    pub fn field(mut self, name: impl Into<String>, rules: &str) -> Result<Self, RuleParseError> {
        let rules = Rule::parse_all(rules)?;
        let required = rules.iter().any(|r| matches!(r, Rule::Required));
        self.fields.push(FieldRules {
            name: name.into(),
            rules,
            required,
        });
        Ok(self)
    }

    /// Number of fields in the schema.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluates every field against `data` and returns all violations.
    pub fn check(&self, data: &Value) -> ValidationError {
        let mut errors = ValidationError::new();
        for field in &self.fields {
            if let Some(message) = field.check(data) {
                errors.add(&field.name, message);
            }
        }
        errors
    }

    /// Like [`check`](Self::check), but as a `Result`.
    pub fn validate(&self, data: &Value) -> Result<(), ValidationError> {
        let errors = self.check(data);
        if !errors.is_empty() {
            debug!(failed_fields = errors.len(), "validation failed");
        }
        errors.into_result()
    }
}

/// Validates `data` against `(field, rule string)` pairs in one step.
///
/// A malformed rule string is a programming error and is reported as
/// [`Error::Internal`]; failing data is reported as [`Error::Validation`].
pub fn validate<I, K, R>(schema: I, data: &Value) -> Result<()>
where
    I: IntoIterator<Item = (K, R)>,
    K: Into<String>,
    R: AsRef<str>,
{
    let schema = Schema::parse(schema).map_err(Error::internal)?;
    schema.validate(data)?;
    Ok(())
}

/// Validates `data` with custom predicates over raw field values.
///
/// Each failing predicate contributes `"<field> is invalid"` for its field.
pub fn validate_custom<'a, I, F>(checks: I, data: &Value) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (&'a str, F)>,
    F: Fn(Option<&Value>) -> bool,
{
    let mut validator = Validator::new(data);
    for (field, predicate) in checks {
        validator.custom(field, predicate);
    }
    validator.finish()
}

/// Accumulates schema and custom-predicate failures into one error.
///
/// # Examples
///
/// ```
/// use invocation_core::validation::{Schema, Validator};
/// use serde_json::json;
///
/// let data = json!({ "start": 10, "end": 5, "name": "" });
/// let schema = Schema::parse([("name", "required|string")]).unwrap();
///
/// let mut validator = Validator::new(&data);
/// validator
///     .schema(&schema)
///     .custom("end", |v| v.and_then(|v| v.as_i64()) > data["start"].as_i64());
///
/// let err = validator.finish().unwrap_err();
/// assert_eq!(err.len(), 2);
/// assert_eq!(err.messages("end").unwrap(), ["end is invalid"]);
/// ```
#[derive(Debug)]
pub struct Validator<'a> {
    data: &'a Value,
    errors: ValidationError,
}

impl<'a> Validator<'a> {
    /// Starts validating `data`.
    pub fn new(data: &'a Value) -> Self {
        Self {
            data,
            errors: ValidationError::new(),
        }
    }

    /// Runs a schema and records its failures.
    pub fn schema(&mut self, schema: &Schema) -> &mut Self {
        self.errors.merge(schema.check(self.data));
        self
    }

    /// Runs a predicate over the raw value of `field` (absent as `None`).
    pub fn custom<F>(&mut self, field: &str, predicate: F) -> &mut Self
    where
        F: Fn(Option<&Value>) -> bool,
    {
        if !predicate(self.data.get(field)) {
            self.errors.add(field, format!("{field} is invalid"));
        }
        self
    }

    /// Finishes, returning every recorded failure at once.
    pub fn finish(self) -> Result<(), ValidationError> {
        self.errors.into_result()
    }
}

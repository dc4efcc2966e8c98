//! Rule grammar and evaluation.
//!
//! A rule string is a `|`-separated list of tokens, each a name optionally
//! followed by `:` and comma-separated arguments:
//!
//! ```text
//! required|string|min:3|max:120
//! required|in:low,medium,high
//! string|regex:^[a-z]+(-[a-z]+)*$
//! ```
//!
//! `regex` takes the remainder of the rule string verbatim as its pattern, so
//! patterns may contain `|` and `,`; it must therefore be the last token.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Errors in a rule string. These are mistakes in the schema, not in the
/// validated data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    /// A token has no name (e.g. `:3`).
    #[error("rule token '{0}' has no name")]
    EmptyName(String),
    /// The token name is not a known rule.
    #[error("unknown rule '{0}'")]
    UnknownRule(String),
    /// The rule needs arguments but got none.
    #[error("rule '{0}' requires an argument")]
    MissingArgument(String),
    /// The rule takes no arguments, or fewer than given.
    #[error("rule '{rule}' got unexpected arguments '{args}'")]
    UnexpectedArgument {
        /// Rule name
        rule: String,
        /// Arguments as written
        args: String,
    },
    /// An argument could not be parsed as a number.
    #[error("rule '{rule}' expects a numeric argument, got '{arg}'")]
    InvalidNumber {
        /// Rule name
        rule: String,
        /// Offending argument
        arg: String,
    },
    /// The `regex` pattern does not compile.
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Compiler message
        reason: String,
    },
}

/// One parsed token of a rule string: a name and its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleToken {
    /// Rule name, e.g. `min`
    pub name: String,
    /// Arguments in order, e.g. `["3"]`
    pub args: Vec<String>,
}

impl RuleToken {
    fn parse(segment: &str) -> Result<Self, RuleParseError> {
        let (name, raw_args) = match segment.split_once(':') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (segment.trim(), None),
        };
        if name.is_empty() {
            return Err(RuleParseError::EmptyName(segment.to_string()));
        }
        let args = match raw_args {
            None => Vec::new(),
            Some(raw) if name == "regex" => vec![raw.to_string()],
            Some(raw) if raw.trim().is_empty() => Vec::new(),
            Some(raw) => raw.split(',').map(|a| a.trim().to_string()).collect(),
        };
        Ok(Self {
            name: name.to_string(),
            args,
        })
    }
}

impl fmt::Display for RuleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.args.join(","))
        }
    }
}

/// Splits a rule string into tokens, left to right.
///
/// Empty segments (`required||string`) are skipped.
///
/// # Examples
///
/// ```
/// use invocation_core::validation::tokenize;
///
/// let tokens = tokenize("required|string|min:3").unwrap();
/// let names: Vec<&str> = tokens.iter().map(|t| t.name.as_str()).collect();
/// assert_eq!(names, ["required", "string", "min"]);
/// assert_eq!(tokens[2].args, ["3"]);
/// ```
pub fn tokenize(rules: &str) -> Result<Vec<RuleToken>, RuleParseError> {
    let mut tokens = Vec::new();
    let mut rest = rules;

    while !rest.is_empty() {
        let segment = if rest.trim_start().starts_with("regex:") {
            std::mem::take(&mut rest)
        } else {
            match rest.split_once('|') {
                Some((head, tail)) => {
                    rest = tail;
                    head
                }
                None => std::mem::take(&mut rest),
            }
        };

        if segment.trim().is_empty() {
            continue;
        }
        tokens.push(RuleToken::parse(segment.trim_start())?);
    }

    Ok(tokens)
}

/// A compiled rule, ready to evaluate.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Present and non-empty.
    Required,
    /// Textual.
    String,
    /// Numeric (`int`, `integer`, `number`).
    Numeric,
    /// Boolean (`bool`, `boolean`).
    Boolean,
    /// Ordered sequence (`array`, `list`).
    Array,
    /// Keyed mapping (`map`, `object`, `dict`).
    Map,
    /// Email address.
    Email,
    /// Absolute http(s) URL.
    Url,
    /// Hyphenated UUID.
    Uuid,
    /// Lower bound on length or magnitude.
    Min(f64),
    /// Upper bound on length or magnitude.
    Max(f64),
    /// One of the listed literals.
    In(Vec<String>),
    /// Stringified value matches the pattern.
    Regex(Regex),
}

impl Rule {
    /// Compiles a token by looking its name up in the rule table.
    pub fn from_token(token: &RuleToken) -> Result<Self, RuleParseError> {
        let rule = match token.name.as_str() {
            "required" => Rule::Required,
            "string" => Rule::String,
            "int" | "integer" | "number" => Rule::Numeric,
            "bool" | "boolean" => Rule::Boolean,
            "array" | "list" => Rule::Array,
            "map" | "object" | "dict" => Rule::Map,
            "email" => Rule::Email,
            "url" => Rule::Url,
            "uuid" => Rule::Uuid,
            "min" => return Ok(Rule::Min(single_number(token)?)),
            "max" => return Ok(Rule::Max(single_number(token)?)),
            "in" => {
                if token.args.is_empty() {
                    return Err(RuleParseError::MissingArgument(token.name.clone()));
                }
                return Ok(Rule::In(token.args.clone()));
            }
            "regex" => {
                let pattern = token
                    .args
                    .first()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| RuleParseError::MissingArgument(token.name.clone()))?;
                let compiled =
                    Regex::new(pattern).map_err(|e| RuleParseError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                return Ok(Rule::Regex(compiled));
            }
            other => return Err(RuleParseError::UnknownRule(other.to_string())),
        };

        if !token.args.is_empty() {
            return Err(RuleParseError::UnexpectedArgument {
                rule: token.name.clone(),
                args: token.args.join(","),
            });
        }
        Ok(rule)
    }

    /// Parses and compiles a whole rule string.
    pub fn parse_all(rules: &str) -> Result<Vec<Rule>, RuleParseError> {
        tokenize(rules)?.iter().map(Rule::from_token).collect()
    }

    /// Checks `value` (absent when `None`) and returns the violation message
    /// on failure.
    pub fn check(&self, field: &str, value: Option<&Value>) -> Result<(), String> {
        let passed = match self {
            Rule::Required => !is_empty(value),
            Rule::String => matches!(value, Some(Value::String(_))),
            Rule::Numeric => matches!(value, Some(Value::Number(_))),
            Rule::Boolean => matches!(value, Some(Value::Bool(_))),
            Rule::Array => matches!(value, Some(Value::Array(_))),
            Rule::Map => matches!(value, Some(Value::Object(_))),
            Rule::Email => as_str(value).is_some_and(|s| EMAIL_REGEX.is_match(s)),
            Rule::Url => as_str(value).is_some_and(is_http_url),
            Rule::Uuid => as_str(value).is_some_and(is_uuid),
            Rule::Min(n) => measure(value).is_some_and(|m| m.amount >= *n),
            Rule::Max(n) => measure(value).is_some_and(|m| m.amount <= *n),
            Rule::In(allowed) => value.is_some_and(|v| is_listed(v, allowed)),
            Rule::Regex(re) => re.is_match(&stringify(value)),
        };

        if passed {
            Ok(())
        } else {
            Err(self.message(field, value))
        }
    }

    fn message(&self, field: &str, value: Option<&Value>) -> String {
        match self {
            Rule::Required => format!("{field} is required"),
            Rule::String => format!("{field} must be a string"),
            Rule::Numeric => format!("{field} must be a number"),
            Rule::Boolean => format!("{field} must be a boolean"),
            Rule::Array => format!("{field} must be an array"),
            Rule::Map => format!("{field} must be an object"),
            Rule::Email => format!("{field} must be a valid email address"),
            Rule::Url => format!("{field} must be a valid URL"),
            Rule::Uuid => format!("{field} must be a valid UUID"),
            Rule::Min(n) => bound_message(field, "at least", *n, value),
            Rule::Max(n) => bound_message(field, "at most", *n, value),
            Rule::In(allowed) => format!("{field} must be one of: {}", allowed.join(", ")),
            Rule::Regex(_) => format!("{field} format is invalid"),
        }
    }
}

fn single_number(token: &RuleToken) -> Result<f64, RuleParseError> {
    match token.args.as_slice() {
        [] => Err(RuleParseError::MissingArgument(token.name.clone())),
        [arg] => arg
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| RuleParseError::InvalidNumber {
                rule: token.name.clone(),
                arg: arg.clone(),
            }),
        _ => Err(RuleParseError::UnexpectedArgument {
            rule: token.name.clone(),
            args: token.args.join(","),
        }),
    }
}

/// Absent, null, empty string or empty array.
pub(crate) fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn as_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn is_http_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

#[derive(Clone, Copy)]
enum Measure {
    Length,
    Items,
    Magnitude,
}

struct Measured {
    kind: Measure,
    amount: f64,
}

/// Dispatches on the value's own type: character count for strings, item
/// count for arrays, the number itself for numbers.
fn measure(value: Option<&Value>) -> Option<Measured> {
    match value? {
        Value::String(s) => Some(Measured {
            kind: Measure::Length,
            amount: s.chars().count() as f64,
        }),
        Value::Array(items) => Some(Measured {
            kind: Measure::Items,
            amount: items.len() as f64,
        }),
        Value::Number(n) => n.as_f64().map(|amount| Measured {
            kind: Measure::Magnitude,
            amount,
        }),
        _ => None,
    }
}

fn bound_message(field: &str, relation: &str, n: f64, value: Option<&Value>) -> String {
    match measure(value).map(|m| m.kind) {
        Some(Measure::Length) => format!("{field} must be {relation} {n} characters"),
        Some(Measure::Items) => format!("{field} must contain {relation} {n} items"),
        Some(Measure::Magnitude) => format!("{field} must be {relation} {n}"),
        None => format!("{field} must be a string, array or number"),
    }
}

/// Scalar rendering used by `in`; null and containers have none.
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numbers match listed literals that parse to the same value, so `2.0`
/// is in `in:1,2`; everything else compares by rendering.
fn is_listed(value: &Value, allowed: &[String]) -> bool {
    if let Some(n) = value.as_f64().filter(|_| value.is_number()) {
        if allowed.iter().any(|a| a.parse::<f64>().is_ok_and(|a| a == n)) {
            return true;
        }
    }
    literal(value).is_some_and(|v| allowed.iter().any(|a| *a == v))
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => literal(v).unwrap_or_else(|| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(rules: &str, value: Value) -> Result<(), String> {
        for rule in Rule::parse_all(rules).unwrap() {
            rule.check("field", Some(&value))?;
        }
        Ok(())
    }

    #[test]
    fn tokenize_splits_names_and_args() {
        let tokens = tokenize("required|in:low, medium ,high|max:10").unwrap();

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].name, "in");
        assert_eq!(tokens[1].args, ["low", "medium", "high"]);
        assert_eq!(tokens[2].to_string(), "max:10");
    }

    #[test]
    fn tokenize_skips_empty_segments() {
        let tokens = tokenize("required||string|").unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn regex_token_takes_the_rest_of_the_string() {
        let tokens = tokenize("string|regex:^(draft|done)$").unwrap();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].args, ["^(draft|done)$"]);
    }

    #[test]
    fn unknown_rule_is_rejected() {
        assert_eq!(
            Rule::parse_all("required|shiny").unwrap_err(),
            RuleParseError::UnknownRule("shiny".to_string())
        );
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(matches!(
            Rule::parse_all("min:abc"),
            Err(RuleParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Rule::parse_all("max"),
            Err(RuleParseError::MissingArgument(_))
        ));
        assert!(matches!(
            Rule::parse_all("string:yes"),
            Err(RuleParseError::UnexpectedArgument { .. })
        ));
        assert!(matches!(
            Rule::parse_all("regex:(unclosed"),
            Err(RuleParseError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Rule::parse_all(":3"),
            Err(RuleParseError::EmptyName(_))
        ));
    }

    #[test]
    fn required_rejects_empty_values() {
        let rule = Rule::Required;
        assert!(rule.check("f", None).is_err());
        assert!(rule.check("f", Some(&Value::Null)).is_err());
        assert!(rule.check("f", Some(&json!(""))).is_err());
        assert!(rule.check("f", Some(&json!([]))).is_err());
        assert!(rule.check("f", Some(&json!(0))).is_ok());
        assert!(rule.check("f", Some(&json!(false))).is_ok());
    }

    #[test]
    fn type_rules_do_not_coerce() {
        assert!(check("int", json!("42")).is_err());
        assert!(check("number", json!(4.5)).is_ok());
        assert!(check("bool", json!("true")).is_err());
        assert!(check("string", json!(7)).is_err());
        assert!(check("list", json!([1])).is_ok());
        assert!(check("dict", json!({})).is_ok());
    }

    #[test]
    fn min_and_max_dispatch_on_value_type() {
        assert!(check("min:3", json!("abc")).is_ok());
        assert!(check("min:3", json!("ab")).is_err());
        assert!(check("min:3", json!(3)).is_ok());
        assert!(check("min:3", json!(2.5)).is_err());
        assert!(check("max:2", json!([1, 2, 3])).is_err());
        assert!(check("max:2", json!(true)).is_err());
    }

    #[test]
    fn min_counts_characters_not_bytes() {
        assert!(check("max:2", json!("é€")).is_ok());
    }

    #[test]
    fn bound_messages_describe_the_measure() {
        assert_eq!(
            check("min:3", json!("ab")).unwrap_err(),
            "field must be at least 3 characters"
        );
        assert_eq!(
            check("max:2", json!([1, 2, 3])).unwrap_err(),
            "field must contain at most 2 items"
        );
        assert_eq!(check("min:1.5", json!(1)).unwrap_err(), "field must be at least 1.5");
    }

    #[test]
    fn in_compares_scalar_renderings() {
        assert!(check("in:low,high", json!("low")).is_ok());
        assert!(check("in:1,2", json!(2)).is_ok());
        assert!(check("in:true", json!(true)).is_ok());
    }

    #[test]
    fn in_compares_numbers_by_value() {
        assert!(check("in:1,2", json!(2.0)).is_ok());
        assert!(check("in:0.5,1e1", json!(10)).is_ok());
        assert!(check("in:1,2", json!(2.5)).is_err());
        assert!(check("in:2", json!("2.0")).is_err());
    }

    #[test]
    fn in_rejects_unlisted_values() {
        assert_eq!(
            check("in:low,high", json!("urgent")).unwrap_err(),
            "field must be one of: low, high"
        );
    }

    #[test]
    fn format_rules() {
        assert!(check("email", json!("dev@example.com")).is_ok());
        assert!(check("email", json!("dev@localhost")).is_err());
        assert!(check("url", json!("https://example.com/a?b=c")).is_ok());
        assert!(check("url", json!("ftp://example.com")).is_err());
        assert!(check("uuid", json!("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_ok());
        assert!(check("uuid", json!("67e5504410b1426f9247bb680e5fe0c8")).is_err());
    }

    #[test]
    fn regex_matches_stringified_value() {
        assert!(check("regex:^\\d{3}$", json!(123)).is_ok());
        assert!(check("regex:^(draft|done)$", json!("done")).is_ok());
        assert!(check("regex:^(draft|done)$", json!("archived")).is_err());
    }
}

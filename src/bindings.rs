//! Variable bindings and the reserved process-option entries.
//!
//! A [`Bindings`] map holds two things:
//!
//! - regular variables, substituted for whole-word `$name` tokens;
//! - reserved entries whose names start with the reserved prefix (`_` by
//!   default). These never take part in substitution. `_cwd` sets the
//!   working directory and `_env` a replacement environment for every
//!   process of the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;

/// Reserved suffix for the working directory entry.
pub const CWD_KEY: &str = "cwd";
/// Reserved suffix for the replacement environment entry.
pub const ENV_KEY: &str = "env";

/// A bound value: one argument, or any number of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(String),
    Sequence(Vec<String>),
}

impl Value {
    /// A scalar from anything with a textual form.
    pub fn scalar(value: impl fmt::Display) -> Self {
        Value::Scalar(value.to_string())
    }

    /// A sequence from anything iterable with textual items.
    pub fn sequence<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        Value::Sequence(items.into_iter().map(|item| item.to_string()).collect())
    }

    /// Number of argv entries this value expands to.
    pub fn arity(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Sequence(items) => items.len(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Scalar(s.clone())
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Value::Scalar(p.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::from(p.as_path())
    }
}

macro_rules! scalar_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::scalar(v)
                }
            }
        )*
    };
}

scalar_from_display!(i32, i64, u32, u64, usize, f64, bool, char);

impl<T: Into<String>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String> + Clone> From<&[T]> for Value {
    fn from(items: &[T]) -> Self {
        Value::Sequence(items.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<String>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// Working directory and environment applied to every spawned process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub cwd: Option<PathBuf>,
    /// Replacement environment. `None` inherits the host environment.
    pub env: Option<Vec<(String, String)>>,
}

/// Name to value table for `$name` substitution, plus process options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    vars: BTreeMap<String, Value>,
    prefix: String,
    options: ProcessOptions,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindings {
    /// Empty bindings with the default `_` reserved prefix.
    pub fn new() -> Self {
        Self::with_prefix("_")
    }

    /// Empty bindings with a custom reserved prefix. An empty prefix
    /// disables reserved entries altogether.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            vars: BTreeMap::new(),
            prefix: prefix.into(),
            options: ProcessOptions::default(),
        }
    }

    /// Empty bindings using the prefix from `config`.
    pub fn with_config(config: &Config) -> Self {
        Self::with_prefix(config.settings.reserved_prefix.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn reserved_suffix<'n>(&self, name: &'n str) -> Option<&'n str> {
        if self.prefix.is_empty() {
            return None;
        }
        name.strip_prefix(self.prefix.as_str())
    }

    /// Bind `name`. Names carrying the reserved prefix are routed to the
    /// process options (`_cwd`, `_env`); any other reserved name is an error.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), Error> {
        let name = name.into();
        let value = value.into();
        let reserved = self.reserved_suffix(&name).map(str::to_owned);
        match reserved.as_deref() {
            Some(CWD_KEY) => match value {
                Value::Scalar(dir) => {
                    self.set_cwd(dir);
                    Ok(())
                }
                Value::Sequence(_) => Err(Error::invalid_binding(
                    &name,
                    "working directory must be a single value",
                )),
            },
            Some(ENV_KEY) => match value {
                Value::Sequence(entries) => {
                    let env = entries
                        .iter()
                        .map(|entry| split_env_entry(&name, entry))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.set_env(env);
                    Ok(())
                }
                Value::Scalar(_) => Err(Error::invalid_binding(
                    &name,
                    "environment must be a sequence of KEY=VALUE entries",
                )),
            },
            Some(_) => Err(Error::ReservedName {
                name,
                prefix: self.prefix.clone(),
            }),
            None => {
                self.vars.insert(name, value);
                Ok(())
            }
        }
    }

    /// Builder form of [`Bindings::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, Error> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn set_cwd(&mut self, dir: impl Into<PathBuf>) {
        self.options.cwd = Some(dir.into());
    }

    /// Replace the environment of every spawned process.
    pub fn set_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
    }

    /// Look up a regular variable. Reserved entries are never returned.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Build bindings from a JSON object.
    ///
    /// Strings, numbers and booleans become scalars in their textual form;
    /// arrays of those become sequences. `_cwd` takes a string, `_env` an
    /// object of strings or an array of `KEY=VALUE` strings.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        Self::from_json_with_prefix(json, "_")
    }

    pub fn from_json_with_prefix(
        json: &serde_json::Value,
        prefix: impl Into<String>,
    ) -> Result<Self, Error> {
        let serde_json::Value::Object(map) = json else {
            return Err(Error::invalid_binding("<root>", "expected a JSON object"));
        };
        let mut bindings = Self::with_prefix(prefix);
        for (name, value) in map {
            if bindings.reserved_suffix(name) == Some(ENV_KEY)
                && let serde_json::Value::Object(vars) = value
            {
                let env = vars
                    .iter()
                    .map(|(k, v)| json_scalar(name, v).map(|v| (k.clone(), v)))
                    .collect::<Result<Vec<_>, _>>()?;
                bindings.set_env(env);
                continue;
            }
            bindings.set(name.clone(), json_value(name, value)?)?;
        }
        Ok(bindings)
    }
}

fn split_env_entry(name: &str, entry: &str) -> Result<(String, String), Error> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::invalid_binding(
            name,
            format!("environment entry {entry:?} is not KEY=VALUE"),
        )),
    }
}

fn json_scalar(name: &str, value: &serde_json::Value) -> Result<String, Error> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Null => Err(Error::invalid_binding(name, "null is not a value")),
        _ => Err(Error::invalid_binding(name, "nested containers are not supported")),
    }
}

fn json_value(name: &str, value: &serde_json::Value) -> Result<Value, Error> {
    match value {
        serde_json::Value::Array(items) => Ok(Value::Sequence(
            items
                .iter()
                .map(|item| json_scalar(name, item))
                .collect::<Result<_, _>>()?,
        )),
        other => json_scalar(name, other).map(Value::Scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_conversions() {
        assert_eq!(Value::from("a b"), Value::Scalar("a b".into()));
        assert_eq!(Value::from(42u32), Value::Scalar("42".into()));
        assert_eq!(Value::from(-7i64), Value::Scalar("-7".into()));
        assert_eq!(Value::from(true), Value::Scalar("true".into()));
        assert_eq!(Value::from(Path::new("/tmp/x")), Value::Scalar("/tmp/x".into()));
    }

    #[test]
    fn sequence_conversions() {
        assert_eq!(Value::from(["a", "b"]), Value::Sequence(vec!["a".into(), "b".into()]));
        assert_eq!(Value::from(Vec::<String>::new()), Value::Sequence(vec![]));
        assert_eq!(Value::sequence(1..=3).arity(), 3);
        assert_eq!(Value::from("x").arity(), 1);
    }

    #[test]
    fn set_and_get() {
        let mut b = Bindings::new();
        b.set("dir", "/tmp").unwrap();
        assert_eq!(b.get("dir"), Some(&Value::Scalar("/tmp".into())));
        assert!(b.get("DIR").is_none());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn reserved_cwd_goes_to_options() {
        let b = Bindings::new().with("_cwd", "/var/tmp").unwrap();
        assert_eq!(b.options().cwd, Some(PathBuf::from("/var/tmp")));
        assert!(b.get("_cwd").is_none());
        assert!(b.is_empty());
    }

    #[test]
    fn reserved_env_goes_to_options() {
        let b = Bindings::new().with("_env", ["A=1", "B=x=y"]).unwrap();
        assert_eq!(
            b.options().env,
            Some(vec![("A".into(), "1".into()), ("B".into(), "x=y".into())])
        );
    }

    #[test]
    fn unknown_reserved_name_rejected() {
        let err = Bindings::new().with("_user", "x").unwrap_err();
        assert!(matches!(err, Error::ReservedName { ref name, .. } if name == "_user"));
    }

    #[test]
    fn reserved_value_shapes_checked() {
        assert!(matches!(
            Bindings::new().with("_cwd", ["a", "b"]),
            Err(Error::InvalidBinding { .. })
        ));
        assert!(matches!(
            Bindings::new().with("_env", "A=1"),
            Err(Error::InvalidBinding { .. })
        ));
        assert!(matches!(
            Bindings::new().with("_env", ["NOEQUALS"]),
            Err(Error::InvalidBinding { .. })
        ));
    }

    #[test]
    fn custom_prefix() {
        let b = Bindings::with_prefix("@")
            .with("_private", "ok")
            .unwrap()
            .with("@cwd", "/")
            .unwrap();
        assert!(b.contains("_private"));
        assert_eq!(b.options().cwd, Some(PathBuf::from("/")));
    }

    #[test]
    fn empty_prefix_disables_reserved_entries() {
        let b = Bindings::with_prefix("").with("cwd", "x").unwrap();
        assert!(b.contains("cwd"));
        assert_eq!(b.options().cwd, None);
    }

    #[test]
    fn prefix_from_config() {
        let mut config = Config::default_config();
        config.settings.reserved_prefix = "%".into();
        assert_eq!(Bindings::with_config(&config).prefix(), "%");
    }

    #[test]
    fn from_json_object() {
        let b = Bindings::from_json(&json!({
            "dir": "a b",
            "n": 3,
            "flag": false,
            "files": ["x", 1],
            "_cwd": "/srv",
            "_env": {"LANG": "C"},
        }))
        .unwrap();
        assert_eq!(b.get("dir"), Some(&Value::Scalar("a b".into())));
        assert_eq!(b.get("n"), Some(&Value::Scalar("3".into())));
        assert_eq!(b.get("flag"), Some(&Value::Scalar("false".into())));
        assert_eq!(b.get("files"), Some(&Value::Sequence(vec!["x".into(), "1".into()])));
        assert_eq!(b.options().cwd, Some(PathBuf::from("/srv")));
        assert_eq!(b.options().env, Some(vec![("LANG".into(), "C".into())]));
    }

    #[test]
    fn from_json_env_array() {
        let b = Bindings::from_json(&json!({"_env": ["A=1"]})).unwrap();
        assert_eq!(b.options().env, Some(vec![("A".into(), "1".into())]));
    }

    #[test]
    fn from_json_rejects_bad_shapes() {
        assert!(Bindings::from_json(&json!(["a"])).is_err());
        assert!(Bindings::from_json(&json!({"x": null})).is_err());
        assert!(Bindings::from_json(&json!({"x": [["nested"]]})).is_err());
        assert!(Bindings::from_json(&json!({"x": {"k": "v"}})).is_err());
        assert!(matches!(
            Bindings::from_json(&json!({"_nope": "v"})),
            Err(Error::ReservedName { .. })
        ));
    }

    #[test]
    fn value_serde_untagged() {
        let v: Value = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(v, Value::Sequence(vec!["a".into(), "b".into()]));
        let v: Value = serde_json::from_str(r#""a""#).unwrap();
        assert_eq!(v, Value::Scalar("a".into()));
    }
}

//! Version key derivation
//!
//! A version key names the group of cache entries that depend on one shape
//! of request parameters: `{prefix}_{name}-{value}_{name}-{value}...`, with
//! parameters in ascending name order. Names and values are escaped
//! (`%` → `%25`, `_` → `%5F`, `-` → `%2D`) so that distinct parameter sets
//! never render to the same key. The prefix keeps its `_` but has `%` and `-`
//! escaped the same way, so it can't be mistaken for a rendered parameter.

use crate::{CacheError, CacheResult};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Scalar request parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Treated as absent
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Some(ParamValue::Null),
            Value::Bool(b) => Some(ParamValue::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .or_else(|| n.as_u64().map(ParamValue::UInt))
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            Value::String(s) => Some(ParamValue::Str(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => Ok(()),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::UInt(u) => write!(f, "{}", u),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        ParamValue::Str(s.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(i: $t) -> Self {
                ParamValue::Int(i64::from(i))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(u: $t) -> Self {
                ParamValue::UInt(u64::from(u))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<usize> for ParamValue {
    fn from(u: usize) -> Self {
        ParamValue::UInt(u as u64)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

fn escape(raw: &str) -> Cow<'_, str> {
    escape_chars(raw, &['%', '_', '-'])
}

/// Every parameter pair carries a raw `-`, so a prefix without one can't
/// absorb a pair
fn escape_prefix(raw: &str) -> Cow<'_, str> {
    escape_chars(raw, &['%', '-'])
}

fn escape_chars<'a>(raw: &'a str, special: &[char]) -> Cow<'a, str> {
    if !raw.contains(special) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' if special.contains(&c) => out.push_str("%25"),
            '_' if special.contains(&c) => out.push_str("%5F"),
            '-' if special.contains(&c) => out.push_str("%2D"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Builds a version key from request parameters.
///
/// ```
/// use versioned_cache::VersionKeyBuilder;
///
/// let key = VersionKeyBuilder::new("version")
///     .param("user", "seyo")
///     .param("phone", "1234")
///     .param("page", 1u32)
///     .only(["user", "phone"])
///     .build();
/// assert_eq!(key, "version_phone-1234_user-seyo");
/// ```
#[derive(Debug, Clone, Default)]
pub struct VersionKeyBuilder {
    prefix: String,
    params: BTreeMap<String, ParamValue>,
    only: BTreeSet<String>,
    except: BTreeSet<String>,
}

impl VersionKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Take parameters from the fields of a serializable struct or map.
    ///
    /// Fields must be scalars or null; nested arrays and objects are rejected.
    pub fn from_serialize<T: Serialize>(
        prefix: impl Into<String>,
        params: &T,
    ) -> CacheResult<Self> {
        let value = serde_json::to_value(params)?;
        let serde_json::Value::Object(fields) = value else {
            return Err(CacheError::InvalidParams(
                "parameters must serialize to a map".to_string(),
            ));
        };

        let mut builder = Self::new(prefix);
        for (name, field) in fields {
            let value = ParamValue::from_json(field).ok_or_else(|| {
                CacheError::InvalidParams(format!("parameter {} is not a scalar", name))
            })?;
            builder.params.insert(name, value);
        }
        Ok(builder)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Restrict the key to these parameter names. Takes precedence over `except`.
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(names.into_iter().map(Into::into));
        self
    }

    /// Leave these parameter names out of the key
    pub fn except<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn build(&self) -> String {
        let mut key = escape_prefix(&self.prefix).into_owned();

        if !self.only.is_empty() {
            for name in &self.only {
                if let Some(value) = self.params.get(name) {
                    push_pair(&mut key, name, value);
                }
            }
            return key;
        }

        for (name, value) in &self.params {
            if self.except.contains(name) {
                continue;
            }
            push_pair(&mut key, name, value);
        }
        key
    }
}

fn push_pair(key: &mut String, name: &str, value: &ParamValue) {
    if value.is_null() {
        return;
    }
    key.push('_');
    key.push_str(&escape(name));
    key.push('-');
    key.push_str(&escape(&value.to_string()));
}

/// One-shot form of [`VersionKeyBuilder`].
///
/// An empty `only_params` means "no allow-list"; an empty `except_params`
/// means "exclude nothing".
pub fn build_version_key<I, K, V>(
    params: I,
    prefix: &str,
    only_params: &[&str],
    except_params: &[&str],
) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    VersionKeyBuilder::new(prefix)
        .params(params)
        .only(only_params.iter().copied())
        .except(except_params.iter().copied())
        .build()
}

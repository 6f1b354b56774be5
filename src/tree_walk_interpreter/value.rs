mod methods;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    sync::Arc,
};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::ser::{SerializeMap, SerializeSeq};

pub(crate) use self::methods::call_builtin;
use super::{callable::Callable, error::ScriptError, ExecutionErrorKind};
use crate::ast::ClassStmt;

/// Host-provided objects stored in [`Value::Any`].
pub trait HostObject: Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn get_property(&self, name: &str) -> Option<Value>;

    fn set_property(&self, name: &str, _value: Value) -> Result<(), ExecutionErrorKind> {
        Err(ExecutionErrorKind::ReadOnlyProperty {
            type_name: self.type_name().to_string(),
            property: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<RwLock<PropertyMap>>),
    Instance(Arc<Instance>),
    Function(Arc<Callable>),
    Error(Arc<ScriptError>),
    Any(Arc<dyn HostObject>),
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(values)))
    }

    pub fn object(map: PropertyMap) -> Self {
        Value::Object(Arc::new(RwLock::new(map)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(_) => "object".to_string(),
            Value::Instance(instance) => instance.class.display_name(),
            Value::Function(_) => "callable".to_string(),
            Value::Error(_) => "Error".to_string(),
            Value::Any(host) => host.type_name().to_string(),
        }
    }

    /// Integer view. Numeric strings qualify only when they spell an integer.
    pub fn as_int(&self) -> Option<Result<i64, ExecutionErrorKind>> {
        match self {
            Value::Null => Some(Ok(0)),
            Value::Bool(b) => Some(Ok(i64::from(*b))),
            Value::Int(i) => Some(Ok(*i)),
            Value::Float(f) => Some(if f.is_finite() && f.abs() < i64::MAX as f64 {
                Ok(f.trunc() as i64)
            } else {
                Err(ExecutionErrorKind::UnsupportedOperand(format!(
                    "int conversion of {f}"
                )))
            }),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Ok),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<Result<f64, ExecutionErrorKind>> {
        match self {
            Value::Null => Some(Ok(0.0)),
            Value::Bool(b) => Some(Ok(f64::from(u8::from(*b)))),
            Value::Int(i) => Some(Ok(*i as f64)),
            Value::Float(f) => Some(Ok(*f)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Ok),
            _ => None,
        }
    }

    /// String view. Callables and host objects have none.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Function(_) | Value::Any(_) => None,
            value => Some(value.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Null => Some(false),
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::String(s) => Some(!s.is_empty() && s != "0"),
            Value::Array(values) => Some(!values.read().is_empty()),
            _ => None,
        }
    }

    /// Boolean view, falling back to "anything non-null is true".
    pub fn is_truthy(&self) -> bool {
        self.as_bool().unwrap_or(!self.is_null())
    }

    /// Same value and same runtime tag; containers compare by identity.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b) || {
                    let (a, b) = (a.read(), b.read());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.identical(b))
                }
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            (Value::Any(a), Value::Any(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }

    /// Converts into a plain JSON value for the host. Instances export their
    /// properties, callables and host objects become `null`.
    pub fn to_host(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_host(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(values) => {
                Value::array(values.into_iter().map(Value::from_host).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from_host(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "1"),
            Value::Bool(false) => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(values) => {
                let Some(_visit) = Visit::enter(Arc::as_ptr(values).cast()) else {
                    return write!(f, "[...]");
                };
                write!(f, "[")?;
                for (i, value) in values.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    value.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                let Some(_visit) = Visit::enter(Arc::as_ptr(map).cast()) else {
                    return write!(f, "{{...}}");
                };
                write!(f, "{{")?;
                for (i, (key, value)) in map.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: ")?;
                    value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Instance(instance) => write!(f, "<instance of {}>", instance.class.display_name()),
            Value::Function(callable) => write!(f, "{callable}"),
            Value::Error(error) => write!(f, "{}", error.message()),
            Value::Any(host) => write!(f, "<{}>", host.type_name()),
        }
    }
}

thread_local! {
    static OPEN: RefCell<Vec<*const ()>> = const { RefCell::new(Vec::new()) };
}

/// A container currently being rendered on this thread. Entering one that
/// is already open means the value contains itself.
struct Visit;

impl Visit {
    fn enter(container: *const ()) -> Option<Self> {
        OPEN.with_borrow_mut(|open| {
            if open.contains(&container) {
                return None;
            }
            open.push(container);
            Some(Visit)
        })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        OPEN.with_borrow_mut(|open| {
            open.pop();
        });
    }
}

impl Value {
    fn fmt_nested(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s:?}"),
            value => write!(f, "{value}"),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Function(_) | Value::Any(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Error(error) => serializer.serialize_str(&error.message()),
            Value::Array(values) => {
                let values = values.read();
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values.iter() {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Value::Object(map) => map.read().serialize(serializer),
            Value::Instance(instance) => instance.properties.read().serialize(serializer),
        }
    }
}

/// String-keyed map that remembers insertion order.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(String, Value)>,
    index: FxHashMap<String, usize>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = PropertyMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl serde::Serialize for PropertyMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// An object created by `new`.
#[derive(Debug)]
pub struct Instance {
    pub class: Arc<ClassStmt>,
    pub properties: RwLock<PropertyMap>,
}

impl Instance {
    pub fn new(class: Arc<ClassStmt>) -> Self {
        Self {
            class,
            properties: RwLock::new(PropertyMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.properties.write().insert(name, value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.read().contains_key(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn self_containing_values_display() {
        let list = Value::array(vec![Value::Int(1)]);
        let Value::Array(values) = &list else { unreachable!() };
        values.write().push(list.clone());
        assert_eq!(list.to_string(), "[1, [...]]");

        let map = Value::object(PropertyMap::new());
        let Value::Object(entries) = &map else { unreachable!() };
        entries.write().insert("me", map.clone());
        assert_eq!(map.to_string(), "{me: {...}}");
        values.write().clear();
        *entries.write() = PropertyMap::new();
    }

    #[test]
    fn capability_views() {
        assert_eq!(Value::from("42").as_int().map(Result::ok), Some(Some(42)));
        assert!(Value::from("4.5").as_int().is_none());
        assert_eq!(Value::from("4.5").as_float().map(Result::ok), Some(Some(4.5)));
        assert!(Value::from("abc").as_float().is_none());
        assert_eq!(Value::Bool(true).as_string(), Some("1".to_string()));
        assert_eq!(Value::Bool(false).as_string(), Some(String::new()));
        assert_eq!(Value::Null.as_string(), Some(String::new()));
        assert!(matches!(Value::Float(f64::INFINITY).as_int(), Some(Err(_))));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("a").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(Value::object(PropertyMap::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn display_nested() {
        let value = Value::array(vec![
            Value::Int(1),
            Value::from("two"),
            Value::Null,
            Value::object([("k".to_string(), Value::Float(2.5))].into_iter().collect()),
        ]);
        assert_eq!(value.to_string(), r#"[1, "two", null, {k: 2.5}]"#);
        assert_eq!(Value::Float(3.0).to_string(), "3");
    }

    #[test]
    fn host_round_trip() {
        let json = serde_json::json!({"name": "ada", "tags": [1, 2.5, null], "ok": true});
        let value = Value::from_host(json.clone());
        let Value::Object(map) = &value else {
            panic!("expected an object");
        };
        assert_eq!(map.read().keys().collect::<Vec<_>>(), vec!["name", "ok", "tags"]);
        assert_eq!(value.to_host(), json);
    }

    #[test]
    fn property_map_keeps_order() {
        let mut map = PropertyMap::new();
        map.insert("b", Value::Int(1));
        map.insert("a", Value::Int(2));
        map.insert("b", Value::Int(3));
        let entries: Vec<(&str, i64)> = map
            .iter()
            .map(|(k, v)| (k, v.as_int().and_then(Result::ok).unwrap_or_default()))
            .collect();
        assert_eq!(entries, vec![("b", 3), ("a", 2)]);
    }
}

//! 宿主侧值类型
//!
//! `HostValue` 是桥接层在宿主侧使用的统一值表示。基本类型按值传递，
//! 对象、类和脚本对象按引用传递，引用相等即身份相等。

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use super::call::Call;
use super::class::HostClass;
use super::object::HostObject;
use crate::bindings::GuestObject;
use crate::core::error::HostResult;

/// 宿主侧值
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<HostValue>),
    Dict(IndexMap<String, HostValue>),
    Object(HostObject),
    Class(HostClass),
    Function(HostFunction),
    Guest(GuestObject),
}

impl HostValue {
    /// 类型名称，用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Object(_) => "object",
            Self::Class(_) => "class",
            Self::Function(_) => "function",
            Self::Guest(_) => "guest object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `undefined` 或 `null`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 && value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<String, HostValue>> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&HostClass> {
        match self {
            Self::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_guest(&self) -> Option<&GuestObject> {
        match self {
            Self::Guest(guest) => Some(guest),
            _ => None,
        }
    }

    /// 字典取值的便捷方法
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_dict().and_then(|entries| entries.get(key))
    }

    /// 按脚本语义的真值
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            _ => true,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Class(a), Self::Class(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Guest(a), Self::Guest(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<usize> for HostValue {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Self::Float(value as f64), Self::Int)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        Self::List(items)
    }
}

impl From<IndexMap<String, HostValue>> for HostValue {
    fn from(entries: IndexMap<String, HostValue>) -> Self {
        Self::Dict(entries)
    }
}

impl From<HostObject> for HostValue {
    fn from(object: HostObject) -> Self {
        Self::Object(object)
    }
}

impl From<HostClass> for HostValue {
    fn from(class: HostClass) -> Self {
        Self::Class(class)
    }
}

impl From<HostFunction> for HostValue {
    fn from(function: HostFunction) -> Self {
        Self::Function(function)
    }
}

impl From<GuestObject> for HostValue {
    fn from(guest: GuestObject) -> Self {
        Self::Guest(guest)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

type NativeFn = dyn Fn(&Call<'_>) -> HostResult<HostValue>;

/// 宿主函数
///
/// 不属于任何类的宿主可调用对象，跨越边界后在脚本侧表现为普通函数。
#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    callable: Rc<NativeFn>,
}

impl HostFunction {
    pub fn new<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Call<'_>) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        Self {
            name: Rc::from(name.into()),
            callable: Rc::new(move |call: &Call<'_>| f(call).map(Into::into)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, call: &Call<'_>) -> HostResult<HostValue> {
        (self.callable)(call)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.callable, &other.callable)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality() {
        assert_eq!(HostValue::Int(3), HostValue::Float(3.0));
        assert_ne!(HostValue::Int(3), HostValue::Float(3.5));
        assert_eq!(HostValue::Float(2.0).as_int(), Some(2));
        assert_eq!(HostValue::Float(2.5).as_int(), None);
    }

    #[test]
    fn test_undefined_and_null_are_distinct() {
        assert_ne!(HostValue::Undefined, HostValue::Null);
        assert!(HostValue::Undefined.is_nullish());
        assert!(HostValue::Null.is_nullish());
        assert!(!HostValue::Null.truthy());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(HostValue::from("thing"), HostValue::String("thing".to_string()));
        assert_eq!(HostValue::from(Some(1)), HostValue::Int(1));
        assert_eq!(HostValue::from(None::<i32>), HostValue::Undefined);
        assert_eq!(HostValue::from(7usize), HostValue::Int(7));
    }

    #[test]
    fn test_dict_lookup() {
        let mut entries = IndexMap::new();
        entries.insert("writable".to_string(), HostValue::Bool(true));
        let value = HostValue::Dict(entries);
        assert_eq!(value.get("writable"), Some(&HostValue::Bool(true)));
        assert_eq!(value.get("enumerable"), None);
        assert_eq!(HostValue::Int(1).get("writable"), None);
    }

    #[test]
    fn test_function_identity() {
        let f = HostFunction::new("answer", |_call| Ok(42));
        let g = f.clone();
        let h = HostFunction::new("answer", |_call| Ok(42));
        assert_eq!(HostValue::from(f.clone()), HostValue::from(g));
        assert_ne!(HostValue::from(f), HostValue::from(h));
    }
}

//! 宿主类描述
//!
//! `ClassBuilder<T>` 以类型安全的方式声明一个宿主类：构造函数、实例方法、
//! 静态方法、类方法、属性，以及可选的映射/序列容器协议。构建结果
//! `HostClass` 是共享的类描述，成员表在构建后不可变。
//!
//! ## 使用示例
//!
//! ```rust
//! use script_bridge::{ClassBuilder, HostValue};
//! use std::cell::Cell;
//!
//! struct Counter {
//!     count: Cell<i64>,
//! }
//!
//! let class = ClassBuilder::<Counter>::new("Counter")
//!     .constructor(|call| Ok(Counter { count: Cell::new(call.int(0).unwrap_or(0)) }))
//!     .method("increment", |counter, _call| {
//!         counter.count.set(counter.count.get() + 1);
//!         Ok(counter.count.get())
//!     })
//!     .property("count", |counter| Ok(counter.count.get()))
//!     .build();
//!
//! let counter = class.instantiate(&[HostValue::Int(2)]).unwrap();
//! assert_eq!(counter.downcast_ref::<Counter>().unwrap().count.get(), 2);
//! ```

use std::any::{Any, TypeId};
use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::call::Call;
use super::object::HostObject;
use super::value::HostValue;
use crate::bindings::ClassTemplate;
use crate::core::error::{HostError, HostResult};

/// 类的唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

pub(crate) type InstanceFn = Rc<dyn Fn(&HostObject, &Call<'_>) -> HostResult<HostValue>>;
pub(crate) type StaticFn = Rc<dyn Fn(&Call<'_>) -> HostResult<HostValue>>;
pub(crate) type ClassFn = Rc<dyn Fn(&HostClass, &Call<'_>) -> HostResult<HostValue>>;
pub(crate) type Getter = Rc<dyn Fn(&HostObject) -> HostResult<HostValue>>;
pub(crate) type Setter = Rc<dyn Fn(&HostObject, HostValue) -> HostResult<()>>;
pub(crate) type Upcast = Rc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any>>;
type Constructor = Rc<dyn Fn(&Call<'_>) -> HostResult<Box<dyn Any>>>;

type KeysFn = Rc<dyn Fn(&HostObject) -> HostResult<Vec<String>>>;
type KeyGetFn = Rc<dyn Fn(&HostObject, &str) -> HostResult<HostValue>>;
type KeySetFn = Rc<dyn Fn(&HostObject, &str, HostValue) -> HostResult<()>>;
type KeyDeleteFn = Rc<dyn Fn(&HostObject, &str) -> HostResult<()>>;
type LenFn = Rc<dyn Fn(&HostObject) -> HostResult<usize>>;
type IndexGetFn = Rc<dyn Fn(&HostObject, u32) -> HostResult<HostValue>>;
type IndexSetFn = Rc<dyn Fn(&HostObject, u32, HostValue) -> HostResult<()>>;
type IndexDeleteFn = Rc<dyn Fn(&HostObject, u32) -> HostResult<()>>;

/// 类成员
#[derive(Clone)]
pub enum Member {
    /// 静态方法，无接收者
    StaticMethod(StaticFn),
    /// 类方法，接收者为类本身
    ClassMethod(ClassFn),
    /// 实例方法
    InstanceMethod(InstanceFn),
    /// 属性
    Property {
        getter: Getter,
        setter: Option<Setter>,
        enumerable: bool,
    },
}

impl Member {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaticMethod(_) => "static method",
            Self::ClassMethod(_) => "class method",
            Self::InstanceMethod(_) => "method",
            Self::Property { .. } => "property",
        }
    }

    pub fn is_property(&self) -> bool {
        matches!(self, Self::Property { .. })
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property {
                setter, enumerable, ..
            } => f
                .debug_struct("Property")
                .field("writable", &setter.is_some())
                .field("enumerable", enumerable)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// 成员表条目
#[derive(Debug, Clone)]
pub struct MemberEntry {
    pub name: String,
    pub member: Member,
    pub hidden: bool,
}

/// 映射协议：按字符串键访问
#[derive(Clone)]
pub struct MappingProtocol {
    keys: KeysFn,
    get: KeyGetFn,
    set: Option<KeySetFn>,
    delete: Option<KeyDeleteFn>,
}

impl MappingProtocol {
    pub fn keys(&self, object: &HostObject) -> HostResult<Vec<String>> {
        (self.keys)(object)
    }

    pub fn contains(&self, object: &HostObject, key: &str) -> HostResult<bool> {
        Ok(self.keys(object)?.iter().any(|candidate| candidate == key))
    }

    pub fn get(&self, object: &HostObject, key: &str) -> HostResult<HostValue> {
        (self.get)(object, key)
    }

    /// 没有 set 钩子时为空操作
    pub fn set(&self, object: &HostObject, key: &str, value: HostValue) -> HostResult<()> {
        match &self.set {
            Some(set) => set(object, key, value),
            None => Ok(()),
        }
    }

    /// 没有 delete 钩子时为空操作
    pub fn delete(&self, object: &HostObject, key: &str) -> HostResult<()> {
        match &self.delete {
            Some(delete) => delete(object, key),
            None => Ok(()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

/// 序列协议：按整数下标访问
#[derive(Clone)]
pub struct SequenceProtocol {
    len: LenFn,
    get: IndexGetFn,
    set: Option<IndexSetFn>,
    delete: Option<IndexDeleteFn>,
}

impl SequenceProtocol {
    pub fn len(&self, object: &HostObject) -> HostResult<usize> {
        (self.len)(object)
    }

    pub fn get(&self, object: &HostObject, index: u32) -> HostResult<HostValue> {
        (self.get)(object, index)
    }

    pub fn set(&self, object: &HostObject, index: u32, value: HostValue) -> HostResult<()> {
        match &self.set {
            Some(set) => set(object, index, value),
            None => Ok(()),
        }
    }

    pub fn delete(&self, object: &HostObject, index: u32) -> HostResult<()> {
        match &self.delete {
            Some(delete) => delete(object, index),
            None => Ok(()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

struct BaseLink {
    class: HostClass,
    upcast: Upcast,
}

struct ClassInner {
    id: ClassId,
    name: String,
    type_id: TypeId,
    base: Option<BaseLink>,
    constructor: Option<Constructor>,
    constructible: bool,
    members: Vec<MemberEntry>,
    hidden: HashSet<String>,
    mapping: Option<MappingProtocol>,
    sequence: Option<SequenceProtocol>,
    template: OnceCell<Rc<ClassTemplate>>,
}

/// 宿主类
#[derive(Clone)]
pub struct HostClass(Rc<ClassInner>);

impl HostClass {
    pub fn id(&self) -> ClassId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn base(&self) -> Option<&HostClass> {
        self.0.base.as_ref().map(|link| &link.class)
    }

    pub(crate) fn base_link(&self) -> Option<(&HostClass, &Upcast)> {
        self.0.base.as_ref().map(|link| (&link.class, &link.upcast))
    }

    /// 自身或任一基类的标识等于 `id`
    pub fn is_subclass_of(&self, id: ClassId) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if current.id() == id {
                return true;
            }
            class = current.base();
        }
        false
    }

    pub fn is_constructible(&self) -> bool {
        self.0.constructible && self.0.constructor.is_some()
    }

    /// 本类声明的成员，按声明顺序
    pub fn members(&self) -> &[MemberEntry] {
        &self.0.members
    }

    /// 本类隐藏的成员名（包括从基类继承的成员）
    pub fn hides(&self, name: &str) -> bool {
        self.0.hidden.contains(name)
    }

    /// 生效的映射协议（自身优先，其次继承）
    pub fn mapping(&self) -> Option<&MappingProtocol> {
        self.0
            .mapping
            .as_ref()
            .or_else(|| self.base().and_then(HostClass::mapping))
    }

    /// 生效的序列协议（自身优先，其次继承）
    pub fn sequence(&self) -> Option<&SequenceProtocol> {
        self.0
            .sequence
            .as_ref()
            .or_else(|| self.base().and_then(HostClass::sequence))
    }

    /// 在宿主侧直接实例化
    pub fn instantiate(&self, args: &[HostValue]) -> HostResult<HostObject> {
        self.construct(&Call::detached(args))
    }

    pub fn construct(&self, call: &Call<'_>) -> HostResult<HostObject> {
        let constructor = match (&self.0.constructor, self.0.constructible) {
            (Some(constructor), true) => constructor,
            _ => return Err(HostError::NotConstructible(self.name().to_string())),
        };
        let value = constructor(call)?;
        Ok(HostObject::from_boxed(self.clone(), value))
    }

    pub(crate) fn template_cell(&self) -> &OnceCell<Rc<ClassTemplate>> {
        &self.0.template
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.0.name)
            .field("id", &self.0.id)
            .field("base", &self.base().map(HostClass::name))
            .finish()
    }
}

fn instance_fn<F>(f: F) -> InstanceFn
where
    F: Fn(&HostObject, &Call<'_>) -> HostResult<HostValue> + 'static,
{
    Rc::new(f)
}

fn static_fn<F>(f: F) -> StaticFn
where
    F: Fn(&Call<'_>) -> HostResult<HostValue> + 'static,
{
    Rc::new(f)
}

fn class_fn<F>(f: F) -> ClassFn
where
    F: Fn(&HostClass, &Call<'_>) -> HostResult<HostValue> + 'static,
{
    Rc::new(f)
}

fn constructor_fn<F>(f: F) -> Constructor
where
    F: Fn(&Call<'_>) -> HostResult<Box<dyn Any>> + 'static,
{
    Rc::new(f)
}

fn upcast_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any>,
{
    f
}

/// 接收者类型检查
fn receiver<'o, T: Any>(object: &'o HostObject, class: &str, member: &str) -> HostResult<&'o T> {
    object
        .downcast_ref::<T>()
        .ok_or_else(|| HostError::InvalidReceiver {
            expected: class.to_string(),
            method: member.to_string(),
        })
}

/// 宿主类构建器
pub struct ClassBuilder<T> {
    name: String,
    base: Option<BaseLink>,
    constructor: Option<Constructor>,
    constructible: bool,
    members: Vec<MemberEntry>,
    hidden: HashSet<String>,
    enumerable: HashSet<String>,
    keys: Option<KeysFn>,
    key_get: Option<KeyGetFn>,
    key_set: Option<KeySetFn>,
    key_delete: Option<KeyDeleteFn>,
    len: Option<LenFn>,
    index_get: Option<IndexGetFn>,
    index_set: Option<IndexSetFn>,
    index_delete: Option<IndexDeleteFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            constructor: None,
            constructible: true,
            members: Vec::new(),
            hidden: HashSet::new(),
            enumerable: HashSet::new(),
            keys: None,
            key_get: None,
            key_set: None,
            key_delete: None,
            len: None,
            index_get: None,
            index_set: None,
            index_delete: None,
            _marker: PhantomData,
        }
    }

    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Call<'_>) -> HostResult<T> + 'static,
    {
        self.constructor = Some(constructor_fn(move |call| {
            f(call).map(|value| Box::new(value) as Box<dyn Any>)
        }));
        self
    }

    /// 禁止脚本侧构造，即使声明了构造函数
    pub fn unconstructable(mut self) -> Self {
        self.constructible = false;
        self
    }

    /// 声明基类及向上转换
    pub fn extends<B, F>(mut self, base: &HostClass, upcast: F) -> Self
    where
        B: Any,
        F: Fn(&T) -> &B + 'static,
    {
        let upcast: Upcast = Rc::new(upcast_fn(move |value: &dyn Any| {
            value
                .downcast_ref::<T>()
                .map(|derived| upcast(derived) as &dyn Any)
        }));
        self.base = Some(BaseLink {
            class: base.clone(),
            upcast,
        });
        self
    }

    pub fn method<F, R>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Call<'_>) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let name = name.into();
        let (class, member) = (self.name.clone(), name.clone());
        let callable = instance_fn(move |object, call| {
            let this = receiver::<T>(object, &class, &member)?;
            f(this, call).map(Into::into)
        });
        self.push(name, Member::InstanceMethod(callable))
    }

    pub fn static_method<F, R>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Call<'_>) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let callable = static_fn(move |call| f(call).map(Into::into));
        self.push(name.into(), Member::StaticMethod(callable))
    }

    pub fn class_method<F, R>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HostClass, &Call<'_>) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let callable = class_fn(move |class, call| f(class, call).map(Into::into));
        self.push(name.into(), Member::ClassMethod(callable))
    }

    /// 只读属性
    pub fn property<G, R>(self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&T) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let name = name.into();
        let getter = self.getter(&name, getter);
        self.push(
            name,
            Member::Property {
                getter,
                setter: None,
                enumerable: false,
            },
        )
    }

    /// 可写属性
    pub fn property_with_setter<G, S, R>(self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> HostResult<R> + 'static,
        S: Fn(&T, HostValue) -> HostResult<()> + 'static,
        R: Into<HostValue>,
    {
        let name = name.into();
        let getter = self.getter(&name, getter);
        let (class, member) = (self.name.clone(), name.clone());
        let setter: Setter = Rc::new(move |object: &HostObject, value: HostValue| {
            setter(receiver::<T>(object, &class, &member)?, value)
        });
        self.push(
            name,
            Member::Property {
                getter,
                setter: Some(setter),
                enumerable: false,
            },
        )
    }

    /// 将属性标记为可枚举
    pub fn enumerable(mut self, name: impl Into<String>) -> Self {
        self.enumerable.insert(name.into());
        self
    }

    /// 隐藏成员：不暴露给脚本，包括继承来的同名成员
    pub fn hide(mut self, name: impl Into<String>) -> Self {
        self.hidden.insert(name.into());
        self
    }

    /// 映射协议
    pub fn mapping<K, G, R>(mut self, keys: K, get: G) -> Self
    where
        K: Fn(&T) -> Vec<String> + 'static,
        G: Fn(&T, &str) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let class = self.name.clone();
        self.keys = Some(Rc::new(move |object: &HostObject| {
            Ok(keys(receiver::<T>(object, &class, "keys")?))
        }));
        let class = self.name.clone();
        self.key_get = Some(Rc::new(move |object: &HostObject, key: &str| {
            get(receiver::<T>(object, &class, key)?, key).map(Into::into)
        }));
        self
    }

    pub fn mapping_set<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &str, HostValue) -> HostResult<()> + 'static,
    {
        let class = self.name.clone();
        self.key_set = Some(Rc::new(
            move |object: &HostObject, key: &str, value: HostValue| {
                f(receiver::<T>(object, &class, key)?, key, value)
            },
        ));
        self
    }

    pub fn mapping_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &str) -> HostResult<()> + 'static,
    {
        let class = self.name.clone();
        self.key_delete = Some(Rc::new(move |object: &HostObject, key: &str| {
            f(receiver::<T>(object, &class, key)?, key)
        }));
        self
    }

    /// 序列协议
    pub fn sequence<L, G, R>(mut self, len: L, get: G) -> Self
    where
        L: Fn(&T) -> usize + 'static,
        G: Fn(&T, u32) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let class = self.name.clone();
        self.len = Some(Rc::new(move |object: &HostObject| {
            Ok(len(receiver::<T>(object, &class, "length")?))
        }));
        let class = self.name.clone();
        self.index_get = Some(Rc::new(move |object: &HostObject, index: u32| {
            get(receiver::<T>(object, &class, "[]")?, index).map(Into::into)
        }));
        self
    }

    pub fn sequence_set<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, u32, HostValue) -> HostResult<()> + 'static,
    {
        let class = self.name.clone();
        self.index_set = Some(Rc::new(
            move |object: &HostObject, index: u32, value: HostValue| {
                f(receiver::<T>(object, &class, "[]=")?, index, value)
            },
        ));
        self
    }

    pub fn sequence_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, u32) -> HostResult<()> + 'static,
    {
        let class = self.name.clone();
        self.index_delete = Some(Rc::new(move |object: &HostObject, index: u32| {
            f(receiver::<T>(object, &class, "delete []")?, index)
        }));
        self
    }

    pub fn build(self) -> HostClass {
        let hidden = self.hidden;
        let enumerable = self.enumerable;
        let members = self
            .members
            .into_iter()
            .map(|mut entry| {
                entry.hidden = hidden.contains(&entry.name);
                if let Member::Property {
                    enumerable: ref mut flag,
                    ..
                } = entry.member
                {
                    *flag = enumerable.contains(&entry.name);
                }
                entry
            })
            .collect();

        let mapping = match (self.keys, self.key_get) {
            (Some(keys), Some(get)) => Some(MappingProtocol {
                keys,
                get,
                set: self.key_set,
                delete: self.key_delete,
            }),
            _ => None,
        };
        let sequence = match (self.len, self.index_get) {
            (Some(len), Some(get)) => Some(SequenceProtocol {
                len,
                get,
                set: self.index_set,
                delete: self.index_delete,
            }),
            _ => None,
        };

        let class = HostClass(Rc::new(ClassInner {
            id: ClassId::next(),
            name: self.name,
            type_id: TypeId::of::<T>(),
            base: self.base,
            constructor: self.constructor,
            constructible: self.constructible,
            members,
            hidden,
            mapping,
            sequence,
            template: OnceCell::new(),
        }));
        tracing::trace!(target: "bridge", class = class.name(), id = class.id().raw(), "Host class built");
        class
    }

    fn getter<G, R>(&self, name: &str, getter: G) -> Getter
    where
        G: Fn(&T) -> HostResult<R> + 'static,
        R: Into<HostValue>,
    {
        let (class, member) = (self.name.clone(), name.to_string());
        Rc::new(move |object: &HostObject| {
            getter(receiver::<T>(object, &class, &member)?).map(Into::into)
        })
    }

    fn push(mut self, name: String, member: Member) -> Self {
        // 同名成员后声明者覆盖先声明者
        self.members.retain(|entry| entry.name != name);
        self.members.push(MemberEntry {
            name,
            member,
            hidden: false,
        });
        self
    }
}

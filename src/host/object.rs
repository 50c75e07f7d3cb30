//! 宿主对象
//!
//! `HostObject` 是共享所有权的宿主实例：所属类加上类型擦除后的 Rust 值。
//! 对象身份即指针身份。

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use super::class::HostClass;
use crate::core::error::{HostError, HostResult};

struct ObjectInner {
    class: HostClass,
    value: Box<dyn Any>,
}

/// 宿主实例
#[derive(Clone)]
pub struct HostObject(Rc<ObjectInner>);

impl HostObject {
    /// 用给定类包装一个 Rust 值
    ///
    /// 值的类型必须与类声明时的类型一致。
    pub fn new<T: Any>(class: &HostClass, value: T) -> HostResult<Self> {
        if class.type_id() != TypeId::of::<T>() {
            return Err(HostError::type_error(format!(
                "value is not an instance of {}",
                class.name()
            )));
        }
        Ok(Self::from_boxed(class.clone(), Box::new(value)))
    }

    pub(crate) fn from_boxed(class: HostClass, value: Box<dyn Any>) -> Self {
        Self(Rc::new(ObjectInner { class, value }))
    }

    pub fn class(&self) -> &HostClass {
        &self.0.class
    }

    /// 按类型取出内部值
    ///
    /// 沿基类链逐级向上转换，派生类实例也可以按基类类型访问。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let mut current: &dyn Any = self.0.value.as_ref();
        let mut class = self.class();
        loop {
            if let Some(value) = current.downcast_ref::<T>() {
                return Some(value);
            }
            let (base, upcast) = class.base_link()?;
            current = upcast(current)?;
            class = base;
        }
    }

    pub fn is_instance_of(&self, class: &HostClass) -> bool {
        self.class().is_subclass_of(class.id())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// 身份键，供标识映射使用
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({} @ {:#x})", self.class().name(), self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ClassBuilder;

    struct Shape {
        sides: u32,
    }

    struct Square {
        shape: Shape,
        edge: f64,
    }

    #[test]
    fn test_type_checked_construction() {
        let class = ClassBuilder::<Shape>::new("Shape").build();
        assert!(HostObject::new(&class, Shape { sides: 3 }).is_ok());
        assert!(HostObject::new(&class, 3u32).is_err());
    }

    #[test]
    fn test_downcast_through_base() {
        let shape = ClassBuilder::<Shape>::new("Shape").build();
        let square = ClassBuilder::<Square>::new("Square")
            .extends(&shape, |square: &Square| &square.shape)
            .build();
        let object = HostObject::new(
            &square,
            Square {
                shape: Shape { sides: 4 },
                edge: 2.0,
            },
        )
        .unwrap();

        assert_eq!(object.downcast_ref::<Square>().map(|s| s.edge), Some(2.0));
        assert_eq!(object.downcast_ref::<Shape>().map(|s| s.sides), Some(4));
        assert!(object.downcast_ref::<String>().is_none());
        assert!(object.is_instance_of(&shape));
    }

    #[test]
    fn test_identity() {
        let class = ClassBuilder::<Shape>::new("Shape").build();
        let a = HostObject::new(&class, Shape { sides: 1 }).unwrap();
        let b = a.clone();
        let c = HostObject::new(&class, Shape { sides: 1 }).unwrap();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.addr(), b.addr());
        assert_eq!(a.strong_count(), 2);
    }
}

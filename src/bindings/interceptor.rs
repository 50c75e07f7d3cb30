//! 命名属性拦截
//!
//! 读取的解析顺序：
//!
//! 1. 映射协议中存在的键
//! 2. 声明的属性（含继承）
//! 3. 实例方法：不在这里处理，由引擎沿原型链找到
//! 4. 都没有时返回未找到，交给引擎默认行为
//!
//! 所有函数都返回“是否由宿主处理”，未处理的操作由陷阱转交引擎，
//! 作用于包装器目标对象上的普通属性。

use super::projector::ClassTemplate;
use crate::core::error::HostResult;
use crate::host::{HostObject, HostValue};

/// 属性描述符
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub value: HostValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// 默认描述符：可写、不可枚举、可配置
    pub fn data(value: HostValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }
}

fn is_mapping_key(template: &ClassTemplate, object: &HostObject, key: &str) -> HostResult<bool> {
    match template.mapping() {
        Some(mapping) => mapping.contains(object, key),
        None => Ok(false),
    }
}

pub fn get(
    template: &ClassTemplate,
    object: &HostObject,
    key: &str,
) -> HostResult<Option<HostValue>> {
    if let Some(mapping) = template.mapping() {
        if mapping.contains(object, key)? {
            return mapping.get(object, key).map(Some);
        }
    }
    match template.property(key) {
        Some(property) => (property.getter)(object).map(Some),
        None => Ok(None),
    }
}

/// 写入；只读属性的写入是静默的空操作
pub fn set(
    template: &ClassTemplate,
    object: &HostObject,
    key: &str,
    value: HostValue,
) -> HostResult<bool> {
    if let Some(mapping) = template.mapping() {
        if mapping.contains(object, key)? {
            mapping.set(object, key, value)?;
            return Ok(true);
        }
    }
    match template.property(key) {
        Some(property) => {
            if let Some(setter) = &property.setter {
                setter(object, value)?;
            }
            Ok(true)
        }
        None => Ok(false),
    }
}

/// 删除；声明的成员不可删除，但总是报告成功
pub fn delete(template: &ClassTemplate, object: &HostObject, key: &str) -> HostResult<bool> {
    if let Some(mapping) = template.mapping() {
        if mapping.contains(object, key)? {
            mapping.delete(object, key)?;
            return Ok(true);
        }
    }
    Ok(template.exposes(key))
}

pub fn query(
    template: &ClassTemplate,
    object: &HostObject,
    key: &str,
) -> HostResult<Option<PropertyDescriptor>> {
    if let Some(mapping) = template.mapping() {
        if mapping.contains(object, key)? {
            let value = mapping.get(object, key)?;
            return Ok(Some(PropertyDescriptor::data(value)));
        }
    }
    match template.property(key) {
        Some(property) => {
            let value = (property.getter)(object)?;
            Ok(Some(
                PropertyDescriptor::data(value)
                    .writable(property.setter.is_some())
                    .enumerable(property.enumerable),
            ))
        }
        None => Ok(None),
    }
}

/// 不调用 getter 的存在性判断
pub fn has(template: &ClassTemplate, object: &HostObject, key: &str) -> HostResult<bool> {
    Ok(is_mapping_key(template, object, key)? || template.property(key).is_some())
}

/// 映射键（协议顺序），然后是可枚举的声明属性
pub fn enumerate(template: &ClassTemplate, object: &HostObject) -> HostResult<Vec<String>> {
    let mut keys = match template.mapping() {
        Some(mapping) => mapping.keys(object)?,
        None => Vec::new(),
    };
    for (name, property) in template.properties() {
        if property.enumerable && !keys.contains(name) {
            keys.push(name.clone());
        }
    }
    Ok(keys)
}

//! 脚本侧包装器工厂
//!
//! 每个上下文求值一次的 JS 工厂函数。它负责创建 `Proxy` 包装器、
//! 维护包装器到句柄编号的弱映射，并在包装器被回收时通过
//! `FinalizationRegistry` 通知宿主释放句柄。陷阱本身只做转发，
//! 语义全部由 Rust 钩子实现。

use rquickjs::{Ctx, Function, Object, Result, Value};

const SOURCE: &str = r#"
(function (hooks) {
  'use strict';

  const MISSING = Object.freeze(Object.create(null));
  const weak = typeof WeakRef === 'function' && typeof FinalizationRegistry === 'function';

  const ids = new WeakMap();
  const classIds = new WeakMap();
  const guestKeys = new WeakMap();
  const wrappers = new Map();
  const registry = weak
    ? new FinalizationRegistry((id) => {
        const ref = wrappers.get(id);
        if (ref !== undefined && ref.deref() === undefined) {
          wrappers.delete(id);
        }
        hooks.release(id);
      })
    : null;
  let globalId = undefined;
  let globalWrapper = undefined;

  const traps = {
    get(target, key, receiver) {
      if (typeof key === 'symbol') return Reflect.get(target, key, receiver);
      const value = hooks.get(this.id, key);
      return value === MISSING ? Reflect.get(target, key, receiver) : value;
    },
    set(target, key, value, receiver) {
      if (typeof key === 'symbol') return Reflect.set(target, key, value, receiver);
      return hooks.set(this.id, key, value) || Reflect.set(target, key, value, receiver);
    },
    has(target, key) {
      if (typeof key === 'symbol') return Reflect.has(target, key);
      return hooks.has(this.id, key) || Reflect.has(target, key);
    },
    deleteProperty(target, key) {
      if (typeof key === 'symbol') return Reflect.deleteProperty(target, key);
      return hooks.remove(this.id, key) || Reflect.deleteProperty(target, key);
    },
    getOwnPropertyDescriptor(target, key) {
      if (typeof key === 'symbol') return Reflect.getOwnPropertyDescriptor(target, key);
      const desc = hooks.query(this.id, key);
      return desc === MISSING ? Reflect.getOwnPropertyDescriptor(target, key) : desc;
    },
    ownKeys(target) {
      const keys = hooks.keys(this.id);
      const seen = new Set(keys);
      for (const key of Reflect.ownKeys(target)) {
        if (!seen.has(key)) {
          seen.add(key);
          keys.push(key);
        }
      }
      return keys;
    },
  };

  function define(target, name, value) {
    Object.defineProperty(target, name, {
      value,
      writable: true,
      enumerable: false,
      configurable: true,
    });
  }

  return {
    MISSING,

    wrap(id, proto) {
      const handler = Object.create(traps);
      handler.id = id;
      const wrapper = new Proxy(Object.create(proto), handler);
      ids.set(wrapper, id);
      if (weak) {
        wrappers.set(id, new WeakRef(wrapper));
        registry.register(wrapper, id);
      } else {
        wrappers.set(id, { deref: () => wrapper });
      }
      return wrapper;
    },

    lookup(id) {
      const ref = wrappers.get(id);
      return ref === undefined ? undefined : ref.deref();
    },

    handleOf(value) {
      return value === globalThis ? globalId : ids.get(value);
    },

    classOf(value) {
      return classIds.get(value);
    },

    classify(value) {
      if (ids.has(value) || (value === globalThis && globalId !== undefined)) return 'host';
      if (classIds.has(value)) return 'class';
      if (Array.isArray(value)) return 'array';
      if (typeof value === 'function') return 'function';
      const proto = Object.getPrototypeOf(value);
      return proto === Object.prototype || proto === null ? 'plain' : 'object';
    },

    makePrototype(parent) {
      return Object.create(parent === undefined ? Object.prototype : parent);
    },

    makeClass(name, construct, proto, parent, classId) {
      const ctor = function (...args) {
        return construct(...args);
      };
      Object.defineProperty(ctor, 'name', { value: name, configurable: true });
      Object.defineProperty(ctor, 'prototype', { value: proto, writable: false });
      define(proto, 'constructor', ctor);
      Object.defineProperty(proto, Symbol.toStringTag, { value: name, configurable: true });
      if (parent !== undefined) Object.setPrototypeOf(ctor, parent);
      classIds.set(ctor, classId);
      return ctor;
    },

    define,

    bindGlobal(wrapper, id, proto, properties) {
      globalId = id;
      globalWrapper = wrapper;
      if (proto === undefined) {
        Object.setPrototypeOf(globalThis, wrapper);
        return;
      }
      Object.setPrototypeOf(globalThis, proto);
      for (const key of Object.keys(properties)) {
        Object.defineProperty(globalThis, key, {
          get() {
            const value = hooks.get(id, key);
            return value === MISSING ? undefined : value;
          },
          set(value) {
            hooks.set(id, key, value);
          },
          enumerable: properties[key],
          configurable: true,
        });
      }
    },

    apply(fn, thisArg, args) {
      return Reflect.apply(fn, thisArg, args);
    },

    construct(ctor, args) {
      return Reflect.construct(ctor, args);
    },

    guestKey(value) {
      return guestKeys.get(value);
    },

    remember(value, key) {
      if ((typeof value === 'object' && value !== null) || typeof value === 'function') {
        guestKeys.set(value, key);
      }
    },
  };
})
"#;

/// 工厂返回的 API 对象
pub(crate) struct Shim<'js> {
    api: Object<'js>,
}

impl<'js> Shim<'js> {
    /// 求值工厂并以钩子对象调用，返回 API 对象
    pub fn install(ctx: &Ctx<'js>, hooks: Object<'js>) -> Result<Object<'js>> {
        let factory: Function = ctx.eval(SOURCE)?;
        factory.call((hooks,))
    }

    pub fn new(api: Object<'js>) -> Self {
        Self { api }
    }

    fn ctx(&self) -> &Ctx<'js> {
        self.api.ctx()
    }

    fn function(&self, name: &str) -> Result<Function<'js>> {
        self.api.get(name)
    }

    fn undefined(&self) -> Value<'js> {
        Value::new_undefined(self.ctx().clone())
    }

    /// 钩子返回它表示“交给引擎默认处理”
    pub fn missing(&self) -> Result<Value<'js>> {
        self.api.get("MISSING")
    }

    pub fn wrap(&self, id: u32, proto: &Object<'js>) -> Result<Object<'js>> {
        self.function("wrap")?.call((id, proto.clone()))
    }

    /// 仍然存活的包装器
    pub fn lookup(&self, id: u32) -> Result<Option<Object<'js>>> {
        self.function("lookup")?.call((id,))
    }

    pub fn handle_of(&self, value: &Value<'js>) -> Result<Option<u32>> {
        self.function("handleOf")?.call((value.clone(),))
    }

    pub fn class_of(&self, value: &Value<'js>) -> Result<Option<u32>> {
        self.function("classOf")?.call((value.clone(),))
    }

    pub fn classify(&self, value: &Value<'js>) -> Result<String> {
        self.function("classify")?.call((value.clone(),))
    }

    pub fn make_prototype(&self, parent: Option<&Object<'js>>) -> Result<Object<'js>> {
        let parent = parent.map_or_else(|| self.undefined(), |p| p.clone().into_value());
        self.function("makePrototype")?.call((parent,))
    }

    pub fn make_class(
        &self,
        name: &str,
        construct: Function<'js>,
        proto: &Object<'js>,
        parent: Option<&Function<'js>>,
        class_id: u32,
    ) -> Result<Function<'js>> {
        let parent = parent.map_or_else(|| self.undefined(), |p| p.clone().into_value());
        self.function("makeClass")?
            .call((name, construct, proto.clone(), parent, class_id))
    }

    /// 定义不可枚举的数据属性
    pub fn define(&self, target: Value<'js>, name: &str, value: Value<'js>) -> Result<()> {
        self.function("define")?.call((target, name, value))
    }

    /// 绑定全局宿主对象
    ///
    /// 给出 `members` 时，类原型成为 `globalThis` 的原型，声明的属性以
    /// 访问器定义在 `globalThis` 上，未知名字仍按引擎默认抛出
    /// `ReferenceError`。否则包装器本身成为 `globalThis` 的原型，容器键
    /// 经由陷阱解析。`members` 为原型和“属性名 → 是否可枚举”对象。
    pub fn bind_global(
        &self,
        wrapper: Object<'js>,
        id: u32,
        members: Option<(&Object<'js>, Object<'js>)>,
    ) -> Result<()> {
        let bind = self.function("bindGlobal")?;
        match members {
            Some((proto, properties)) => bind.call((wrapper, id, proto.clone(), properties)),
            None => bind.call((wrapper, id)),
        }
    }

    pub fn apply(
        &self,
        function: Value<'js>,
        this: Value<'js>,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>> {
        self.function("apply")?.call((function, this, args))
    }

    pub fn construct(&self, constructor: Value<'js>, args: Vec<Value<'js>>) -> Result<Value<'js>> {
        self.function("construct")?.call((constructor, args))
    }

    pub fn guest_key(&self, value: &Value<'js>) -> Result<Option<u32>> {
        self.function("guestKey")?.call((value.clone(),))
    }

    pub fn remember(&self, value: &Value<'js>, key: u32) -> Result<()> {
        self.function("remember")?.call((value.clone(), key))
    }
}

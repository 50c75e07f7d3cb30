//! 值转换
//!
//! 宿主值与脚本值之间的双向转换：
//!
//! - 基本类型按值复制；能放进 i32 的整数以引擎整数表示，其余为浮点
//! - `List` ↔ 数组，`Dict` ↔ 普通对象，嵌套深度受 `marshal.max_depth` 限制
//! - 宿主对象通过标识映射得到唯一的包装器，反向转换得到同一个宿主对象
//! - 宿主类 ↔ 投影后的构造函数
//! - 其他脚本对象 ↔ `GuestObject`

use indexmap::IndexMap;
use rquickjs::convert::Coerced;
use rquickjs::{Array, Ctx, Exception, FromJs, IntoJs, Object, Result, Value};
use std::rc::Rc;

use super::method;
use super::projector;
use super::state::BridgeState;
use crate::host::{ClassId, HostObject, HostValue};

/// 宿主值 → 脚本值
pub(crate) fn to_guest<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    value: &HostValue,
) -> Result<Value<'js>> {
    to_guest_at(ctx, state, value, 0)
}

/// 脚本值 → 宿主值
pub(crate) fn to_host<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    value: Value<'js>,
) -> Result<HostValue> {
    to_host_at(ctx, state, value, 0)
}

pub(crate) fn args_to_host<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    args: Vec<Value<'js>>,
) -> Result<Vec<HostValue>> {
    args.into_iter()
        .map(|arg| to_host(ctx, state, arg))
        .collect()
}

pub(crate) fn args_to_guest<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    args: &[HostValue],
) -> Result<Vec<Value<'js>>> {
    args.iter().map(|arg| to_guest(ctx, state, arg)).collect()
}

/// 包装器（或绑定了全局对象时的 `globalThis`）对应的宿主对象
pub(crate) fn host_object_of<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    value: &Value<'js>,
) -> Result<Option<HostObject>> {
    if !value.is_object() {
        return Ok(None);
    }
    let id = state.shim(ctx)?.handle_of(value)?;
    Ok(id.and_then(|id| state.object(id)))
}

/// 返回宿主对象的包装器，必要时创建句柄
///
/// 绑定为全局的宿主对象在脚本中就是 `globalThis`。
pub(crate) fn wrap_object<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    object: &HostObject,
) -> Result<Object<'js>> {
    if state.global().is_some_and(|global| global.ptr_eq(object)) {
        return Ok(ctx.globals());
    }
    let shim = state.shim(ctx)?;
    if let Some(id) = state.handle_for(object) {
        if let Some(wrapper) = shim.lookup(id)? {
            return Ok(wrapper);
        }
    }

    let projected = projector::install(ctx, state, object.class())?;
    let id = state.insert_handle(object);
    match shim.wrap(id, &projected.prototype) {
        Ok(wrapper) => {
            tracing::trace!(target: "bridge", id, class = object.class().name(), "Host object wrapped");
            Ok(wrapper)
        }
        Err(err) => {
            state.release(id);
            Err(err)
        }
    }
}

fn check_depth(ctx: &Ctx<'_>, state: &BridgeState, depth: usize) -> Result<()> {
    if depth >= state.max_depth() {
        return Err(Exception::throw_type(
            ctx,
            &format!(
                "value is nested more than {} levels deep",
                state.max_depth()
            ),
        ));
    }
    Ok(())
}

fn to_guest_at<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    value: &HostValue,
    depth: usize,
) -> Result<Value<'js>> {
    match value {
        HostValue::Undefined => Ok(Value::new_undefined(ctx.clone())),
        HostValue::Null => Ok(Value::new_null(ctx.clone())),
        HostValue::Bool(value) => Ok(Value::new_bool(ctx.clone(), *value)),
        HostValue::Int(value) => Ok(match i32::try_from(*value) {
            Ok(small) => Value::new_int(ctx.clone(), small),
            Err(_) => Value::new_float(ctx.clone(), *value as f64),
        }),
        HostValue::Float(value) => Ok(Value::new_float(ctx.clone(), *value)),
        HostValue::String(value) => value.as_str().into_js(ctx),
        HostValue::List(items) => {
            check_depth(ctx, state, depth)?;
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, to_guest_at(ctx, state, item, depth + 1)?)?;
            }
            Ok(array.into_value())
        }
        HostValue::Dict(entries) => {
            check_depth(ctx, state, depth)?;
            let object = Object::new(ctx.clone())?;
            for (key, item) in entries {
                object.set(key.as_str(), to_guest_at(ctx, state, item, depth + 1)?)?;
            }
            Ok(object.into_value())
        }
        HostValue::Object(object) => wrap_object(ctx, state, object).map(Object::into_value),
        HostValue::Class(class) => {
            projector::install(ctx, state, class).map(|projected| projected.constructor.into_value())
        }
        HostValue::Function(function) => {
            method::bind_function(ctx, state, function).map(|function| function.into_value())
        }
        HostValue::Guest(guest) => {
            if !guest.belongs_to(state) {
                return Err(Exception::throw_type(
                    ctx,
                    "object belongs to a different script context",
                ));
            }
            match state.guest_value(ctx, guest.key())? {
                Some(value) => Ok(value),
                None => Err(Exception::throw_type(ctx, "script object has been released")),
            }
        }
    }
}

fn to_host_at<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    value: Value<'js>,
    depth: usize,
) -> Result<HostValue> {
    if value.is_undefined() {
        return Ok(HostValue::Undefined);
    }
    if value.is_null() {
        return Ok(HostValue::Null);
    }
    if let Some(value) = value.as_bool() {
        return Ok(HostValue::Bool(value));
    }
    if let Some(value) = value.as_int() {
        return Ok(HostValue::Int(value.into()));
    }
    if let Some(value) = value.as_float() {
        return Ok(HostValue::Float(value));
    }
    if let Some(string) = value.as_string() {
        return Ok(HostValue::String(string.to_string()?));
    }
    if let Some(symbol) = value.as_symbol() {
        let description = symbol.description()?;
        if description.is_undefined() {
            return Ok(HostValue::String(String::new()));
        }
        return Ok(HostValue::String(Coerced::<String>::from_js(ctx, description)?.0));
    }
    if !value.is_object() {
        return Ok(HostValue::String(Coerced::<String>::from_js(ctx, value)?.0));
    }

    let shim = state.shim(ctx)?;
    match shim.classify(&value)?.as_str() {
        "host" => {
            if let Some(object) = host_object_of(ctx, state, &value)? {
                return Ok(HostValue::Object(object));
            }
        }
        "class" => {
            let class = shim
                .class_of(&value)?
                .and_then(|raw| state.class(ClassId::from_raw(raw)));
            if let Some(class) = class {
                return Ok(HostValue::Class(class));
            }
        }
        "array" => {
            check_depth(ctx, state, depth)?;
            if let Some(array) = value.as_array() {
                let mut items = Vec::with_capacity(array.len());
                for item in array.iter::<Value>() {
                    items.push(to_host_at(ctx, state, item?, depth + 1)?);
                }
                return Ok(HostValue::List(items));
            }
        }
        "plain" => {
            check_depth(ctx, state, depth)?;
            if let Some(object) = value.as_object() {
                let mut entries = IndexMap::new();
                for key in object.keys::<String>() {
                    let key = key?;
                    let item: Value = object.get(key.as_str())?;
                    entries.insert(key, to_host_at(ctx, state, item, depth + 1)?);
                }
                return Ok(HostValue::Dict(entries));
            }
        }
        _ => {}
    }
    guest_of(ctx, state, &value)
}

fn guest_of<'js>(ctx: &Ctx<'js>, state: &Rc<BridgeState>, value: &Value<'js>) -> Result<HostValue> {
    let shim = state.shim(ctx)?;
    if let Some(guest) = shim.guest_key(value)?.and_then(|key| state.guest(key)) {
        return Ok(HostValue::Guest(guest));
    }
    let guest = state.insert_guest(ctx, value.clone());
    shim.remember(value, guest.key())?;
    Ok(HostValue::Guest(guest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarshalConfig;
    use crate::bindings::traps;
    use rquickjs::{Context, Runtime};

    fn with_state<F>(max_depth: usize, f: F)
    where
        F: for<'js> FnOnce(Ctx<'js>, Rc<BridgeState>),
    {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let state = BridgeState::new(MarshalConfig { max_depth });
        context.with(|ctx| {
            traps::install(&ctx, &state).unwrap();
            f(ctx, state.clone());
        });
        state.clear();
    }

    #[test]
    fn test_primitives_round_trip() {
        with_state(64, |ctx, state| {
            for value in [
                HostValue::Undefined,
                HostValue::Null,
                HostValue::Bool(true),
                HostValue::Int(-7),
                HostValue::Float(0.5),
                HostValue::from("text"),
            ] {
                let guest = to_guest(&ctx, &state, &value).unwrap();
                assert_eq!(to_host(&ctx, &state, guest).unwrap(), value);
            }
        });
    }

    #[test]
    fn test_large_integers_become_floats() {
        with_state(64, |ctx, state| {
            let big = i64::from(i32::MAX) + 1;
            let guest = to_guest(&ctx, &state, &HostValue::Int(big)).unwrap();
            assert!(guest.as_int().is_none());
            assert_eq!(guest.as_float(), Some(big as f64));
        });
    }

    #[test]
    fn test_guest_containers() {
        with_state(64, |ctx, state| {
            let value: Value = ctx.eval("({ a: [1, 'two', null], b: { c: true } })").unwrap();
            let host = to_host(&ctx, &state, value).unwrap();
            let a = host.get("a").and_then(HostValue::as_list).unwrap();
            assert_eq!(a, &[HostValue::Int(1), HostValue::from("two"), HostValue::Null]);
            assert_eq!(
                host.get("b").and_then(|b| b.get("c")),
                Some(&HostValue::Bool(true))
            );
        });
    }

    #[test]
    fn test_cyclic_structure_hits_depth_limit() {
        with_state(8, |ctx, state| {
            let value: Value = ctx.eval("const a = []; a.push(a); a").unwrap();
            assert!(to_host(&ctx, &state, value).is_err());
        });
    }

    #[test]
    fn test_guest_function_identity() {
        with_state(64, |ctx, state| {
            let value: Value = ctx.eval("(function answer() { return 42; })").unwrap();
            let first = to_host(&ctx, &state, value.clone()).unwrap();
            let second = to_host(&ctx, &state, value.clone()).unwrap();
            assert_eq!(first, second);

            let back = to_guest(&ctx, &state, &first).unwrap();
            assert_eq!(back, value);
            assert_eq!(state.live_guests(), 1);

            drop(first);
            drop(second);
            assert_eq!(state.live_guests(), 0);
        });
    }

    #[test]
    fn test_symbols_become_descriptions() {
        with_state(64, |ctx, state| {
            let value: Value = ctx.eval("Symbol('tag')").unwrap();
            assert_eq!(to_host(&ctx, &state, value).unwrap(), HostValue::from("tag"));
        });
    }
}

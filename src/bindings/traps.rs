//! 陷阱钩子
//!
//! 包装器的 `Proxy` 陷阱调用这里的钩子。规范数组下标在类声明了序列
//! 协议时交给下标拦截，其余键交给命名拦截。钩子返回 `MISSING`
//! 或 `false` 时，陷阱转交引擎默认行为。

use rquickjs::{Ctx, Function, Object, Persistent, Result, Value};
use std::rc::{Rc, Weak};

use super::indexed;
use super::interceptor::{self, PropertyDescriptor};
use super::marshal;
use super::method::{self, upgrade};
use super::projector::{project, ClassTemplate};
use super::shim::Shim;
use super::state::BridgeState;
use crate::core::error::HostResult;
use crate::host::{HostObject, SequenceProtocol};

enum Route<'t> {
    Index(&'t SequenceProtocol, u32),
    Named,
}

fn route<'t>(template: &'t ClassTemplate, key: &str) -> Route<'t> {
    match (template.sequence(), indexed::parse_index(key)) {
        (Some(sequence), Some(index)) => Route::Index(sequence, index),
        _ => Route::Named,
    }
}

/// 句柄对应的宿主对象；句柄已释放时为 `None`
fn target(state: &BridgeState, id: u32) -> Option<(HostObject, Rc<ClassTemplate>)> {
    state.object(id).map(|object| {
        let template = project(object.class());
        (object, template)
    })
}

fn settle<T>(ctx: &Ctx<'_>, state: &BridgeState, result: HostResult<T>) -> Result<T> {
    result.map_err(|error| method::throw(ctx, state, error))
}

fn get<'js>(ctx: &Ctx<'js>, weak: &Weak<BridgeState>, id: u32, key: &str) -> Result<Value<'js>> {
    let state = upgrade(ctx, weak)?;
    let shim = state.shim(ctx)?;
    let Some((object, template)) = target(&state, id) else {
        return shim.missing();
    };
    let found = match route(&template, key) {
        Route::Index(sequence, index) => indexed::get(sequence, &object, index),
        Route::Named => interceptor::get(&template, &object, key),
    };
    match settle(ctx, &state, found)? {
        Some(value) => marshal::to_guest(ctx, &state, &value),
        None => shim.missing(),
    }
}

fn set<'js>(
    ctx: &Ctx<'js>,
    weak: &Weak<BridgeState>,
    id: u32,
    key: &str,
    value: Value<'js>,
) -> Result<bool> {
    let state = upgrade(ctx, weak)?;
    let Some((object, template)) = target(&state, id) else {
        return Ok(false);
    };
    match route(&template, key) {
        Route::Index(sequence, index) => {
            let value = marshal::to_host(ctx, &state, value)?;
            settle(ctx, &state, indexed::set(sequence, &object, index, value))?;
            Ok(true)
        }
        Route::Named => {
            // 普通属性不转换值，直接交给引擎
            if !settle(ctx, &state, interceptor::has(&template, &object, key))? {
                return Ok(false);
            }
            let value = marshal::to_host(ctx, &state, value)?;
            settle(ctx, &state, interceptor::set(&template, &object, key, value))
        }
    }
}

fn has(ctx: &Ctx<'_>, weak: &Weak<BridgeState>, id: u32, key: &str) -> Result<bool> {
    let state = upgrade(ctx, weak)?;
    let Some((object, template)) = target(&state, id) else {
        return Ok(false);
    };
    let found = match route(&template, key) {
        Route::Index(sequence, index) => indexed::has(sequence, &object, index),
        Route::Named => interceptor::has(&template, &object, key),
    };
    settle(ctx, &state, found)
}

fn remove(ctx: &Ctx<'_>, weak: &Weak<BridgeState>, id: u32, key: &str) -> Result<bool> {
    let state = upgrade(ctx, weak)?;
    let Some((object, template)) = target(&state, id) else {
        return Ok(false);
    };
    match route(&template, key) {
        Route::Index(sequence, index) => {
            settle(ctx, &state, indexed::delete(sequence, &object, index))?;
            Ok(true)
        }
        Route::Named => settle(ctx, &state, interceptor::delete(&template, &object, key)),
    }
}

fn query<'js>(ctx: &Ctx<'js>, weak: &Weak<BridgeState>, id: u32, key: &str) -> Result<Value<'js>> {
    let state = upgrade(ctx, weak)?;
    let shim = state.shim(ctx)?;
    let Some((object, template)) = target(&state, id) else {
        return shim.missing();
    };
    let found = match route(&template, key) {
        Route::Index(sequence, index) => indexed::query(sequence, &object, index),
        Route::Named => interceptor::query(&template, &object, key),
    };
    match settle(ctx, &state, found)? {
        Some(descriptor) => descriptor_to_guest(ctx, &state, descriptor),
        None => shim.missing(),
    }
}

fn descriptor_to_guest<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    descriptor: PropertyDescriptor,
) -> Result<Value<'js>> {
    let object = Object::new(ctx.clone())?;
    object.set("value", marshal::to_guest(ctx, state, &descriptor.value)?)?;
    object.set("writable", descriptor.writable)?;
    object.set("enumerable", descriptor.enumerable)?;
    object.set("configurable", descriptor.configurable)?;
    Ok(object.into_value())
}

fn keys(ctx: &Ctx<'_>, weak: &Weak<BridgeState>, id: u32) -> Result<Vec<String>> {
    let state = upgrade(ctx, weak)?;
    let Some((object, template)) = target(&state, id) else {
        return Ok(Vec::new());
    };
    let mut keys = match template.sequence() {
        Some(sequence) => settle(ctx, &state, indexed::enumerate(sequence, &object))?,
        None => Vec::new(),
    };
    for key in settle(ctx, &state, interceptor::enumerate(&template, &object))? {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// 创建钩子对象、求值脚本侧工厂，并把 API 对象保存到状态中
pub(crate) fn install<'js>(ctx: &Ctx<'js>, state: &Rc<BridgeState>) -> Result<()> {
    let hooks = Object::new(ctx.clone())?;
    let weak = Rc::downgrade(state);

    let w = weak.clone();
    hooks.set(
        "get",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, key: String| {
            get(&ctx, &w, id, &key)
        })?,
    )?;
    let w = weak.clone();
    hooks.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, key: String, value: Value<'js>| {
                set(&ctx, &w, id, &key, value)
            },
        )?,
    )?;
    let w = weak.clone();
    hooks.set(
        "has",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, key: String| {
            has(&ctx, &w, id, &key)
        })?,
    )?;
    let w = weak.clone();
    hooks.set(
        "remove",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, key: String| {
            remove(&ctx, &w, id, &key)
        })?,
    )?;
    let w = weak.clone();
    hooks.set(
        "query",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, key: String| {
            query(&ctx, &w, id, &key)
        })?,
    )?;
    let w = weak.clone();
    hooks.set(
        "keys",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| keys(&ctx, &w, id))?,
    )?;
    let w = weak;
    hooks.set(
        "release",
        Function::new(ctx.clone(), move |id: u32| {
            if let Some(state) = w.upgrade() {
                state.release(id);
            }
        })?,
    )?;

    let api = Shim::install(ctx, hooks)?;
    state.set_shim(Persistent::save(ctx, api));
    tracing::trace!(target: "bridge", "Bridge hooks installed");
    Ok(())
}

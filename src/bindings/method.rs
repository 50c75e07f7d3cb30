//! 方法绑定
//!
//! 把宿主可调用对象包装成脚本函数。参数和返回值经过值转换；
//! 实例方法在调用宿主代码之前检查接收者，宿主错误以脚本异常抛出
//! （接收者和类型错误为 `TypeError`，其余为 `Error`）。

use rquickjs::context::EvalOptions;
use rquickjs::convert::Coerced;
use rquickjs::function::{Rest, This};
use rquickjs::{CaughtError, CatchResultExt, Ctx, Exception, FromJs, Function, Result, Value};
use std::rc::{Rc, Weak};

use super::marshal;
use super::projector::{MethodSlot, StaticSlot};
use super::state::BridgeState;
use crate::core::error::{GuestScriptException, HostError, HostResult};
use crate::host::{Call, ClassId, GuestScope, HostClass, HostFunction, HostObject, HostValue};

/// 引擎内的调用作用域，宿主代码通过它同步回调脚本
pub(crate) struct EngineScope<'js> {
    ctx: Ctx<'js>,
    state: Rc<BridgeState>,
}

impl<'js> EngineScope<'js> {
    pub fn new(ctx: Ctx<'js>, state: Rc<BridgeState>) -> Self {
        Self { ctx, state }
    }

    fn guarded<T>(&self, f: impl FnOnce() -> Result<T>) -> HostResult<T> {
        f().catch(&self.ctx)
            .map_err(|caught| host_error_of(&self.ctx, &self.state, caught))
    }
}

impl GuestScope for EngineScope<'_> {
    fn invoke(&self, callee: &HostValue, args: &[HostValue]) -> HostResult<HostValue> {
        let (ctx, state) = (&self.ctx, &self.state);
        self.guarded(|| {
            let function = marshal::to_guest(ctx, state, callee)?;
            let args = marshal::args_to_guest(ctx, state, args)?;
            let this = Value::new_undefined(ctx.clone());
            let result = state.shim(ctx)?.apply(function, this, args)?;
            marshal::to_host(ctx, state, result)
        })
    }

    fn construct(&self, constructor: &HostValue, args: &[HostValue]) -> HostResult<HostValue> {
        let (ctx, state) = (&self.ctx, &self.state);
        self.guarded(|| {
            let constructor = marshal::to_guest(ctx, state, constructor)?;
            let args = marshal::args_to_guest(ctx, state, args)?;
            let result = state.shim(ctx)?.construct(constructor, args)?;
            marshal::to_host(ctx, state, result)
        })
    }

    fn eval(&self, source: &str) -> HostResult<HostValue> {
        let (ctx, state) = (&self.ctx, &self.state);
        self.guarded(|| {
            let mut options = EvalOptions::default();
            options.strict = false;
            let value = ctx.eval_with_options::<Value, _>(source, options)?;
            marshal::to_host(ctx, state, value)
        })
    }

    fn get(&self, name: &str) -> HostResult<HostValue> {
        let (ctx, state) = (&self.ctx, &self.state);
        self.guarded(|| {
            let value = ctx.globals().get::<_, Value>(name)?;
            marshal::to_host(ctx, state, value)
        })
    }

    fn set(&self, name: &str, value: HostValue) -> HostResult<()> {
        let (ctx, state) = (&self.ctx, &self.state);
        self.guarded(|| ctx.globals().set(name, marshal::to_guest(ctx, state, &value)?))
    }

    fn global_object(&self) -> Option<HostObject> {
        self.state.global()
    }
}

/// 把捕获的脚本异常转换成宿主侧表示
pub(crate) fn exception_of<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>) -> GuestScriptException {
    match caught {
        CaughtError::Exception(exception) => {
            let name = exception
                .as_object()
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            GuestScriptException::new(name, exception.message().unwrap_or_default())
                .with_stack(exception.stack().filter(|stack| !stack.is_empty()))
        }
        CaughtError::Value(value) => {
            let message = Coerced::<String>::from_js(ctx, value)
                .map(|coerced| coerced.0)
                .unwrap_or_default();
            GuestScriptException::new("Error", message)
        }
        CaughtError::Error(error) => GuestScriptException::new("InternalError", error.to_string()),
    }
}

/// 回调中捕获的异常：保存原始抛出值，期限到达时标记为中断
fn host_error_of<'js>(ctx: &Ctx<'js>, state: &BridgeState, caught: CaughtError<'js>) -> HostError {
    let thrown = match &caught {
        CaughtError::Exception(exception) => Some(exception.as_object().clone().into_value()),
        CaughtError::Value(value) => Some(value.clone()),
        CaughtError::Error(_) => None,
    };
    let mut exception = exception_of(ctx, caught);
    exception.thrown = thrown.map(|value| state.save_thrown(ctx, value));
    if state.interrupt().tripped() {
        HostError::Terminated(exception)
    } else {
        HostError::Guest(exception)
    }
}

/// 把宿主错误抛进脚本
pub(crate) fn throw(ctx: &Ctx<'_>, state: &BridgeState, error: HostError) -> rquickjs::Error {
    tracing::debug!(target: "bridge", %error, "Raising host error in script");
    match error {
        HostError::Guest(exception) | HostError::Terminated(exception) => {
            rethrow(ctx, state, &exception)
        }
        error if error.is_type_error() => Exception::throw_type(ctx, &error.to_string()),
        error => Exception::throw_message(ctx, &error.to_string()),
    }
}

/// 优先抛出原始值，保留它的标识、类型和中断标记
fn rethrow(ctx: &Ctx<'_>, state: &BridgeState, exception: &GuestScriptException) -> rquickjs::Error {
    if let Some(key) = exception.thrown {
        match state.take_thrown(ctx, key) {
            Ok(Some(value)) => return ctx.throw(value),
            Ok(None) => {}
            Err(err) => return err,
        }
    }
    let error = match Exception::from_message(ctx.clone(), &exception.message) {
        Ok(error) => error,
        Err(err) => return err,
    };
    if let Err(err) = error.as_object().set("name", exception.name.as_str()) {
        return err;
    }
    ctx.throw(error.into_object().into_value())
}

pub(crate) fn upgrade(ctx: &Ctx<'_>, state: &Weak<BridgeState>) -> Result<Rc<BridgeState>> {
    state
        .upgrade()
        .ok_or_else(|| Exception::throw_message(ctx, "script context has been torn down"))
}

fn finish<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    result: HostResult<HostValue>,
) -> Result<Value<'js>> {
    match result {
        Ok(value) => marshal::to_guest(ctx, state, &value),
        Err(error) => Err(throw(ctx, state, error)),
    }
}

/// 解析实例方法的接收者
///
/// `undefined`/`null`/`globalThis` 解析为绑定的全局宿主对象。
fn receiver<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    this: &Value<'js>,
) -> Result<Option<HostObject>> {
    if this.is_undefined() || this.is_null() {
        return Ok(state.global());
    }
    marshal::host_object_of(ctx, state, this)
}

pub(crate) fn bind_instance<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    class_name: &str,
    slot: &MethodSlot,
    owner: ClassId,
) -> Result<Function<'js>> {
    let weak = Rc::downgrade(state);
    let callable = slot.callable.clone();
    let expected = class_name.to_string();
    let method = slot.name.clone();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> Result<Value<'js>> {
            let state = upgrade(&ctx, &weak)?;
            let object = match receiver(&ctx, &state, &this.0)? {
                Some(object) if object.class().is_subclass_of(owner) => object,
                _ => {
                    return Err(throw(
                        &ctx,
                        &state,
                        HostError::InvalidReceiver {
                            expected: expected.clone(),
                            method: method.clone(),
                        },
                    ))
                }
            };
            let args = marshal::args_to_host(&ctx, &state, args.0)?;
            let scope = EngineScope::new(ctx.clone(), state.clone());
            let call = Call::new(&args, &scope).with_this(&object);
            let result = callable(&object, &call);
            finish(&ctx, &state, result)
        },
    )?
    .with_name(&slot.name)
}

pub(crate) fn bind_static<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    class: &HostClass,
    slot: &StaticSlot,
) -> Result<Function<'js>> {
    let weak = Rc::downgrade(state);
    let function = match slot {
        StaticSlot::Static { callable, .. } => {
            let callable = callable.clone();
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> Result<Value<'js>> {
                    let state = upgrade(&ctx, &weak)?;
                    let args = marshal::args_to_host(&ctx, &state, args.0)?;
                    let scope = EngineScope::new(ctx.clone(), state.clone());
                    let result = callable(&Call::new(&args, &scope));
                    finish(&ctx, &state, result)
                },
            )?
        }
        StaticSlot::Class { callable, .. } => {
            let callable = callable.clone();
            let owner = class.clone();
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> Result<Value<'js>> {
                    let state = upgrade(&ctx, &weak)?;
                    // 通过子类构造函数调用时接收者为子类
                    let class = match marshal::to_host(&ctx, &state, this.0)? {
                        HostValue::Class(class) if class.is_subclass_of(owner.id()) => class,
                        _ => owner.clone(),
                    };
                    let args = marshal::args_to_host(&ctx, &state, args.0)?;
                    let scope = EngineScope::new(ctx.clone(), state.clone());
                    let result = callable(&class, &Call::new(&args, &scope));
                    finish(&ctx, &state, result)
                },
            )?
        }
    };
    function.with_name(slot.name())
}

/// 投影构造函数调用的宿主构造逻辑
pub(crate) fn bind_constructor<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    class: &HostClass,
) -> Result<Function<'js>> {
    let weak = Rc::downgrade(state);
    let class = class.clone();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> Result<Value<'js>> {
            let state = upgrade(&ctx, &weak)?;
            if !class.is_constructible() {
                return Err(throw(
                    &ctx,
                    &state,
                    HostError::NotConstructible(class.name().to_string()),
                ));
            }
            let args = marshal::args_to_host(&ctx, &state, args.0)?;
            let scope = EngineScope::new(ctx.clone(), state.clone());
            let result = class.construct(&Call::new(&args, &scope)).map(HostValue::Object);
            finish(&ctx, &state, result)
        },
    )
}

/// 独立的宿主函数
pub(crate) fn bind_function<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    function: &HostFunction,
) -> Result<Function<'js>> {
    let weak = Rc::downgrade(state);
    let callable = function.clone();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> Result<Value<'js>> {
            let state = upgrade(&ctx, &weak)?;
            let args = marshal::args_to_host(&ctx, &state, args.0)?;
            let scope = EngineScope::new(ctx.clone(), state.clone());
            let result = callable.call(&Call::new(&args, &scope));
            finish(&ctx, &state, result)
        },
    )?
    .with_name(function.name())
}

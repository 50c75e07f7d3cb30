//! 脚本上下文
//!
//! `Context` 拥有一个 QuickJS 运行时和其中的一个上下文，以及本上下文的
//! 桥接状态。可以把一个宿主对象绑定为全局对象：它的类原型成为
//! `globalThis` 的原型，声明的属性以访问器定义在 `globalThis` 上，因此
//! 未限定的名字和 `this.name` 解析到同一个成员，未知名字照常抛出
//! `ReferenceError`。
//!
//! 上下文是 `!Send` 的，所有跨边界调用都在创建它的线程上同步进行。
//! 宿主方法通过 `Call::context` 回调脚本；在宿主方法中不能再次调用同一个
//! `Context` 的方法。

use rquickjs::context::EvalOptions;
use rquickjs::{CatchResultExt, CaughtError, Ctx, Exception, Object, Runtime, Value};
use std::rc::Rc;

use super::console;
use super::interrupt::Interrupt;
use super::marshal;
use super::method::exception_of;
use super::projector;
use super::script::Script;
use super::state::BridgeState;
use super::traps;
use crate::config::BridgeConfig;
use crate::core::error::{BridgeError, BridgeResult, HostError};
use crate::host::{HostObject, HostValue};

/// 脚本上下文
pub struct Context {
    state: Rc<BridgeState>,
    interrupt: Rc<Interrupt>,
    config: BridgeConfig,
    context: rquickjs::Context,
    runtime: Runtime,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// 使用默认配置创建上下文
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;

        let runtime = Runtime::new().map_err(|e| BridgeError::Init(e.to_string()))?;
        if let Some(limit) = config.runtime.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = config.runtime.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = config.runtime.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let state = BridgeState::new(config.marshal.clone());
        let interrupt = Rc::clone(state.interrupt());
        let handler = Rc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || handler.should_interrupt())));

        let context =
            rquickjs::Context::full(&runtime).map_err(|e| BridgeError::Init(e.to_string()))?;

        context
            .with(|ctx| -> rquickjs::Result<()> {
                traps::install(&ctx, &state)?;
                if config.console {
                    console::install(&ctx)?;
                }
                Ok(())
            })
            .map_err(|e| BridgeError::Init(e.to_string()))?;

        tracing::debug!(
            target: "bridge",
            memory_limit = ?config.runtime.memory_limit,
            timeout_ms = ?config.runtime.timeout_ms,
            console = config.console,
            "Script context created"
        );

        Ok(Self {
            state,
            interrupt,
            config,
            context,
            runtime,
        })
    }

    /// 创建上下文并绑定全局宿主对象
    ///
    /// `global` 可以是宿主对象，也可以是宿主类（以无参方式实例化）。
    pub fn with_global(global: impl Into<HostValue>) -> BridgeResult<Self> {
        let context = Self::new()?;
        context.bind_global(global.into())?;
        Ok(context)
    }

    fn bind_global(&self, global: HostValue) -> BridgeResult<()> {
        let object = match global {
            HostValue::Object(object) => object,
            HostValue::Class(class) => class.instantiate(&[])?,
            other => {
                return Err(HostError::type_error(format!(
                    "global must be a host object or class, got {}",
                    other.type_name()
                ))
                .into())
            }
        };

        let template = projector::project(object.class());
        // 容器协议的键无法预先定义，只能经由陷阱解析
        let routed = template.mapping().is_some() || template.sequence().is_some();
        let state = &self.state;
        self.context.with(|ctx| {
            let bind = || -> rquickjs::Result<u32> {
                let shim = state.shim(&ctx)?;
                let wrapper = marshal::wrap_object(&ctx, state, &object)?;
                let id = state
                    .handle_for(&object)
                    .ok_or_else(|| Exception::throw_message(&ctx, "global wrapper has no handle"))?;
                if routed {
                    shim.bind_global(wrapper, id, None)?;
                } else {
                    let projected = projector::install(&ctx, state, object.class())?;
                    let properties = Object::new(ctx.clone())?;
                    for (name, slot) in template.properties() {
                        properties.set(name.as_str(), slot.enumerable)?;
                    }
                    shim.bind_global(wrapper, id, Some((&projected.prototype, properties)))?;
                }
                Ok(id)
            };
            let id = bind().catch(&ctx).map_err(|caught| script_error(&ctx, caught))?;
            tracing::debug!(
                target: "bridge",
                class = object.class().name(),
                id,
                routed,
                "Global object bound"
            );
            state.set_global(object.clone(), id);
            Ok(())
        })
    }

    /// 以非严格模式求值全局代码，返回转换后的结果
    pub fn eval(&self, source: &str) -> BridgeResult<HostValue> {
        let _deadline = self.interrupt.arm(self.config.runtime.timeout());
        let state = &self.state;
        let result = self.context.with(|ctx| {
            let mut options = EvalOptions::default();
            options.strict = false;
            ctx.eval_with_options::<Value, _>(source, options)
                .and_then(|value| marshal::to_host(&ctx, state, value))
                .catch(&ctx)
                .map_err(|caught| self.failure(&ctx, caught))
        });
        self.settle(result)
    }

    /// 运行可复用的脚本
    pub fn run(&self, script: &Script) -> BridgeResult<HostValue> {
        tracing::debug!(target: "bridge", script = script.name(), "Running script");
        self.eval(script.source())
    }

    /// 读取脚本全局变量
    pub fn get(&self, name: &str) -> BridgeResult<HostValue> {
        let state = &self.state;
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, Value>(name)
                .and_then(|value| marshal::to_host(&ctx, state, value))
                .catch(&ctx)
                .map_err(|caught| self.failure(&ctx, caught))
        })
    }

    /// 设置脚本全局变量；宿主类在此时投影
    pub fn set(&self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        let value = value.into();
        let state = &self.state;
        self.context.with(|ctx| {
            marshal::to_guest(&ctx, state, &value)
                .and_then(|value| ctx.globals().set(name, value))
                .catch(&ctx)
                .map_err(|caught| self.failure(&ctx, caught))
        })
    }

    /// 以 `undefined` 为接收者调用脚本函数
    pub fn call(&self, callee: &HostValue, args: &[HostValue]) -> BridgeResult<HostValue> {
        let _deadline = self.interrupt.arm(self.config.runtime.timeout());
        let state = &self.state;
        let result = self.context.with(|ctx| {
            let invoke = || {
                let shim = state.shim(&ctx)?;
                let function = marshal::to_guest(&ctx, state, callee)?;
                let args = marshal::args_to_guest(&ctx, state, args)?;
                let result = shim.apply(function, Value::new_undefined(ctx.clone()), args)?;
                marshal::to_host(&ctx, state, result)
            };
            invoke().catch(&ctx).map_err(|caught| self.failure(&ctx, caught))
        });
        self.settle(result)
    }

    /// 等价于脚本中的 `new ctor(...args)`
    pub fn construct(&self, constructor: &HostValue, args: &[HostValue]) -> BridgeResult<HostValue> {
        let _deadline = self.interrupt.arm(self.config.runtime.timeout());
        let state = &self.state;
        let result = self.context.with(|ctx| {
            let construct = || {
                let shim = state.shim(&ctx)?;
                let constructor = marshal::to_guest(&ctx, state, constructor)?;
                let args = marshal::args_to_guest(&ctx, state, args)?;
                let result = shim.construct(constructor, args)?;
                marshal::to_host(&ctx, state, result)
            };
            construct()
                .catch(&ctx)
                .map_err(|caught| self.failure(&ctx, caught))
        });
        self.settle(result)
    }

    /// 绑定的全局宿主对象
    pub fn global_object(&self) -> Option<HostObject> {
        self.state.global()
    }

    /// 运行垃圾回收和待处理任务
    ///
    /// 被回收的包装器在这之后释放各自的句柄。
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
        self.run_pending_jobs();
        tracing::trace!(target: "bridge", live = self.state.live_handles(), "Garbage collected");
    }

    /// 当前存活的宿主对象句柄数
    pub fn live_handles(&self) -> usize {
        self.state.live_handles()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn failure<'js>(&self, ctx: &Ctx<'js>, caught: CaughtError<'js>) -> BridgeError {
        if self.interrupt.tripped() {
            return self.terminated();
        }
        script_error(ctx, caught)
    }

    fn terminated(&self) -> BridgeError {
        let ms = self.config.runtime.timeout_ms.unwrap_or_default();
        tracing::warn!(target: "bridge", timeout_ms = ms, "Script interrupted");
        BridgeError::Terminated(ms)
    }

    /// 顶层调用的收尾，在期限守卫释放之前调用
    ///
    /// 中断过的求值即使被宿主代码吞掉后正常返回，也报告为终止。
    fn settle(&self, result: BridgeResult<HostValue>) -> BridgeResult<HostValue> {
        self.run_pending_jobs();
        self.state.clear_thrown();
        match result {
            Ok(_) if self.interrupt.tripped() => Err(self.terminated()),
            result => result,
        }
    }

    fn run_pending_jobs(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(job) => job.0.with(|ctx| {
                    let caught = CaughtError::from_error(&ctx, rquickjs::Error::Exception);
                    let exception = exception_of(&ctx, caught);
                    tracing::warn!(target: "bridge", %exception, "Pending job raised an exception");
                }),
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // 持久引用必须在运行时释放之前清空
        self.state.clear();
        tracing::debug!(target: "bridge", "Script context dropped");
    }
}

fn script_error<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>) -> BridgeError {
    BridgeError::Script(exception_of(ctx, caught))
}

/// 创建上下文并绑定全局宿主对象
pub fn create_context(global: impl Into<HostValue>) -> BridgeResult<Context> {
    Context::with_global(global)
}

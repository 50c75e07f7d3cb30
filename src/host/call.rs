//! 宿主调用帧
//!
//! 每次脚本调用宿主方法时构造一个 `Call`，携带已转换的参数、接收者，
//! 以及发起调用的脚本上下文。宿主代码通过 `Call::context` 同步回调脚本、
//! 读写全局变量或求值源码，这些操作都在同一个调用栈上嵌套进行。

use super::object::HostObject;
use super::value::HostValue;
use crate::core::error::{HostError, HostResult};

/// 当前脚本上下文
///
/// 脚本抛出的异常以 `HostError::Guest` 返回；原样返回给脚本时抛出的是
/// 同一个值。执行期限到达时返回 `HostError::Terminated`。
pub trait GuestScope {
    /// 以 `undefined` 为接收者调用脚本函数
    fn invoke(&self, callee: &HostValue, args: &[HostValue]) -> HostResult<HostValue>;

    /// 等价于脚本中的 `new ctor(...args)`
    fn construct(&self, constructor: &HostValue, args: &[HostValue]) -> HostResult<HostValue>;

    /// 在全局作用域中求值
    fn eval(&self, source: &str) -> HostResult<HostValue>;

    fn get(&self, name: &str) -> HostResult<HostValue>;

    fn set(&self, name: &str, value: HostValue) -> HostResult<()>;

    /// 上下文绑定的全局宿主对象
    fn global_object(&self) -> Option<HostObject>;
}

/// 不绑定任何上下文的作用域
pub struct Detached;

fn outside(what: &str) -> HostError {
    HostError::type_error(format!("cannot {what} outside of a script context"))
}

impl GuestScope for Detached {
    fn invoke(&self, callee: &HostValue, _args: &[HostValue]) -> HostResult<HostValue> {
        Err(outside(&format!("call {}", callee.type_name())))
    }

    fn construct(&self, constructor: &HostValue, _args: &[HostValue]) -> HostResult<HostValue> {
        Err(outside(&format!("construct {}", constructor.type_name())))
    }

    fn eval(&self, _source: &str) -> HostResult<HostValue> {
        Err(outside("evaluate source"))
    }

    fn get(&self, name: &str) -> HostResult<HostValue> {
        Err(outside(&format!("read global {name}")))
    }

    fn set(&self, name: &str, _value: HostValue) -> HostResult<()> {
        Err(outside(&format!("assign global {name}")))
    }

    fn global_object(&self) -> Option<HostObject> {
        None
    }
}

/// 一次宿主调用
pub struct Call<'a> {
    args: &'a [HostValue],
    this: Option<&'a HostObject>,
    scope: &'a dyn GuestScope,
}

impl<'a> Call<'a> {
    pub fn new(args: &'a [HostValue], scope: &'a dyn GuestScope) -> Self {
        Self {
            args,
            this: None,
            scope,
        }
    }

    /// 脱离上下文的调用，用于宿主侧直接实例化类
    pub fn detached(args: &'a [HostValue]) -> Self {
        Self::new(args, &Detached)
    }

    pub fn with_this(mut self, this: &'a HostObject) -> Self {
        self.this = Some(this);
        self
    }

    pub fn args(&self) -> &[HostValue] {
        self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// 第 `index` 个参数，缺省为 `Undefined`
    pub fn arg(&self, index: usize) -> HostValue {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// 实例方法的接收者对象
    pub fn this(&self) -> Option<&HostObject> {
        self.this
    }

    pub fn int(&self, index: usize) -> HostResult<i64> {
        let value = self.arg(index);
        value
            .as_int()
            .ok_or_else(|| expected(index, "an integer", &value))
    }

    pub fn float(&self, index: usize) -> HostResult<f64> {
        let value = self.arg(index);
        value
            .as_float()
            .ok_or_else(|| expected(index, "a number", &value))
    }

    pub fn string(&self, index: usize) -> HostResult<String> {
        match self.arg(index) {
            HostValue::String(value) => Ok(value),
            other => Err(expected(index, "a string", &other)),
        }
    }

    /// 发起本次调用的脚本上下文
    pub fn context(&self) -> &'a dyn GuestScope {
        self.scope
    }

    /// 同步调用脚本侧函数
    pub fn invoke(&self, callee: &HostValue, args: &[HostValue]) -> HostResult<HostValue> {
        self.scope.invoke(callee, args)
    }
}

fn expected(index: usize, what: &str, got: &HostValue) -> HostError {
    HostError::type_error(format!(
        "argument {index} must be {what}, got {}",
        got.type_name()
    ))
}

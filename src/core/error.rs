//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **宿主层错误** (`HostError`): 宿主方法、属性钩子、容器协议返回的错误
//! - **脚本异常** (`GuestScriptException`): 脚本侧抛出、在宿主侧观察到的异常
//! - **桥接层错误** (`BridgeError`): `Context` 对外暴露的顶层错误
//!
//! `BridgeError` 可以同时承载宿主层错误和脚本异常。

use thiserror::Error;

use crate::config::ConfigError;

/// 脚本侧抛出的异常
///
/// 保存异常的名称、消息和调用栈，不持有任何引擎对象，因此可以跨线程传递。
/// 经 `Call::invoke` 等回调捕获的异常还记录原始抛出值在上下文中的编号，
/// 宿主把它原样返回给脚本时抛出的是同一个值。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct GuestScriptException {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub(crate) thrown: Option<u64>,
}

impl GuestScriptException {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            thrown: None,
        }
    }

    pub(crate) fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }
}

/// 宿主侧错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("{method} called on an object that is not a {expected}")]
    InvalidReceiver { expected: String, method: String },

    #[error("{0} is not constructible")]
    NotConstructible(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Raised(String),

    #[error(transparent)]
    Guest(#[from] GuestScriptException),

    /// 回调脚本时执行期限到达；返回给脚本后仍不可捕获
    #[error("script execution was interrupted")]
    Terminated(GuestScriptException),
}

impl HostError {
    /// 构造一个普通的宿主异常，脚本侧看到的是 `Error`
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised(message.into())
    }

    /// 构造一个类型错误，脚本侧看到的是 `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// 脚本侧是否以 `TypeError` 抛出
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReceiver { .. } | Self::NotConstructible(_) | Self::Type(_)
        )
    }
}

/// 桥接层顶层错误
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Engine initialization error: {0}")]
    Init(String),

    #[error("Script exception: {0}")]
    Script(#[from] GuestScriptException),

    #[error("Script terminated after {0}ms")]
    Terminated(u64),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// 脚本抛出的异常，没有时为 `None`
    pub fn exception(&self) -> Option<&GuestScriptException> {
        match self {
            Self::Script(exception) | Self::Host(HostError::Guest(exception)) => Some(exception),
            _ => None,
        }
    }
}

impl From<rquickjs::Error> for BridgeError {
    fn from(error: rquickjs::Error) -> Self {
        Self::Engine(error.to_string())
    }
}

/// 结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type HostResult<T> = Result<T, HostError>;

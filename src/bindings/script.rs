//! 可复用脚本
//!
//! `Script` 是带名字的一段全局代码，可以在任意多个上下文中运行。每次
//! 运行都在目标上下文中重新解析，脚本本身不持有任何引擎状态，因此可以
//! 跨线程传递和共享。

use super::context::Context;
use crate::core::error::BridgeResult;
use crate::host::HostValue;

/// 带名字的脚本源码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    source: String,
}

impl Script {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 在给定上下文中运行，等价于 `context.run(self)`
    pub fn run(&self, context: &Context) -> BridgeResult<HostValue> {
        context.run(self)
    }
}

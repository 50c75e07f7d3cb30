//! 脚本侧 `console` 对象
//!
//! 输出转发到 `tracing`，目标为 `script`。

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Result};

#[derive(Clone, Copy)]
enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

fn emit(level: Level, parts: Rest<Coerced<String>>) {
    let msg = parts
        .0
        .into_iter()
        .map(|part| part.0)
        .collect::<Vec<_>>()
        .join(" ");
    match level {
        Level::Error => tracing::error!(target: "script", "{}", msg),
        Level::Warn => tracing::warn!(target: "script", "{}", msg),
        Level::Debug => tracing::debug!(target: "script", "{}", msg),
        Level::Info => tracing::info!(target: "script", "{}", msg),
    }
}

pub(crate) fn install(ctx: &Ctx<'_>) -> Result<()> {
    let console = Object::new(ctx.clone())?;
    for (name, level) in [
        ("log", Level::Info),
        ("info", Level::Info),
        ("debug", Level::Debug),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let function = Function::new(ctx.clone(), move |parts: Rest<Coerced<String>>| {
            emit(level, parts)
        })?
        .with_name(name)?;
        console.set(name, function)?;
    }
    ctx.globals().set("console", console)?;
    Ok(())
}

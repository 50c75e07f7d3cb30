//! # Script Bridge
//!
//! Exposes host-defined classes and objects to JavaScript running in an embedded
//! QuickJS engine, so that guest scripts can construct, call, read, write and
//! enumerate them as if they were native script objects.
//!
//! ## Features
//!
//! - **Class projection**: host classes become script constructors with prototype
//!   chains mirroring host inheritance, static and class methods, and
//!   `[object Name]` string tags
//! - **Property interception**: declared properties, mapping keys and sequence
//!   indices are served by the host on every access
//! - **Identity**: a host object has exactly one live wrapper per context, and
//!   passing the wrapper back yields the same host object
//! - **Global binding**: a host object can act as the script global scope
//! - **Hidden members**: members marked hidden are invisible to scripts
//! - **Reusable scripts**: a named [`Script`] can run in any number of contexts
//!
//! ## Architecture
//!
//! - [`host`]: the host object model (`HostValue`, `HostObject`, `HostClass`,
//!   `ClassBuilder`)
//! - [`bindings`]: the QuickJS side (marshalling, traps, projection, `Context`)
//! - [`config`]: runtime limits, marshalling limits and logging
//! - [`core`]: error types and shared macros
//!
//! ### Example
//!
//! ```
//! use script_bridge::{ClassBuilder, Context, HostValue};
//!
//! struct Counter {
//!     count: std::cell::Cell<i64>,
//! }
//!
//! let counter = ClassBuilder::<Counter>::new("Counter")
//!     .constructor(|_call| Ok(Counter { count: std::cell::Cell::new(0) }))
//!     .method("increment", |counter, _call| {
//!         counter.count.set(counter.count.get() + 1);
//!         Ok(counter.count.get())
//!     })
//!     .property("count", |counter| Ok(counter.count.get()))
//!     .build();
//!
//! let context = Context::new().unwrap();
//! context.set("Counter", counter).unwrap();
//! let value = context
//!     .eval("const c = new Counter(); c.increment(); c.increment(); c.count")
//!     .unwrap();
//! assert_eq!(value, HostValue::Int(2));
//! ```

/// Error types and shared macros
pub mod core;
/// Host object model
pub mod host;
/// QuickJS binding layer
pub mod bindings;
/// Configuration system
pub mod config;

pub use bindings::{
    create_context, project, ClassTemplate, Context, GuestObject, PropertyDescriptor, Script,
};
pub use config::{
    init_logging, BridgeConfig, ConfigError, LoggingConfig, MarshalConfig, RuntimeConfig,
};
pub use core::error::{
    BridgeError, BridgeResult, GuestScriptException, HostError, HostResult,
};
pub use host::{
    Call, ClassBuilder, ClassId, GuestScope, HostClass, HostFunction, HostObject, HostValue,
};

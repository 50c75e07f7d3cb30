//! JavaScript Binding Layer
//!
//! Projects host classes and objects into a QuickJS context.
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Guest script                         │
//! │      new Dog()   dog.speak()   dog.name   list[0]   Dog.kind │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │ Proxy traps (shim)            │ prototype chain
//!                v                               v
//! ┌────────────────────────────┐   ┌─────────────────────────────┐
//! │  traps: named / indexed     │   │  projector: constructors,   │
//! │  interceptors               │   │  prototypes, bound methods  │
//! └──────────────┬─────────────┘   └──────────────┬──────────────┘
//!                │        marshal (HostValue ↔ Value)              │
//!                v                                                 v
//! ┌──────────────────────────────────────────────────────────────┐
//! │   BridgeState: identity map, projections, guest references   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod console;
pub mod context;
pub mod indexed;
pub mod interceptor;
mod interrupt;
mod marshal;
mod method;
pub mod projector;
mod script;
mod shim;
mod state;
mod traps;

pub use context::{create_context, Context};
pub use indexed::{parse_index, MAX_INDEX};
pub use interceptor::PropertyDescriptor;
pub use projector::{project, ClassTemplate};
pub use script::Script;
pub use state::GuestObject;

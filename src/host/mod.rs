//! 宿主对象模型
//!
//! 桥接层在宿主侧操作的数据：值、对象、类及调用帧。
//! 本模块不依赖脚本引擎，可以独立测试。

pub mod call;
pub mod class;
pub mod object;
pub mod value;

pub use call::{Call, Detached, GuestScope};
pub use class::{
    ClassBuilder, ClassId, HostClass, MappingProtocol, Member, MemberEntry, SequenceProtocol,
};
pub use object::HostObject;
pub use value::{HostFunction, HostValue};

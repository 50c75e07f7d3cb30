//! 上下文级桥接状态
//!
//! 每个 `Context` 拥有一份 `BridgeState`：
//!
//! - 标识映射：宿主对象 ↔ 句柄编号，每个宿主对象在一个上下文中最多一个存活句柄
//! - 类投影缓存：每个类在本上下文中的构造函数和原型
//! - 脚本对象表：宿主侧持有的脚本对象引用
//! - 绑定的全局宿主对象
//! - 穿过宿主帧的脚本异常值，以及执行期限
//!
//! 引擎闭包只持有 `Weak<BridgeState>`。任何 `RefCell` 借用都不会跨越
//! 对引擎或宿主代码的调用；被移除的值总是在借用释放之后才析构。

use rquickjs::{Ctx, Exception, Function, Object, Persistent, Result, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::interrupt::Interrupt;
use super::shim::Shim;
use crate::config::MarshalConfig;
use crate::host::{ClassId, HostClass, HostObject};

/// 标识映射条目，持有宿主对象的强引用
pub(crate) struct HostHandle {
    object: HostObject,
}

struct Projection {
    class: HostClass,
    constructor: Persistent<Function<'static>>,
    prototype: Persistent<Object<'static>>,
}

/// 已投影到某个上下文的类
pub(crate) struct Projected<'js> {
    pub constructor: Function<'js>,
    pub prototype: Object<'js>,
}

struct GuestEntry {
    value: Persistent<Value<'static>>,
    holder: Weak<GuestRef>,
}

pub(crate) struct BridgeState {
    handles: RefCell<HashMap<u32, HostHandle>>,
    by_object: RefCell<HashMap<usize, u32>>,
    next_handle: Cell<u32>,
    projections: RefCell<HashMap<ClassId, Projection>>,
    guests: RefCell<HashMap<u32, GuestEntry>>,
    next_guest: Cell<u32>,
    global: RefCell<Option<(HostObject, u32)>>,
    shim: RefCell<Option<Persistent<Object<'static>>>>,
    thrown: RefCell<HashMap<u64, Persistent<Value<'static>>>>,
    interrupt: Rc<Interrupt>,
    marshal: MarshalConfig,
}

/// 抛出值编号在所有上下文之间唯一，别的上下文的编号查不到值
static NEXT_THROWN: AtomicU64 = AtomicU64::new(1);

impl BridgeState {
    pub fn new(marshal: MarshalConfig) -> Rc<Self> {
        Rc::new(Self {
            handles: RefCell::new(HashMap::new()),
            by_object: RefCell::new(HashMap::new()),
            next_handle: Cell::new(1),
            projections: RefCell::new(HashMap::new()),
            guests: RefCell::new(HashMap::new()),
            next_guest: Cell::new(1),
            global: RefCell::new(None),
            shim: RefCell::new(None),
            thrown: RefCell::new(HashMap::new()),
            interrupt: Interrupt::new(),
            marshal,
        })
    }

    pub fn interrupt(&self) -> &Rc<Interrupt> {
        &self.interrupt
    }

    pub fn max_depth(&self) -> usize {
        self.marshal.max_depth
    }

    pub fn set_shim(&self, api: Persistent<Object<'static>>) {
        let previous = self.shim.replace(Some(api));
        drop(previous);
    }

    pub fn shim<'js>(&self, ctx: &Ctx<'js>) -> Result<Shim<'js>> {
        let api = self.shim.borrow().clone();
        match api {
            Some(api) => Ok(Shim::new(api.restore(ctx)?)),
            None => Err(Exception::throw_message(ctx, "script context has been torn down")),
        }
    }

    // ---- 标识映射 ----

    pub fn object(&self, id: u32) -> Option<HostObject> {
        self.handles
            .borrow()
            .get(&id)
            .map(|handle| handle.object.clone())
    }

    pub fn handle_for(&self, object: &HostObject) -> Option<u32> {
        self.by_object.borrow().get(&object.addr()).copied()
    }

    /// 为宿主对象分配新句柄；编号不复用
    pub fn insert_handle(&self, object: &HostObject) -> u32 {
        let id = self.next_handle.get();
        self.next_handle.set(id.wrapping_add(1).max(1));
        self.handles.borrow_mut().insert(
            id,
            HostHandle {
                object: object.clone(),
            },
        );
        self.by_object.borrow_mut().insert(object.addr(), id);
        id
    }

    /// 释放句柄，宿主对象引用计数减一
    pub fn release(&self, id: u32) {
        let removed = self.handles.borrow_mut().remove(&id);
        if let Some(handle) = &removed {
            let mut by_object = self.by_object.borrow_mut();
            let key = handle.object.addr();
            if by_object.get(&key) == Some(&id) {
                by_object.remove(&key);
            }
        }
        if removed.is_some() {
            tracing::trace!(target: "bridge", id, "Host handle released");
        }
        drop(removed);
    }

    pub fn live_handles(&self) -> usize {
        self.handles.borrow().len()
    }

    // ---- 全局对象 ----

    pub fn set_global(&self, object: HostObject, id: u32) {
        let previous = self.global.replace(Some((object, id)));
        drop(previous);
    }

    pub fn global(&self) -> Option<HostObject> {
        self.global.borrow().as_ref().map(|(object, _)| object.clone())
    }

    // ---- 类投影 ----

    pub fn projection<'js>(&self, ctx: &Ctx<'js>, id: ClassId) -> Result<Option<Projected<'js>>> {
        let saved = self
            .projections
            .borrow()
            .get(&id)
            .map(|p| (p.constructor.clone(), p.prototype.clone()));
        match saved {
            Some((constructor, prototype)) => Ok(Some(Projected {
                constructor: constructor.restore(ctx)?,
                prototype: prototype.restore(ctx)?,
            })),
            None => Ok(None),
        }
    }

    pub fn insert_projection<'js>(&self, ctx: &Ctx<'js>, class: &HostClass, projected: &Projected<'js>) {
        let projection = Projection {
            class: class.clone(),
            constructor: Persistent::save(ctx, projected.constructor.clone()),
            prototype: Persistent::save(ctx, projected.prototype.clone()),
        };
        let previous = self.projections.borrow_mut().insert(class.id(), projection);
        drop(previous);
    }

    pub fn class(&self, id: ClassId) -> Option<HostClass> {
        self.projections.borrow().get(&id).map(|p| p.class.clone())
    }

    // ---- 脚本对象 ----

    pub fn guest(&self, key: u32) -> Option<GuestObject> {
        self.guests
            .borrow()
            .get(&key)
            .and_then(|entry| entry.holder.upgrade())
            .map(GuestObject)
    }

    pub fn guest_value<'js>(&self, ctx: &Ctx<'js>, key: u32) -> Result<Option<Value<'js>>> {
        let saved = self.guests.borrow().get(&key).map(|entry| entry.value.clone());
        saved.map(|value| value.restore(ctx)).transpose()
    }

    pub fn insert_guest<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, value: Value<'js>) -> GuestObject {
        let key = self.next_guest.get();
        self.next_guest.set(key.wrapping_add(1).max(1));
        let holder = Rc::new(GuestRef {
            key,
            state: Rc::downgrade(self),
        });
        let entry = GuestEntry {
            value: Persistent::save(ctx, value),
            holder: Rc::downgrade(&holder),
        };
        let previous = self.guests.borrow_mut().insert(key, entry);
        drop(previous);
        GuestObject(holder)
    }

    fn forget_guest(&self, key: u32) {
        let removed = self.guests.borrow_mut().remove(&key);
        drop(removed);
    }

    // ---- 穿过宿主帧的异常 ----

    /// 保存回调中捕获的原始抛出值
    pub fn save_thrown<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>) -> u64 {
        let key = NEXT_THROWN.fetch_add(1, Ordering::Relaxed);
        self.thrown
            .borrow_mut()
            .insert(key, Persistent::save(ctx, value));
        key
    }

    /// 取出原始抛出值；只能取一次
    pub fn take_thrown<'js>(&self, ctx: &Ctx<'js>, key: u64) -> Result<Option<Value<'js>>> {
        let saved = self.thrown.borrow_mut().remove(&key);
        saved.map(|value| value.restore(ctx)).transpose()
    }

    /// 顶层调用结束后，没有被宿主重新抛出的值不再需要
    pub fn clear_thrown(&self) {
        let thrown = mem::take(&mut *self.thrown.borrow_mut());
        drop(thrown);
    }

    #[cfg(test)]
    pub fn live_thrown(&self) -> usize {
        self.thrown.borrow().len()
    }

    #[cfg(test)]
    pub fn live_guests(&self) -> usize {
        self.guests.borrow().len()
    }

    /// 释放本上下文持有的全部句柄、投影和脚本对象
    ///
    /// 必须在引擎运行时释放之前调用。
    pub fn clear(&self) {
        let global = self.global.take();
        let handles = mem::take(&mut *self.handles.borrow_mut());
        self.by_object.borrow_mut().clear();
        let projections = mem::take(&mut *self.projections.borrow_mut());
        let guests = mem::take(&mut *self.guests.borrow_mut());
        let thrown = mem::take(&mut *self.thrown.borrow_mut());
        let shim = self.shim.take();
        tracing::debug!(
            target: "bridge",
            handles = handles.len(),
            projections = projections.len(),
            guests = guests.len(),
            "Bridge state cleared"
        );
        drop(global);
        drop(handles);
        drop(projections);
        drop(guests);
        drop(thrown);
        drop(shim);
    }
}

struct GuestRef {
    key: u32,
    state: Weak<BridgeState>,
}

impl Drop for GuestRef {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.forget_guest(self.key);
        }
    }
}

/// 宿主侧持有的脚本对象
///
/// 不包装宿主对象的脚本值（函数、脚本类实例等）以此形式进入宿主。
/// 可以原样传回脚本，也可以通过 `Context::call` 或 `Call::invoke` 调用。
/// 同一脚本对象多次进入宿主时得到同一个 `GuestObject`。
#[derive(Clone)]
pub struct GuestObject(Rc<GuestRef>);

impl GuestObject {
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// 所属上下文是否仍然存在
    pub fn is_alive(&self) -> bool {
        self.0.state.strong_count() > 0
    }

    pub(crate) fn key(&self) -> u32 {
        self.0.key
    }

    pub(crate) fn belongs_to(&self, state: &Rc<BridgeState>) -> bool {
        Weak::as_ptr(&self.0.state) == Rc::as_ptr(state)
    }
}

impl fmt::Debug for GuestObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestObject({})", self.0.key)
    }
}

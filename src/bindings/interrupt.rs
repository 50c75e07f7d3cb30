//! 执行期限
//!
//! 引擎的中断回调读取 `Interrupt`；期限到达后回调返回 `true`，当前求值
//! 以不可捕获的异常终止。`tripped` 记录本次顶层调用中是否发生过中断，
//! 宿主帧据此把回调中的中断原样向外传播。

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub(crate) struct Interrupt {
    deadline: Cell<Option<Instant>>,
    tripped: Cell<bool>,
}

impl Interrupt {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            deadline: Cell::new(None),
            tripped: Cell::new(false),
        })
    }

    /// 设置期限，返回的守卫在析构时恢复之前的期限
    ///
    /// 嵌套调用时保留更早的那个期限。
    pub fn arm(self: &Rc<Self>, timeout: Option<Duration>) -> DeadlineGuard {
        let previous = self.deadline.get();
        if let Some(timeout) = timeout {
            let deadline = Instant::now() + timeout;
            self.deadline
                .set(Some(previous.map_or(deadline, |previous| previous.min(deadline))));
        }
        DeadlineGuard {
            interrupt: Rc::clone(self),
            previous,
        }
    }

    pub fn should_interrupt(&self) -> bool {
        match self.deadline.get() {
            Some(deadline) if Instant::now() >= deadline => {
                self.tripped.set(true);
                true
            }
            _ => false,
        }
    }

    pub fn tripped(&self) -> bool {
        self.tripped.get()
    }
}

pub(crate) struct DeadlineGuard {
    interrupt: Rc<Interrupt>,
    previous: Option<Instant>,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.interrupt.deadline.set(self.previous);
        if self.previous.is_none() {
            self.interrupt.tripped.set(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_guard_restores_previous() {
        let interrupt = Interrupt::new();
        {
            let _outer = interrupt.arm(Some(Duration::from_secs(60)));
            let outer = interrupt.deadline.get();
            assert!(outer.is_some());
            {
                let _inner = interrupt.arm(Some(Duration::from_secs(3600)));
                assert_eq!(interrupt.deadline.get(), outer);
            }
            assert_eq!(interrupt.deadline.get(), outer);
        }
        assert!(interrupt.deadline.get().is_none());
        assert!(!interrupt.should_interrupt());
    }

    #[test]
    fn test_expired_deadline_trips() {
        let interrupt = Interrupt::new();
        {
            let _guard = interrupt.arm(Some(Duration::ZERO));
            assert!(interrupt.should_interrupt());
            assert!(interrupt.tripped());
        }
        // 最外层守卫析构后清除中断标记
        assert!(!interrupt.tripped());
    }
}

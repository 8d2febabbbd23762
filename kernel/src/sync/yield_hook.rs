//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 等待时让出 CPU
//!
//! 内核是协作式调度的：等待者如果一直自旋，同一个 hart 上的其他线程
//! 永远得不到运行。内核在启动时通过 `set_yield_hook` 注册调度器的
//! yield，`SchedYield` 在等待循环中调用它；没有注册时退化为自旋提示。

use spin::relax::RelaxStrategy;
use spin::Once;

/// 调度器提供的让出函数
static YIELD_HOOK: Once<fn()> = Once::new();

/// 注册调度器的让出函数（只有第一次调用生效）
///
/// # 返回
/// 实际生效的函数
pub fn set_yield_hook(hook: fn()) -> fn() {
    *YIELD_HOOK.call_once(|| hook)
}

/// 是否已经注册
pub fn yield_hook_installed() -> bool {
    YIELD_HOOK.is_completed()
}

/// 让出 CPU 的等待策略
pub struct SchedYield;

impl RelaxStrategy for SchedYield {
    #[inline(always)]
    fn relax() {
        match YIELD_HOOK.get() {
            Some(hook) => hook(),
            None => core::hint::spin_loop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ConditionVariable;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use spin::Mutex;
    use std::sync::Arc;
    use std::thread;

    static YIELDS: AtomicUsize = AtomicUsize::new(0);

    fn count_yield() {
        YIELDS.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }

    #[test]
    fn test_wait_goes_through_scheduler() {
        set_yield_hook(count_yield);
        assert!(yield_hook_installed());

        let state = Arc::new((Mutex::new(false), ConditionVariable::<SchedYield>::new()));
        let waiter = {
            let state = state.clone();
            thread::spawn(move || {
                let (mutex, cond) = &*state;
                let mut ready = mutex.lock();
                while !*ready {
                    ready = cond.wait(mutex, ready);
                }
            })
        };

        // 等待者进入等待后才唤醒，保证它至少让出过一次
        while YIELDS.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        {
            let (mutex, cond) = &*state;
            *mutex.lock() = true;
            cond.broadcast();
        }
        waiter.join().unwrap();
        assert!(YIELDS.load(Ordering::SeqCst) > 0);
    }
}

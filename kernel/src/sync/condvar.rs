//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 条件变量 (Condition Variable) 机制
//!
//! 参考 `pthread_cond_t` 的语义，配合 `spin::Mutex` 使用：
//! - 必须在持有互斥锁时调用 wait()
//! - wait() 释放锁并等待，被唤醒后重新获取锁
//! - 唤醒只是提示，调用者必须在循环中重新检查条件

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::relax::{RelaxStrategy, Spin};
use spin::{Mutex, MutexGuard};

/// 条件变量
///
/// 内部是一个事件计数：wait() 在持锁时记录当前代数，释放锁后
/// 等待代数变化；broadcast() 递增代数。因为代数是在持锁时读取的，
/// 在检查条件和进入等待之间发生的唤醒不会丢失。
///
/// # 使用示例
/// ```no_run
/// # use rux_net::sync::ConditionVariable;
/// # use spin::Mutex;
/// # fn test(mutex: &Mutex<bool>, cond: &ConditionVariable) {
/// let mut ready = mutex.lock();
/// while !*ready {
///     ready = cond.wait(mutex, ready);
/// }
/// # }
/// ```
pub struct ConditionVariable<R: RelaxStrategy = Spin> {
    /// 唤醒代数
    generation: AtomicU64,
    relax: PhantomData<R>,
}

impl<R: RelaxStrategy> ConditionVariable<R> {
    /// 创建新条件变量
    pub const fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            relax: PhantomData,
        }
    }

    /// 等待唤醒
    ///
    /// # 参数
    /// * `mutex` - 关联的互斥锁
    /// * `guard` - 当前持有的锁，必须来自 `mutex`
    ///
    /// # 返回
    /// 重新获取的锁
    ///
    /// # 行为
    /// 1. 记录当前唤醒代数
    /// 2. 释放互斥锁
    /// 3. 等待代数变化
    /// 4. 重新获取互斥锁并返回
    pub fn wait<'a, T>(&self, mutex: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let seen = self.generation.load(Ordering::Acquire);
        drop(guard);

        while self.generation.load(Ordering::Acquire) == seen {
            R::relax();
        }

        mutex.lock()
    }

    /// 唤醒所有等待者
    pub fn broadcast(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// 当前唤醒代数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<R: RelaxStrategy> Default for ConditionVariable<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_broadcast_bumps_generation() {
        let cond: ConditionVariable = ConditionVariable::new();
        assert_eq!(cond.generation(), 0);
        cond.broadcast();
        cond.broadcast();
        assert_eq!(cond.generation(), 2);
    }

    #[test]
    fn test_wait_returns_after_broadcast() {
        let state = Arc::new((Mutex::new(false), ConditionVariable::<Spin>::new()));

        let waiter = {
            let state = state.clone();
            thread::spawn(move || {
                let (mutex, cond) = &*state;
                let mut ready = mutex.lock();
                while !*ready {
                    ready = cond.wait(mutex, ready);
                }
                *ready
            })
        };

        {
            let (mutex, cond) = &*state;
            *mutex.lock() = true;
            cond.broadcast();
        }

        assert!(waiter.join().unwrap());
    }
}

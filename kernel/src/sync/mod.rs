//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 同步原语 (Synchronization Primitives)
//!
//! 互斥锁直接使用 `spin::Mutex`，这里补充与之配合的条件变量：
//! - wait() 释放锁并等待事件
//! - broadcast() 唤醒所有等待者
//!
//! 等待方式由 `spin::relax::RelaxStrategy` 决定：主机测试用 `Spin`，
//! 内核用 `SchedYield` 让出 CPU。

pub mod condvar;
pub mod yield_hook;

pub use condvar::ConditionVariable;
pub use yield_hook::{set_yield_hook, SchedYield};

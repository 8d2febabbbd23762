//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络系统调用错误代码
//!
//! 和 include/uapi/asm-generic/errno.h 取值一致

use core::fmt;

/// 标准错误代码
///
/// 系统调用失败时返回 `as_neg()`，成功时返回非负长度
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Bad file number (EBADF, 9)
    BadFileNumber = 9,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,

    /// Message too long (EMSGSIZE, 90)
    MessageTooLong = 90,

    /// Transport endpoint is not connected (ENOTCONN, 107)
    NotConnected = 107,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg(self) -> isize {
        -(self as i32 as isize)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Errno::BadFileNumber => "EBADF",
            Errno::TryAgain => "EAGAIN",
            Errno::InvalidArgument => "EINVAL",
            Errno::TooManyOpenFiles => "EMFILE",
            Errno::MessageTooLong => "EMSGSIZE",
            Errno::NotConnected => "ENOTCONN",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EBADF: i32 = 9;
    pub const EAGAIN: i32 = 11;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const EMSGSIZE: i32 = 90;
    pub const ENOTCONN: i32 = 107;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::BadFileNumber.as_i32(), constants::EBADF);
        assert_eq!(Errno::InvalidArgument.as_i32(), constants::EINVAL);
        assert_eq!(Errno::MessageTooLong.as_i32(), constants::EMSGSIZE);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::TryAgain.as_neg(), -11);
        assert_eq!(Errno::NotConnected.as_neg(), -107);
    }

    #[test]
    fn test_errno_display() {
        assert_eq!(alloc::format!("{}", Errno::InvalidArgument), "EINVAL (22)");
    }
}

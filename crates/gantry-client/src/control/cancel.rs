//! 协作式取消令牌

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 取消令牌（可克隆，克隆体共享同一个标志）
///
/// 执行器在忙等循环的每次迭代中检查该标志。
///
/// ```rust
/// use gantry_client::control::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 清除取消标志（开始新一次执行前调用）
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

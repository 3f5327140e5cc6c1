//! 调试诊断：进程级调试开关与附着在错误上的上下文。
//!
//! # 教案式说明
//! - **意图 (Why)**：定位线上坏包时，仅有错误类别往往不够，需要知道失败发生在哪一层容器、
//!   周围字节长什么样；
//! - **契约 (What)**：全局开关只是“建议默认值”，在构建 [`crate::EngineConfig`] 时被采样一次，
//!   正在运行的编解码器始终以自身配置为准，保证并发会话行为确定；
//! - **代价 (Trade-offs)**：诊断只在失败路径上构造，成功路径零开销。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::wire::Tag;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// 片段在失败偏移两侧各截取的字节数。
pub const EXCERPT_RADIUS: usize = 8;

/// 设置进程级调试默认值；只影响此后构建的配置。
pub fn set_debug_enabled(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

/// 读取进程级调试默认值。
pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// 失败现场的诊断上下文。
///
/// - `path`：失败时仍处于打开状态的容器标签，末尾追加正在处理的标签；
/// - `offset`：失败位置在缓冲中的字节偏移；
/// - `excerpt`：偏移前后各 [`EXCERPT_RADIUS`] 字节的十六进制文本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostics {
    pub path: Vec<Tag>,
    pub offset: usize,
    pub excerpt: String,
}

impl Diagnostics {
    /// 从失败所在的缓冲截取片段并组装诊断。
    pub fn new(path: Vec<Tag>, offset: usize, buffer: &[u8]) -> Self {
        let anchor = offset.min(buffer.len());
        let start = anchor.saturating_sub(EXCERPT_RADIUS);
        let end = anchor.saturating_add(EXCERPT_RADIUS).min(buffer.len());
        Self {
            path,
            offset,
            excerpt: hex::encode(&buffer[start..end]),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("path=")?;
        if self.path.is_empty() {
            f.write_str("<root>")?;
        }
        for (index, tag) in self.path.iter().enumerate() {
            if index > 0 {
                f.write_str(">")?;
            }
            f.write_str(tag.name())?;
        }
        write!(f, " offset={} excerpt={}", self.offset, self.excerpt)
    }
}

//! 错误域：Lens 编解码过程中所有可观察失败的最终形态。
//!
//! # 设计背景（Why）
//! - 调用方需要按“机读类别”决定重试、降级或直接拒绝请求，因此每个错误都携带稳定的 [`ErrorKind`]
//!   与对应的错误码字符串（见 [`codes`]）；
//! - 原始实现区分“编码侧错误”与“解码侧错误”两个家族，这里以 [`Phase`] 字段表达，
//!   避免为同一套类别再复制一层类型。
//!
//! # 契约说明（What）
//! - 任何错误都会中止整个 encode/decode 调用，不存在部分结果；
//! - `diagnostics` 仅在调试开关打开时填充，不影响 `kind`/`message` 的取值。

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// 稳定错误码，遵循 `<域>.<语义>` 命名，供日志、指标与告警直接引用。
pub mod codes {
    pub const UNSUPPORTED_TYPE: &str = "lens.unsupported_type";
    pub const DEPTH_EXCEEDED: &str = "lens.depth_exceeded";
    pub const SYMBOL_CAPACITY_REACHED: &str = "lens.symbol_capacity_reached";
    pub const UNKNOWN_SYMBOL: &str = "lens.unknown_symbol";
    pub const TRUNCATED: &str = "lens.truncated";
    pub const TRAILING_DATA: &str = "lens.trailing_data";
    pub const INVALID_TAG: &str = "lens.invalid_tag";
    pub const MALFORMED: &str = "lens.malformed";
}

/// 错误类别。
///
/// - `UnsupportedType`：编码时遇到无法表达、且扩展适配器未处理的值；
/// - `DepthExceeded`：容器嵌套超过配置上限（编解码双向）；
/// - `SymbolCapacityReached`：符号表已满；默认策略下编码器会降级为内联键而非失败；
/// - `UnknownSymbol`：解码时符号索引超出所给符号表范围；
/// - `Truncated`：缓冲在声明长度满足之前结束；
/// - `TrailingData`：顶层值读完后仍有剩余字节；
/// - `InvalidTag`：无法识别的标签字节；
/// - `Malformed`：其余内部不一致（非法 varint、非法 UTF-8、错位标签、重复键等）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    UnsupportedType,
    DepthExceeded,
    SymbolCapacityReached,
    UnknownSymbol,
    Truncated,
    TrailingData,
    InvalidTag,
    Malformed,
}

impl ErrorKind {
    /// 返回类别对应的稳定错误码。
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedType => codes::UNSUPPORTED_TYPE,
            ErrorKind::DepthExceeded => codes::DEPTH_EXCEEDED,
            ErrorKind::SymbolCapacityReached => codes::SYMBOL_CAPACITY_REACHED,
            ErrorKind::UnknownSymbol => codes::UNKNOWN_SYMBOL,
            ErrorKind::Truncated => codes::TRUNCATED,
            ErrorKind::TrailingData => codes::TRAILING_DATA,
            ErrorKind::InvalidTag => codes::INVALID_TAG,
            ErrorKind::Malformed => codes::MALFORMED,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 错误产生的阶段。
///
/// `Session` 覆盖不属于某次具体编解码调用的失败，例如构建符号表、解析配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Encode,
    Decode,
    Session,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Encode => "encode",
            Phase::Decode => "decode",
            Phase::Session => "session",
        })
    }
}

/// `LensError` 是引擎对外暴露的唯一错误类型。
///
/// # 逻辑解析（How）
/// - 以 Builder 风格方法叠加阶段、偏移与诊断上下文；
/// - `Display` 输出 `[错误码] 阶段: 消息`，调试模式下追加路径与十六进制片段。
///
/// # 契约说明（What）
/// - **前置条件**：`kind` 必须与失败语义一致，扩展钩子自行构造错误时同样适用；
/// - **后置条件**：错误拥有独立所有权，可跨线程传递（`Send + Sync + 'static`）。
#[derive(Debug, Error)]
#[error("[{kind}] {phase}: {message}{}", render_context(.offset, .diagnostics))]
pub struct LensError {
    kind: ErrorKind,
    phase: Phase,
    message: Cow<'static, str>,
    offset: Option<usize>,
    diagnostics: Option<Box<Diagnostics>>,
}

impl LensError {
    /// 构造错误，阶段默认为 [`Phase::Session`]，由编解码器在传播时改写。
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            phase: Phase::Session,
            message: message.into(),
            offset: None,
            diagnostics: None,
        }
    }

    pub(crate) fn encode(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, message).with_phase(Phase::Encode)
    }

    pub(crate) fn decode(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, message).with_phase(Phase::Decode)
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(Box::new(diagnostics));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 稳定错误码，等价于 `self.kind().code()`。
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_encode(&self) -> bool {
        self.phase == Phase::Encode
    }

    pub fn is_decode(&self) -> bool {
        self.phase == Phase::Decode
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 失败位置在对应缓冲中的字节偏移（编码侧为输出偏移，解码侧为输入偏移）。
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// 调试诊断上下文；仅在调试开关打开时存在。
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_deref()
    }
}

fn render_context(offset: &Option<usize>, diagnostics: &Option<Box<Diagnostics>>) -> String {
    match (offset, diagnostics) {
        (_, Some(diag)) => format!(" ({diag})"),
        (Some(offset), None) => format!(" (at offset {offset})"),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Tag;

    #[test]
    fn display_carries_code_phase_and_offset() {
        let err = LensError::decode(ErrorKind::Truncated, "need 4 more bytes").with_offset(12);
        assert_eq!(
            err.to_string(),
            "[lens.truncated] decode: need 4 more bytes (at offset 12)"
        );
        assert!(err.is_decode());
        assert!(!err.is_encode());
    }

    #[test]
    fn diagnostics_replace_plain_offset_in_display() {
        let diag = Diagnostics::new(vec![Tag::Map, Tag::Str], 3, b"\x0d\x01\x08\xff");
        let err = LensError::decode(ErrorKind::Malformed, "invalid utf-8")
            .with_offset(3)
            .with_diagnostics(diag);
        let rendered = err.to_string();
        assert!(rendered.contains("path=MAP>STR"), "实际输出: {rendered}");
        assert!(rendered.contains("offset=3"), "实际输出: {rendered}");
    }

    #[test]
    fn every_kind_has_a_distinct_code() {
        let kinds = [
            ErrorKind::UnsupportedType,
            ErrorKind::DepthExceeded,
            ErrorKind::SymbolCapacityReached,
            ErrorKind::UnknownSymbol,
            ErrorKind::Truncated,
            ErrorKind::TrailingData,
            ErrorKind::InvalidTag,
            ErrorKind::Malformed,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}

//! 线格式（版本 [`WIRE_VERSION`]）：标签字节、定长数值与 LEB128 varint 的读写原语。
//!
//! # 教案式说明
//! - **意图 (Why)**：编码器与解码器必须对每个字节的含义达成一致，本模块是二者唯一的共同依赖，
//!   不持有任何状态；
//! - **布局 (What)**：每个值由 1 字节标签加标签专属载荷构成，所有定长数值均为小端序，
//!   长度、计数、符号索引与扩展 ID 统一采用无符号 LEB128 varint；
//! - **约束 (Trade-offs)**：解码侧接受任意整数宽度，但编码侧总是选择最窄宽度，保证输出确定。
//!
//! | 标签 | 名称 | 载荷 |
//! |------|------|------|
//! | `0x00` | NULL | 无 |
//! | `0x01` | FALSE | 无 |
//! | `0x02` | TRUE | 无 |
//! | `0x03` | INT8 | 1 字节补码 |
//! | `0x04` | INT16 | 2 字节小端 |
//! | `0x05` | INT32 | 4 字节小端 |
//! | `0x06` | INT64 | 8 字节小端 |
//! | `0x07` | FLOAT64 | 8 字节 IEEE-754 小端 |
//! | `0x08` | STR | varint 字节长度 + UTF-8 |
//! | `0x09` | BYTES | varint 字节长度 + 原始字节 |
//! | `0x0A` | SYMREF | varint 符号索引（仅限映射键） |
//! | `0x0B` | TIMESTAMP | 8 字节 i64 小端，Unix 毫秒（UTC） |
//! | `0x0C` | LIST | varint 元素个数 + 元素 |
//! | `0x0D` | MAP | varint 条目个数 + (键, 值) 对 |
//! | `0x0E` | EXT | varint 扩展 ID（u32 范围）+ varint 长度 + 原始字节 |

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{ErrorKind, LensError};

/// 线格式版本号；任何改变标签取值、端序或 varint 方案的修改都必须递增。
pub const WIRE_VERSION: u32 = 1;

/// varint 编码 `u64` 的最大字节数。
pub const MAX_VARINT_LEN: usize = 10;

/// 线格式标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Null = 0x00,
    False = 0x01,
    True = 0x02,
    Int8 = 0x03,
    Int16 = 0x04,
    Int32 = 0x05,
    Int64 = 0x06,
    Float64 = 0x07,
    Str = 0x08,
    Bytes = 0x09,
    SymRef = 0x0A,
    Timestamp = 0x0B,
    List = 0x0C,
    Map = 0x0D,
    Ext = 0x0E,
}

impl Tag {
    /// 将字节解释为标签；不在已知集合内时返回 `None`。
    pub const fn from_byte(byte: u8) -> Option<Tag> {
        Some(match byte {
            0x00 => Tag::Null,
            0x01 => Tag::False,
            0x02 => Tag::True,
            0x03 => Tag::Int8,
            0x04 => Tag::Int16,
            0x05 => Tag::Int32,
            0x06 => Tag::Int64,
            0x07 => Tag::Float64,
            0x08 => Tag::Str,
            0x09 => Tag::Bytes,
            0x0A => Tag::SymRef,
            0x0B => Tag::Timestamp,
            0x0C => Tag::List,
            0x0D => Tag::Map,
            0x0E => Tag::Ext,
            _ => return None,
        })
    }

    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Tag::Null => "NULL",
            Tag::False => "FALSE",
            Tag::True => "TRUE",
            Tag::Int8 => "INT8",
            Tag::Int16 => "INT16",
            Tag::Int32 => "INT32",
            Tag::Int64 => "INT64",
            Tag::Float64 => "FLOAT64",
            Tag::Str => "STR",
            Tag::Bytes => "BYTES",
            Tag::SymRef => "SYMREF",
            Tag::Timestamp => "TIMESTAMP",
            Tag::List => "LIST",
            Tag::Map => "MAP",
            Tag::Ext => "EXT",
        }
    }

    /// 是否为容器标签（计入深度）。
    pub const fn is_container(self) -> bool {
        matches!(self, Tag::List | Tag::Map)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 以最窄宽度写入整数：标签 + 对应字节数的小端补码。
pub fn put_int(buf: &mut BytesMut, value: i64) {
    if let Ok(v) = i8::try_from(value) {
        buf.put_u8(Tag::Int8.byte());
        buf.put_i8(v);
    } else if let Ok(v) = i16::try_from(value) {
        buf.put_u8(Tag::Int16.byte());
        buf.put_i16_le(v);
    } else if let Ok(v) = i32::try_from(value) {
        buf.put_u8(Tag::Int32.byte());
        buf.put_i32_le(v);
    } else {
        buf.put_u8(Tag::Int64.byte());
        buf.put_i64_le(value);
    }
}

/// 写入无符号 LEB128 varint。
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// `put_varint` 会写出的字节数。
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// 从切片起始处读取 varint，返回 `(值, 消耗字节数)`。
///
/// # 契约说明（What）
/// - 切片在终止字节之前耗尽：`Truncated`；
/// - 超过 10 字节、溢出 `u64`、或非首字节的终止字节为 0（冗余编码）：`Malformed`；
/// - 错误偏移相对于 `input` 起点，由调用方平移为绝对偏移。
pub fn read_varint(input: &[u8]) -> Result<(u64, usize), LensError> {
    let mut value: u64 = 0;
    for (index, &byte) in input.iter().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(LensError::decode(ErrorKind::Malformed, "varint longer than 10 bytes")
                .with_offset(index));
        }
        let payload = u64::from(byte & 0x7F);
        let shift = 7 * index as u32;
        if index == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(LensError::decode(ErrorKind::Malformed, "varint overflows u64")
                .with_offset(index));
        }
        value |= payload << shift;
        if byte & 0x80 == 0 {
            if byte == 0 && index > 0 {
                return Err(
                    LensError::decode(ErrorKind::Malformed, "overlong varint encoding")
                        .with_offset(index),
                );
            }
            return Ok((value, index + 1));
        }
    }
    Err(LensError::decode(ErrorKind::Truncated, "buffer ends inside a varint")
        .with_offset(input.len()))
}

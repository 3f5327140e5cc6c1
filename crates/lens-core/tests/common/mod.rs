//! 集成测试共享的样例数据。
//!
//! 各测试文件通过 `mod common;` 引入；并非每个文件都会用到全部构造函数。
#![allow(dead_code)]

use lens_core::{Map, Value};

/// 传感器读数样例：覆盖整数、布尔、嵌套映射、字符串列表与原始字节。
///
/// 键按首次出现顺序依次为 `id`、`status`、`meta`、`source`、`tags`、`payload`。
pub fn sensor_reading() -> Value<'static> {
    let mut meta = Map::new();
    meta.insert("source", "sensor_v4");
    meta.insert("tags", Value::List(vec![Value::from("fast"), Value::from("bin")]));

    let mut root = Map::new();
    root.insert("id", 1024);
    root.insert("status", true);
    root.insert("meta", meta);
    root.insert("payload", vec![0x00u8, 0xFF, 0x00, 0xFF]);
    Value::Map(root)
}

/// `sensor_reading` 在空符号表上的编码结果（十六进制）。
pub const SENSOR_READING_HEX: &str = concat!(
    "0d04",
    "0a00",
    "040004",
    "0a01",
    "02",
    "0a02",
    "0d02",
    "0a03",
    "0809",
    "73656e736f725f7634",
    "0a04",
    "0c02",
    "080466617374",
    "080362696e",
    "0a05",
    "090400ff00ff",
);

/// 扩展往返测试使用的应用自定义类型。
#[derive(Debug, PartialEq)]
pub struct Sentinel;

/// 每一层交替使用列表与映射，共 `depth` 层容器。
pub fn alternating_nesting(depth: usize) -> Value<'static> {
    let mut value = Value::Null;
    for level in 0..depth {
        value = if level % 2 == 0 {
            Value::List(vec![value])
        } else {
            let mut map = Map::new();
            map.insert("n", value);
            Value::Map(map)
        };
    }
    value
}

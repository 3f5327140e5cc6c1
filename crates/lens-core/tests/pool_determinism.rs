//! 池化确定性：复用暂存缓冲不得影响输出字节。
//!
//! 同一个带池编码器连续编码一万条大小不一的消息，结果必须与“每次新建编码器”逐字节一致；
//! 缓冲残留、容量提示或扩容路径都不应泄漏到输出里。

mod common;

use lens_core::{BufferPool, Encoder, EngineConfig, Map, PoolConfig, SymbolTable, Value};

use common::sensor_reading;

const ROUNDS: usize = 10_000;

fn message(round: usize) -> Value<'static> {
    // 载荷大小在 0 到约 4 KiB 之间来回摆动，迫使池在复用与扩容之间切换。
    let size = (round * 37) % 4099;
    let mut map = Map::new();
    map.insert("round", round as i64);
    map.insert("blob", vec![(round % 251) as u8; size]);
    if round % 3 == 0 {
        map.insert("reading", sensor_reading());
    }
    if round % 5 == 0 {
        map.insert("note", "x".repeat(round % 97));
    }
    Value::Map(map)
}

#[test]
fn pooled_encoder_matches_fresh_encoders() {
    let mut pooled = Encoder::new();
    let mut pooled_symbols = SymbolTable::new();
    let mut fresh_symbols = SymbolTable::new();

    for round in 0..ROUNDS {
        let value = message(round);
        let reused = pooled.encode(&value, &mut pooled_symbols).expect("池化编码");
        let fresh = Encoder::new()
            .encode(&value, &mut fresh_symbols)
            .expect("新建编码器");
        assert_eq!(reused, fresh, "第 {round} 轮输出不一致");
    }
    assert_eq!(pooled_symbols, fresh_symbols);

    let stats = pooled.pool().stats();
    assert_eq!(stats.fresh_allocations, 1, "单线程顺序编码只需一块缓冲");
    assert_eq!(stats.reuses + stats.growths, ROUNDS as u64 - 1);
    assert_eq!(stats.idle_buffers, 1);
}

#[test]
fn tiny_retention_limit_discards_but_stays_deterministic() {
    let config = EngineConfig {
        pool: PoolConfig {
            initial_capacity: 8,
            max_idle_buffers: 1,
            max_retained_capacity: 64,
        },
        ..EngineConfig::default()
    };
    let mut pooled = Encoder::with_pool(BufferPool::with_config(config.pool), config.clone());
    let mut left = SymbolTable::new();
    let mut right = SymbolTable::new();

    for round in 0..500 {
        let value = message(round);
        let a = pooled.encode(&value, &mut left).expect("池化编码");
        let b = Encoder::with_config(config.clone())
            .encode(&value, &mut right)
            .expect("新建编码器");
        assert_eq!(a, b);
    }
    assert!(pooled.pool().stats().discards > 0, "超过保留上限的缓冲应被丢弃");
}

#[test]
fn failed_encodes_return_their_buffer() {
    let mut encoder = Encoder::with_config(EngineConfig::default().with_max_depth(1));
    let mut symbols = SymbolTable::new();
    for _ in 0..10 {
        encoder
            .encode(&Value::List(vec![Value::List(vec![])]), &mut symbols)
            .expect_err("超出深度");
    }
    let stats = encoder.pool().stats();
    assert_eq!(stats.fresh_allocations, 1);
    assert_eq!(stats.idle_buffers, 1);
}

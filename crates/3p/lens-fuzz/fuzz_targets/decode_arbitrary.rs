#![no_main]

use libfuzzer_sys::fuzz_target;
use lens_core::{Decoder, EngineConfig, SymbolTable};

// 任意字节直接送入解码器。
//
// - **Why**：解码器面对不可信输入，任何字节序列都只能以 `Ok` 或带偏移的 `Err` 结束；
// - **How**：首字节低位选择是否启用零拷贝，其余字节作为线上数据；符号表预置三个条目，
//   让 `SYMREF` 分支既能命中也能越界；
// - **What**：panic、越界读取或无界分配都会被 libFuzzer 报告。
fuzz_target!(|data: &[u8]| {
    let Some((&flags, bytes)) = data.split_first() else {
        return;
    };
    let Ok(symbols) = SymbolTable::from_symbols(["id", "name", "tags"]) else {
        return;
    };
    let decoder = Decoder::with_config(EngineConfig::default().with_zero_copy(flags & 1 == 1));
    match decoder.decode(bytes, &symbols) {
        Ok(value) => {
            let _ = value.into_owned();
        }
        Err(err) => {
            assert!(err.is_decode());
            assert!(err.offset().is_some_and(|offset| offset <= bytes.len()));
        }
    }
});

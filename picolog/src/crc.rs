//! CRC 引擎
//!
//! CRC-32/ISO-HDLC (反射, poly 0x04C11DB7, init/xorout 0xFFFFFFFF)。
//! `const fn` 实现让站点 ID 在编译期折叠为常量；构建器复用同一个函数，
//! 保证两条工具链逐位一致。

/// 反射多项式 (0x04C11DB7 的位反转)
const REFLECTED_POLY: u32 = 0xEDB8_8320;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ REFLECTED_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC_TABLE: [u32; 256] = build_table();

/// 计算 CRC-32/ISO-HDLC。校验值: `crc32(b"123456789") == 0xCBF43926`
pub const fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    let mut i = 0;
    while i < bytes.len() {
        crc = (crc >> 8) ^ CRC_TABLE[((crc ^ bytes[i] as u32) & 0xFF) as usize];
        i += 1;
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_const_eval() {
        // 必须能在编译期求值
        const ID: u32 = crc32(b"examples/hello_cpp/hello.cpp:7");
        assert_eq!(ID, crc32(b"examples/hello_cpp/hello.cpp:7"));
    }

    /// 与生态实现 (crc32fast) 逐位对照
    #[test]
    fn test_matches_crc32fast() {
        let samples: &[&[u8]] = &[
            b"",
            b"a",
            b"123456789",
            b"examples/hello_cpp/hello.cpp:7",
            b"src/main.rs:42",
            b"\x00\xff\x55\xaa",
            b"The quick brown fox jumps over the lazy dog",
        ];
        for s in samples {
            assert_eq!(crc32(s), crc32fast::hash(s), "mismatch for {:?}", s);
        }
    }
}

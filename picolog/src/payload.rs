//! 负载编码
//!
//! 站点负载是值的紧凑小端编码，无隐式对齐。定长类型实现 `Payload`，
//! 编码大小在编译期已知，RECORD 宏据此在栈缓冲里组装负载。
//! 复合类型按字段声明顺序逐个编码即可。

/// 可作为站点负载的定长值
pub trait Payload {
    /// 编码后的字节数
    const SIZE: usize;

    /// 把小端编码写入 `out` 的前 `SIZE` 字节
    fn encode(&self, out: &mut [u8]);
}

macro_rules! impl_payload_int {
    ($($ty:ty),*) => {
        $(
            impl Payload for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_payload_int!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Payload for bool {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }
}

impl<T: Payload, const N: usize> Payload for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn encode(&self, out: &mut [u8]) {
        for (i, v) in self.iter().enumerate() {
            v.encode(&mut out[i * T::SIZE..(i + 1) * T::SIZE]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_encoding() {
        let mut buf = [0u8; 8];

        0x1234u16.encode(&mut buf);
        assert_eq!(&buf[..2], &[0x34, 0x12]);

        (-2i32).encode(&mut buf);
        assert_eq!(&buf[..4], &[0xFE, 0xFF, 0xFF, 0xFF]);

        1.5f32.encode(&mut buf);
        assert_eq!(&buf[..4], &1.5f32.to_le_bytes());

        true.encode(&mut buf);
        assert_eq!(buf[0], 1);
        false.encode(&mut buf);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_array_encoding() {
        let mut buf = [0u8; 8];
        [0x0102u16, 0x0304, 0x0506, 0x0708].encode(&mut buf);
        assert_eq!(buf, [0x02, 0x01, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07]);
        assert_eq!(<[u16; 4] as Payload>::SIZE, 8);
    }

    #[test]
    fn test_struct_encoding_by_hand() {
        // 复合类型按声明顺序手工编码，对应解码端的紧凑布局
        struct Point {
            x: f32,
            y: f32,
            dummy: [i32; 2],
        }

        impl Payload for Point {
            const SIZE: usize = 4 + 4 + 8;

            fn encode(&self, out: &mut [u8]) {
                self.x.encode(&mut out[0..4]);
                self.y.encode(&mut out[4..8]);
                self.dummy.encode(&mut out[8..16]);
            }
        }

        let p = Point {
            x: 0.0,
            y: 5.0,
            dummy: [1, 2],
        };
        let mut buf = [0u8; Point::SIZE];
        p.encode(&mut buf);
        assert_eq!(&buf[0..4], &0.0f32.to_le_bytes());
        assert_eq!(&buf[4..8], &5.0f32.to_le_bytes());
        assert_eq!(&buf[8..12], &1i32.to_le_bytes());
        assert_eq!(&buf[12..16], &2i32.to_le_bytes());
    }
}

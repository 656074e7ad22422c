use bytes::Bytes;

/// A value that can travel through a stream.
///
/// Byte-mode nodes measure their buffer with [`byte_len`](Self::byte_len);
/// object-mode nodes count every chunk as 1.
pub trait Chunk: 'static {
    fn byte_len(&self) -> usize {
        1
    }
}

impl Chunk for Vec<u8> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for Box<[u8]> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for Bytes {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for String {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for &'static str {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

macro_rules! sized_chunk {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Chunk for $ty {
                fn byte_len(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

sized_chunk!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

impl Chunk for () {}

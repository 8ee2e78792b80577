//! App buffer → backend byte layout
//!
//! App buffers hold interleaved native-endian samples. Backends may want
//! another byte order or offset-binary (unsigned) integers; the copy into
//! the ring slot does that conversion word by word.

use sc_core::SoundcardFormat;

use crate::NegotiationError;

/// Byte layout a backend expects for written samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeLayout {
    pub big_endian: bool,
    /// Offset-binary integers (ignored for float formats)
    pub unsigned: bool,
}

impl NativeLayout {
    /// Host byte order, signed samples
    pub const fn host() -> Self {
        Self {
            big_endian: cfg!(target_endian = "big"),
            unsigned: false,
        }
    }

    #[inline]
    fn is_passthrough(self, format: SoundcardFormat) -> bool {
        let host_order = self.big_endian == cfg!(target_endian = "big");
        host_order && !(self.unsigned && format.is_integer())
    }
}

/// Whether the packer can produce `format`
pub fn is_packable(format: SoundcardFormat) -> bool {
    !matches!(format, SoundcardFormat::Complex)
}

/// Convert `app` into `ring` using `layout`.
///
/// Converts `min(app.len(), ring.len())` bytes rounded down to whole words
/// and returns that count.
pub fn fill_ring_buffer(
    app: &[u8],
    format: SoundcardFormat,
    layout: NativeLayout,
    ring: &mut [u8],
) -> Result<usize, NegotiationError> {
    if !is_packable(format) {
        return Err(NegotiationError::UnsupportedFormat(format));
    }

    let word = format.word_size();
    let len = (app.len().min(ring.len()) / word) * word;
    let (src, dst) = (&app[..len], &mut ring[..len]);

    if layout.is_passthrough(format) {
        dst.copy_from_slice(src);
        return Ok(len);
    }

    let be = layout.big_endian;
    let unsigned = layout.unsigned;

    match format {
        SoundcardFormat::S8 => {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = if unsigned { s ^ 0x80 } else { *s };
            }
        }
        SoundcardFormat::S16 => convert::<2>(src, dst, |b| {
            let flip = if unsigned { 0x8000 } else { 0 };
            let v = u16::from_ne_bytes(b) ^ flip;
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::S24 => convert::<4>(src, dst, |b| {
            // 24-bit sample sign-extended in a 32-bit container
            let v = i32::from_ne_bytes(b);
            let v = if unsigned {
                (v.wrapping_add(0x80_0000) & 0xFF_FFFF) as u32
            } else {
                v as u32
            };
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::S32 => convert::<4>(src, dst, |b| {
            let flip = if unsigned { 0x8000_0000 } else { 0 };
            let v = u32::from_ne_bytes(b) ^ flip;
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::S64 => convert::<8>(src, dst, |b| {
            let flip = if unsigned { 1 << 63 } else { 0 };
            let v = u64::from_ne_bytes(b) ^ flip;
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::Float => convert::<4>(src, dst, |b| {
            let v = u32::from_ne_bytes(b);
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::Double => convert::<8>(src, dst, |b| {
            let v = u64::from_ne_bytes(b);
            if be { v.to_be_bytes() } else { v.to_le_bytes() }
        }),
        SoundcardFormat::Complex => return Err(NegotiationError::UnsupportedFormat(format)),
    }

    Ok(len)
}

#[inline]
fn convert<const N: usize>(src: &[u8], dst: &mut [u8], word: impl Fn([u8; N]) -> [u8; N]) {
    for (d, s) in dst.chunks_exact_mut(N).zip(src.chunks_exact(N)) {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(s);
        d.copy_from_slice(&word(bytes));
    }
}

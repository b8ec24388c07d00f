//! # Cursor View
//!
//! Cursor-based binary encoder for the state channel.
//!
//! ## Design
//!
//! - Writes append at the cursor and advance it by the value's width
//! - Reads take an explicit offset and never move the cursor
//! - Change-aware writes compare against a shadow of the last value written
//!   at that offset and skip the write (and the advance) when nothing changed
//!
//! The field order is the wire contract. Nothing in the bytes describes
//! itself, so producer and consumer must walk the same schema.

use std::marker::PhantomData;

use thiserror::Error;

/// Errors raised by cursor reads and writes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    /// A write would run past a fixed-capacity buffer.
    #[error("write of {width} bytes at offset {offset} overflows capacity {capacity}")]
    Overflow {
        /// Offset the write started at.
        offset: usize,
        /// Width of the value.
        width: usize,
        /// Fixed capacity of the view.
        capacity: usize,
    },

    /// A read would run past the written buffer.
    #[error("read of {width} bytes at offset {offset} is out of bounds (len {len})")]
    OutOfBounds {
        /// Offset the read started at.
        offset: usize,
        /// Width of the value.
        width: usize,
        /// Buffer length.
        len: usize,
    },
}

/// Result type for cursor operations.
pub type CursorResult<T> = Result<T, CursorError>;

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width value the cursor knows how to encode.
///
/// All values are little-endian on the wire.
pub trait Primitive: Copy + PartialEq + std::fmt::Debug + sealed::Sealed {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Raw bit pattern used for change detection.
    fn to_bits(self) -> u32;

    /// Writes the value into `out` (exactly `WIDTH` bytes).
    fn encode(self, out: &mut [u8]);

    /// Reads the value from `bytes` (exactly `WIDTH` bytes).
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($t:ty, $width:expr, |$v:ident| $bits:expr) => {
        impl sealed::Sealed for $t {}

        impl Primitive for $t {
            const WIDTH: usize = $width;

            #[inline]
            fn to_bits(self) -> u32 {
                let $v = self;
                $bits
            }

            #[inline]
            fn encode(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

impl_primitive!(u8, 1, |v| u32::from(v));
impl_primitive!(i8, 1, |v| u32::from(v.to_le_bytes()[0]));
impl_primitive!(u16, 2, |v| u32::from(v));
impl_primitive!(i16, 2, |v| u32::from(u16::from_le_bytes(v.to_le_bytes())));
impl_primitive!(u32, 4, |v| v);
impl_primitive!(i32, 4, |v| u32::from_le_bytes(v.to_le_bytes()));
impl_primitive!(f32, 4, |v| v.to_bits());

/// A slot reserved by [`CursorView::reserve`] and filled later.
///
/// Used for length prefixes and other fields whose value is only known
/// after the data that follows them has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a reserved slot should be filled"]
pub struct Reserved<T: Primitive> {
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: Primitive> Reserved<T> {
    /// Byte offset of the slot.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Writes `value` into the slot without moving the cursor.
    ///
    /// # Errors
    ///
    /// Never fails for a slot reserved on the same view; the error exists
    /// for slots handed to a different, shorter view.
    pub fn fill(self, view: &mut CursorView, value: T) -> CursorResult<()> {
        view.write_at(self.offset, value)
    }
}

/// Growable (or fixed) byte buffer with a write cursor and a shadow record.
#[derive(Debug, Clone, Default)]
pub struct CursorView {
    buffer: Vec<u8>,
    cursor: usize,
    fixed: bool,
    /// Last raw value written by a change-aware write, indexed by offset.
    shadow: Vec<u32>,
    /// One bit per offset: set when `shadow` holds a value for it.
    shadow_present: Vec<u64>,
}

impl CursorView {
    /// Creates an empty growable view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a growable view with `capacity` bytes pre-allocated.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Creates a zeroed view of exactly `len` bytes that never grows.
    #[must_use]
    pub fn fixed(len: usize) -> Self {
        Self {
            buffer: vec![0; len],
            cursor: 0,
            fixed: true,
            shadow: vec![0; len],
            shadow_present: vec![0; len.div_ceil(64)],
        }
    }

    /// Current cursor offset.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of bytes backing the view.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the view has no backing bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns true if the view never grows.
    #[inline]
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Rewinds the cursor to 0. Bytes and shadow are kept.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Moves the cursor to `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if a fixed view is shorter than `offset`.
    pub fn seek(&mut self, offset: usize) -> CursorResult<()> {
        if self.fixed && offset > self.buffer.len() {
            return Err(CursorError::Overflow {
                offset,
                width: 0,
                capacity: self.buffer.len(),
            });
        }
        self.cursor = offset;
        Ok(())
    }

    /// Forgets every shadow value, so the next change-aware writes all land.
    pub fn clear_shadow(&mut self) {
        self.shadow_present.fill(0);
    }

    /// Returns `[0, cursor)` without touching the cursor.
    #[inline]
    #[must_use]
    pub fn slice(&self) -> &[u8] {
        &self.buffer[..self.cursor.min(self.buffer.len())]
    }

    /// Returns every backing byte.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn ensure(&mut self, offset: usize, width: usize) -> CursorResult<()> {
        let end = offset + width;
        if end <= self.buffer.len() {
            return Ok(());
        }
        if self.fixed {
            return Err(CursorError::Overflow {
                offset,
                width,
                capacity: self.buffer.len(),
            });
        }
        let new_len = end.max(self.buffer.len() * 2);
        self.buffer.resize(new_len, 0);
        self.shadow.resize(new_len, 0);
        self.shadow_present.resize(new_len.div_ceil(64), 0);
        Ok(())
    }

    /// Writes `value` at `offset` without moving the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if a fixed view is too short.
    pub fn write_at<T: Primitive>(&mut self, offset: usize, value: T) -> CursorResult<()> {
        self.ensure(offset, T::WIDTH)?;
        value.encode(&mut self.buffer[offset..offset + T::WIDTH]);
        Ok(())
    }

    /// Writes `value` at the cursor and advances it.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if a fixed view is too short.
    #[inline]
    pub fn write<T: Primitive>(&mut self, value: T) -> CursorResult<()> {
        self.write_at(self.cursor, value)?;
        self.cursor += T::WIDTH;
        Ok(())
    }

    /// Writes `value` at the cursor only if it differs from the shadow.
    ///
    /// Returns `Ok(true)` when the value was written (shadow updated, cursor
    /// advanced) and `Ok(false)` when it matched and nothing happened.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if a fixed view is too short.
    pub fn write_if_changed<T: Primitive>(&mut self, value: T) -> CursorResult<bool> {
        let offset = self.cursor;
        let bits = value.to_bits();
        if self.shadow_matches(offset, bits) {
            return Ok(false);
        }
        self.write(value)?;
        self.shadow[offset] = bits;
        self.shadow_present[offset / 64] |= 1 << (offset % 64);
        Ok(true)
    }

    #[inline]
    fn shadow_matches(&self, offset: usize, bits: u32) -> bool {
        let Some(word) = self.shadow_present.get(offset / 64) else {
            return false;
        };
        word & (1 << (offset % 64)) != 0 && self.shadow[offset] == bits
    }

    /// Reserves `T::WIDTH` bytes at the cursor and advances past them.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if a fixed view is too short.
    pub fn reserve<T: Primitive>(&mut self) -> CursorResult<Reserved<T>> {
        let offset = self.cursor;
        self.ensure(offset, T::WIDTH)?;
        self.cursor += T::WIDTH;
        Ok(Reserved {
            offset,
            _marker: PhantomData,
        })
    }

    /// Reads a value at `offset`. The cursor does not move.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::OutOfBounds`] past the end of the buffer.
    #[inline]
    pub fn read_at<T: Primitive>(&self, offset: usize) -> CursorResult<T> {
        read_from(&self.buffer, offset)
    }

    /// Writes a `u8` at the cursor.
    ///
    /// # Errors
    ///
    /// See [`CursorView::write`].
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> CursorResult<()> {
        self.write(value)
    }

    /// Writes a `u16` at the cursor.
    ///
    /// # Errors
    ///
    /// See [`CursorView::write`].
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> CursorResult<()> {
        self.write(value)
    }

    /// Writes a `u32` at the cursor.
    ///
    /// # Errors
    ///
    /// See [`CursorView::write`].
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> CursorResult<()> {
        self.write(value)
    }

    /// Writes an `f32` at the cursor.
    ///
    /// # Errors
    ///
    /// See [`CursorView::write`].
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> CursorResult<()> {
        self.write(value)
    }

    /// Reads a `u8` at `offset`.
    ///
    /// # Errors
    ///
    /// See [`CursorView::read_at`].
    #[inline]
    pub fn read_u8_at(&self, offset: usize) -> CursorResult<u8> {
        self.read_at(offset)
    }

    /// Reads a `u16` at `offset`.
    ///
    /// # Errors
    ///
    /// See [`CursorView::read_at`].
    #[inline]
    pub fn read_u16_at(&self, offset: usize) -> CursorResult<u16> {
        self.read_at(offset)
    }

    /// Reads a `u32` at `offset`.
    ///
    /// # Errors
    ///
    /// See [`CursorView::read_at`].
    #[inline]
    pub fn read_u32_at(&self, offset: usize) -> CursorResult<u32> {
        self.read_at(offset)
    }

    /// Reads an `f32` at `offset`.
    ///
    /// # Errors
    ///
    /// See [`CursorView::read_at`].
    #[inline]
    pub fn read_f32_at(&self, offset: usize) -> CursorResult<f32> {
        self.read_at(offset)
    }
}

#[inline]
fn read_from<T: Primitive>(bytes: &[u8], offset: usize) -> CursorResult<T> {
    let end = offset + T::WIDTH;
    if end > bytes.len() {
        return Err(CursorError::OutOfBounds {
            offset,
            width: T::WIDTH,
            len: bytes.len(),
        });
    }
    Ok(T::decode(&bytes[offset..end]))
}

/// Sequential reader over a transmitted slice.
#[derive(Debug, Clone)]
pub struct CursorReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> CursorReader<'a> {
    /// Starts reading `bytes` from offset 0.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    /// Reads the next value and advances.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::OutOfBounds`] when the slice is exhausted.
    pub fn read<T: Primitive>(&mut self) -> CursorResult<T> {
        let value = read_from(self.bytes, self.cursor)?;
        self.cursor += T::WIDTH;
        Ok(value)
    }
}

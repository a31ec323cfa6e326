// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A bounded, zero-copy reader over the module bytes.

use super::Error;

/// Position and end bound into a borrowed byte buffer.
///
/// Offsets reported by the cursor are always relative to the start of the
/// buffer it was created over, even when the end has been narrowed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            end: bytes.len(),
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub(crate) fn done(&self) -> bool {
        self.pos == self.end
    }

    // The whole underlying buffer, regardless of the current bound.
    pub(crate) fn buffer(&self) -> &'a [u8] {
        self.bytes
    }

    pub(crate) fn peek_byte(&self) -> Option<u8> {
        if self.done() {
            None
        } else {
            Some(self.bytes[self.pos])
        }
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, Error> {
        let byte = self.peek_byte().ok_or(Error::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_slice(N)?);
        Ok(array)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.read_slice(len).map(|_| ())
    }

    // Moves back to a previously observed offset.
    pub(crate) fn rewind(&mut self, offset: usize) {
        debug_assert!(offset <= self.pos);
        self.pos = offset;
    }

    // Jumps forward to an offset within the current bound.
    pub(crate) fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset < self.pos || offset > self.end {
            return Err(Error::UnexpectedEof);
        }
        self.pos = offset;
        Ok(())
    }

    // Narrows the end bound, returning the previous one so that it can be
    // restored with `set_end()`.
    pub(crate) fn limit(&mut self, len: usize) -> Result<usize, Error> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        let previous = self.end;
        self.end = self.pos + len;
        Ok(previous)
    }

    pub(crate) fn set_end(&mut self, end: usize) {
        debug_assert!(end >= self.pos && end <= self.bytes.len());
        self.end = end;
    }
}

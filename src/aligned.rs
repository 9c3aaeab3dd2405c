//! A page-sized, page-aligned scratch buffer.
//!
//! `O_DIRECT` I/O (used by [`crate::storage`]) requires that the buffer handed to
//! `read`/`write` be aligned to the filesystem's block size; 4096 is a safe
//! bet on every Linux filesystem this crate targets. Keeping the buffer
//! boxed avoids blowing the stack with a 4096-byte local on every call.

use std::ops::{Deref, DerefMut};

#[repr(C, align(4096))]
#[derive(Clone)]
pub struct Buffer {
    data: [u8; crate::PAGE_SIZE],
}

impl Buffer {
    pub fn new() -> Box<Buffer> {
        Box::new(Buffer::default())
    }

    #[cfg(test)]
    pub(crate) fn with_value(val: u8) -> Box<Buffer> {
        Box::new(Buffer {
            data: [val; crate::PAGE_SIZE],
        })
    }

    pub fn copy_from_slice(&mut self, slice: &[u8]) {
        self.data.copy_from_slice(slice);
    }
}

impl Default for Buffer {
    fn default() -> Buffer {
        Buffer {
            data: [0; crate::PAGE_SIZE],
        }
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

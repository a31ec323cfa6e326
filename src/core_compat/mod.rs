// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Allocator-aware containers, sourced from `core`/`alloc` on nightly and from
//! `allocator-api2` otherwise.
//!
//! Everything the decoder retains lives in one of these containers, so that a
//! caller-provided allocator governs the whole decoded module.

// The `nightly` cfg value is set by the crate's build script.

#[cfg(nightly)]
pub use ::alloc::{alloc::Global, boxed::Box, collections::TryReserveError, vec::Vec};
#[cfg(nightly)]
pub use core::alloc::{AllocError, Allocator};

#[cfg(not(nightly))]
pub use allocator_api2::{
    alloc::{AllocError, Allocator, Global},
    boxed::Box,
    collections::TryReserveError,
    vec::Vec,
};

/// Copies `bytes` into a freshly allocated boxed slice.
pub(crate) fn boxed_slice_in<A: Allocator>(
    bytes: &[u8],
    alloc: A,
) -> Result<Box<[u8], A>, TryReserveError> {
    let mut buf = Vec::new_in(alloc);
    buf.try_reserve_exact(bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(buf.into_boxed_slice())
}

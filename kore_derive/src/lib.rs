//! Derive macros for the kore virtual machine.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - `Encode`/`Decode` impls used by the module file format
//! - `#[derive(Error)]` - `Display` and `std::error::Error` for error enums

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` (from `crate::types::encoding`) field by
/// field for structs.
#[proc_macro_derive(BinaryCodec, attributes(binary_codec))]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` from per-variant `#[error("...")]` messages.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}

//! Serialization primitives shared by the module file format.

pub mod encoding;

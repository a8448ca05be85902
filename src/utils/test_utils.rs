//! Test utilities for building modules without the assembler.

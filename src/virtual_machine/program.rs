//! Loadable modules and their persisted binary format.
//!
//! A [`Module`] bundles the compiled functions of one program with its five
//! typed [`ConstantTable`]s and the number of global slots. It is produced
//! once (by the assembler or any other code generator) and only read by the
//! interpreter.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::virtual_machine::compiled::CompiledObject;
use crate::virtual_machine::errors::VMError;
use kore_derive::BinaryCodec;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::Path;

/// Magic bytes identifying a serialized module.
pub const MAGIC: &[u8; 5] = b"KORBC";

/// Current module format version.
const CURRENT_VERSION: Version = Version::new(0, 1, 0);

/// Largest number of entries a table indexed by a 16-bit operand can hold.
const MAX_TABLE_LEN: usize = u16::MAX as usize + 1;

/// Semantic version for module format compatibility.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Types that can live in a constant table.
///
/// `Key` decides when two constants are the same entry; floats are keyed by
/// bit pattern so `-0.0`, `0.0` and each NaN payload stay distinct.
pub trait ConstantKey: Clone + Debug {
    type Key: Eq + Hash + Clone + Debug;
    /// Table name used in diagnostics.
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;
}

macro_rules! impl_constant_key {
    ($($t:ty => $key:ty, $table:literal, |$v:ident| $expr:expr);* $(;)?) => {
        $(
            impl ConstantKey for $t {
                type Key = $key;
                const TABLE: &'static str = $table;

                fn key(&self) -> Self::Key {
                    let $v = self;
                    $expr
                }
            }
        )*
    };
}

impl_constant_key! {
    i32 => i32, "i32", |v| *v;
    i64 => i64, "i64", |v| *v;
    f32 => u32, "f32", |v| v.to_bits();
    f64 => u64, "f64", |v| v.to_bits();
    String => String, "string", |v| v.clone();
}

/// Append-only pool of distinct constants, indexed by position.
#[derive(Clone, Debug)]
pub struct ConstantTable<T: ConstantKey> {
    values: Vec<T>,
    positions: HashMap<T::Key, u16>,
}

impl<T: ConstantKey> Default for ConstantTable<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T: ConstantKey> ConstantTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value` and returns its index; a repeated value reuses the
    /// existing entry.
    pub fn add(&mut self, value: T) -> Result<u16, VMError> {
        let key = value.key();
        if let Some(index) = self.positions.get(&key) {
            return Ok(*index);
        }
        if self.values.len() >= MAX_TABLE_LEN {
            return Err(VMError::EncodingError {
                mnemonic: "LOAD_CONST",
                reason: format!("{} constant table is full ({MAX_TABLE_LEN} entries)", T::TABLE),
            });
        }
        let index = self.values.len() as u16;
        self.values.push(value);
        self.positions.insert(key, index);
        Ok(index)
    }

    pub fn get(&self, index: u16) -> Option<&T> {
        self.values.get(index as usize)
    }

    /// Like [`get`](Self::get) but reports a missing entry as
    /// [`VMError::InvalidConstant`].
    pub fn fetch(&self, index: u16) -> Result<&T, VMError> {
        self.get(index).ok_or(VMError::InvalidConstant {
            table: T::TABLE,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }
}

impl<T: ConstantKey + Encode> Encode for ConstantTable<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.values.encode(out);
    }
}

impl<T: ConstantKey + Decode> Decode for ConstantTable<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let values = Vec::<T>::decode(input)?;
        if values.len() > MAX_TABLE_LEN {
            return Err(DecodeError::LengthOverflow);
        }
        let mut positions = HashMap::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            positions.entry(value.key()).or_insert(index as u16);
        }
        Ok(Self { values, positions })
    }
}

/// A complete loadable program.
#[derive(Clone, Debug, Default, BinaryCodec)]
pub struct Module {
    functions: Vec<CompiledObject>,
    pub i32_constants: ConstantTable<i32>,
    pub i64_constants: ConstantTable<i64>,
    pub f32_constants: ConstantTable<f32>,
    pub f64_constants: ConstantTable<f64>,
    pub strings: ConstantTable<String>,
    global_count: u16,
    entry: u16,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a function and returns its index.
    pub fn add_function(&mut self, function: CompiledObject) -> Result<u16, VMError> {
        if self.functions.len() >= MAX_TABLE_LEN {
            return Err(VMError::EncodingError {
                mnemonic: "LOAD_FUNCTION",
                reason: format!("a module holds at most {MAX_TABLE_LEN} functions"),
            });
        }
        self.functions.push(function);
        Ok((self.functions.len() - 1) as u16)
    }

    pub fn function(&self, index: u16) -> Option<&CompiledObject> {
        self.functions.get(index as usize)
    }

    pub fn functions(&self) -> &[CompiledObject] {
        &self.functions
    }

    /// Index of the first function named `name`.
    pub fn function_index(&self, name: &str) -> Option<u16> {
        self.functions
            .iter()
            .position(|f| f.name() == name)
            .map(|i| i as u16)
    }

    pub fn global_count(&self) -> u16 {
        self.global_count
    }

    pub fn set_global_count(&mut self, count: u16) {
        self.global_count = count;
    }

    pub fn entry(&self) -> u16 {
        self.entry
    }

    pub fn set_entry(&mut self, index: u16) {
        self.entry = index;
    }

    /// The function `run` starts in.
    pub fn entry_function(&self) -> Result<&CompiledObject, VMError> {
        if self.functions.is_empty() {
            return Err(VMError::MissingFunction);
        }
        self.function(self.entry)
            .ok_or(VMError::InvalidFunction { index: self.entry })
    }

    /// True if `bytes` starts with the module magic.
    pub fn is_module_bytes(bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC)
    }

    /// Serializes the module to its portable binary format.
    ///
    /// The output starts with a magic header and version for compatibility
    /// checking; instructions are stored as raw little-endian words.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Deserializes a module, validating magic, version and entry index.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        if input.len() < MAGIC.len() {
            return Err(VMError::DecodeError {
                reason: "truncated".to_string(),
            });
        }

        if &<[u8; 5]>::decode(&mut input)? != MAGIC {
            return Err(VMError::DecodeError {
                reason: "bad magic".to_string(),
            });
        }

        if Version::decode(&mut input)? != CURRENT_VERSION {
            return Err(VMError::DecodeError {
                reason: "unsupported version".to_string(),
            });
        }

        let module = Module::decode(&mut input)?;
        if !input.is_empty() {
            return Err(VMError::DecodeError {
                reason: "trailing bytes".to_string(),
            });
        }
        if !module.functions.is_empty() && module.entry as usize >= module.functions.len() {
            return Err(VMError::DecodeError {
                reason: format!("entry function {} does not exist", module.entry),
            });
        }
        Ok(module)
    }

    /// Reads and decodes a module file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, VMError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Writes the encoded module to `path`.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), VMError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

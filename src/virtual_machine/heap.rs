//! Heap-resident arrays with manual reference counting.
//!
//! Arrays live in a slot arena indexed by [`ArrayRef`]. Each slot carries a
//! generation counter that is bumped on deallocation, so stale handles are
//! rejected with [`VMError::HeapInvariantViolation`].
//!
//! Refcounts only change through [`Heap::ref_inc`] / [`Heap::ref_dec`] (the
//! `REF_INC` / `REF_DEC` opcodes). Storing an array into another array does
//! not count as a reference by itself; producers emit `REF_INC` for that, and
//! freeing the parent leaves its children alone. There is no cycle collector,
//! so arrays that reference each other leak.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::{ArrayRef, Value};
use std::collections::HashSet;

/// Default bound on the number of live element slots across all arrays.
pub const DEFAULT_HEAP_LIMIT: usize = 16 * 1024 * 1024;

/// Bookkeeping shared by every heap object.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeapHeader {
    pub refcount: u32,
}

/// A heap array: header plus its elements.
#[derive(Clone, Debug)]
pub struct ArrayValue {
    pub header: HeapHeader,
    pub elements: Vec<Value>,
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug)]
struct HeapSlot {
    generation: u32,
    array: Option<ArrayValue>,
}

/// Owner of every array allocated by one interpreter.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<HeapSlot>,
    free_slots: Vec<u32>,
    live_elements: usize,
    limit: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_LIMIT)
    }
}

impl Heap {
    /// Creates an empty heap holding at most `limit` live elements.
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            live_elements: 0,
            limit,
        }
    }

    /// Allocates `size` elements initialized to `I32(0)`, with refcount 1.
    pub fn allocate_array(&mut self, size: usize) -> Result<Value, VMError> {
        self.allocate_array_filled(size, Value::default())
    }

    /// Allocates `size` copies of `fill`, with refcount 1.
    pub fn allocate_array_filled(&mut self, size: usize, fill: Value) -> Result<Value, VMError> {
        let out_of_memory = VMError::OutOfMemory { requested: size };
        let total = self
            .live_elements
            .checked_add(size)
            .ok_or(out_of_memory.clone())?;
        if total > self.limit {
            return Err(out_of_memory);
        }

        let mut elements = Vec::new();
        elements
            .try_reserve_exact(size)
            .map_err(|_| out_of_memory.clone())?;
        elements.resize(size, fill);

        let array = ArrayValue {
            header: HeapHeader { refcount: 1 },
            elements,
        };

        let handle = match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.array = Some(array);
                ArrayRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| out_of_memory)?;
                self.slots.push(HeapSlot {
                    generation: 0,
                    array: Some(array),
                });
                ArrayRef {
                    index,
                    generation: 0,
                }
            }
        };
        self.live_elements = total;
        Ok(Value::Array(handle))
    }

    /// Releases an array and its element storage.
    ///
    /// Fails if the handle is stale (double free) or if the array is still
    /// referenced and `ignore_refcount` is false. `ignore_refcount` is for
    /// function-local arrays the producer has proven not to escape.
    ///
    /// Child arrays held in the elements are left untouched; their refcounts
    /// only move through `REF_INC`/`REF_DEC`.
    pub fn deallocate_array(&mut self, handle: ArrayRef, ignore_refcount: bool) -> Result<(), VMError> {
        let array = self.get(handle).map_err(|_| VMError::HeapInvariantViolation {
            index: handle.index,
            reason: "double free",
        })?;
        if array.header.refcount > 0 && !ignore_refcount {
            return Err(VMError::HeapInvariantViolation {
                index: handle.index,
                reason: "free of an array that is still referenced",
            });
        }
        self.release(handle);
        Ok(())
    }

    fn release(&mut self, handle: ArrayRef) -> Option<ArrayValue> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let array = slot.array.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        self.live_elements -= array.elements.len();
        Some(array)
    }

    fn live_mut(&mut self, handle: ArrayRef) -> Option<&mut ArrayValue> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.array.as_mut()
    }

    /// Returns the array behind a live handle.
    pub fn get(&self, handle: ArrayRef) -> Result<&ArrayValue, VMError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.array.as_ref())
            .ok_or(VMError::HeapInvariantViolation {
                index: handle.index,
                reason: "use of a freed array",
            })
    }

    fn get_mut(&mut self, handle: ArrayRef) -> Result<&mut ArrayValue, VMError> {
        self.live_mut(handle).ok_or(VMError::HeapInvariantViolation {
            index: handle.index,
            reason: "use of a freed array",
        })
    }

    pub fn ref_inc(&mut self, handle: ArrayRef) -> Result<(), VMError> {
        let array = self.get_mut(handle)?;
        array.header.refcount = array
            .header
            .refcount
            .checked_add(1)
            .ok_or(VMError::HeapInvariantViolation {
                index: handle.index,
                reason: "refcount overflow",
            })?;
        Ok(())
    }

    /// Drops one reference. Reaching zero does not free the array; `FREE` does.
    pub fn ref_dec(&mut self, handle: ArrayRef) -> Result<(), VMError> {
        let array = self.get_mut(handle)?;
        array.header.refcount = array
            .header
            .refcount
            .checked_sub(1)
            .ok_or(VMError::HeapInvariantViolation {
                index: handle.index,
                reason: "refcount would drop below zero",
            })?;
        Ok(())
    }

    pub fn refcount(&self, handle: ArrayRef) -> Result<u32, VMError> {
        Ok(self.get(handle)?.header.refcount)
    }

    pub fn len(&self, handle: ArrayRef) -> Result<usize, VMError> {
        Ok(self.get(handle)?.len())
    }

    /// Bounds-checked element read.
    pub fn load(&self, handle: ArrayRef, index: i64) -> Result<Value, VMError> {
        let array = self.get(handle)?;
        let slot = checked_index(index, array.len())?;
        Ok(array.elements[slot])
    }

    /// Bounds-checked element write.
    pub fn store(&mut self, handle: ArrayRef, index: i64, value: Value) -> Result<(), VMError> {
        let array = self.get_mut(handle)?;
        let slot = checked_index(index, array.len())?;
        array.elements[slot] = value;
        Ok(())
    }

    /// Number of arrays not yet deallocated.
    pub fn live_arrays(&self) -> usize {
        self.slots.iter().filter(|slot| slot.array.is_some()).count()
    }

    /// Number of element slots held by live arrays.
    pub fn live_elements(&self) -> usize {
        self.live_elements
    }

    /// Structural, tag-sensitive equality.
    ///
    /// Arrays are equal when they have the same length and pairwise equal
    /// elements, whatever their heap identity. A pair already under comparison
    /// is assumed equal, so cyclic arrays terminate. A freed handle only equals
    /// itself.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        let mut in_progress = HashSet::new();
        self.values_equal_inner(a, b, &mut in_progress)
    }

    fn values_equal_inner(
        &self,
        a: &Value,
        b: &Value,
        in_progress: &mut HashSet<(ArrayRef, ArrayRef)>,
    ) -> bool {
        let (Value::Array(ra), Value::Array(rb)) = (a, b) else {
            return a.shallow_eq(b);
        };
        if ra == rb || !in_progress.insert((*ra, *rb)) {
            return true;
        }
        let (Ok(xa), Ok(xb)) = (self.get(*ra), self.get(*rb)) else {
            return false;
        };
        xa.len() == xb.len()
            && xa
                .elements
                .iter()
                .zip(&xb.elements)
                .all(|(ea, eb)| self.values_equal_inner(ea, eb, in_progress))
    }

    /// Renders a value, printing array elements recursively (`[1, 2, 3]`).
    pub fn render(&self, value: &Value) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        self.render_into(value, &mut out, &mut path);
        out
    }

    fn render_into(&self, value: &Value, out: &mut String, path: &mut Vec<ArrayRef>) {
        let Value::Array(handle) = value else {
            out.push_str(&value.to_string());
            return;
        };
        if path.contains(handle) {
            out.push_str("[...]");
            return;
        }
        let Ok(array) = self.get(*handle) else {
            out.push_str(&format!("<freed array #{}>", handle.index));
            return;
        };
        path.push(*handle);
        out.push('[');
        for (i, element) in array.elements.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render_into(element, out, path);
        }
        out.push(']');
        path.pop();
    }
}

fn checked_index(index: i64, len: usize) -> Result<usize, VMError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(VMError::IndexOutOfRange { index, len })
}

//! Built-in functions callable through `LOAD_NATIVE` + `CALL`.

use super::registers::Registers;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::heap::Heap;
use crate::virtual_machine::value::{NativeFunction, Value};

/// Runs `native` with arguments read from registers `first ..`.
pub(super) fn invoke(
    native: NativeFunction,
    registers: &Registers,
    heap: &Heap,
    first: u8,
) -> Result<Value, VMError> {
    let name = native.name();
    match native {
        NativeFunction::Len => {
            let array = registers.get_array(first, name)?;
            Ok(Value::I32(heap.len(array)? as i32))
        }
        NativeFunction::Sqrt => {
            let v = registers.get_typed::<f64>(first, name)?;
            Ok(Value::F64(v.sqrt()))
        }
        NativeFunction::Print => {
            let v = registers.get(first);
            println!("{}", heap.render(&v));
            Ok(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_of_array() {
        let mut heap = Heap::default();
        let mut regs = Registers::new();
        let arr = heap.allocate_array(5).unwrap();
        regs.set(3, arr);
        let out = invoke(NativeFunction::Len, &regs, &heap, 3).unwrap();
        assert_eq!(out.as_i32(), Some(5));
    }

    #[test]
    fn sqrt_requires_f64() {
        let heap = Heap::default();
        let mut regs = Registers::new();
        regs.set(0, Value::from_f64(9.0));
        assert_eq!(
            invoke(NativeFunction::Sqrt, &regs, &heap, 0).unwrap().as_f64(),
            Some(3.0)
        );
        regs.set(0, Value::from_i32(9));
        assert!(matches!(
            invoke(NativeFunction::Sqrt, &regs, &heap, 0),
            Err(VMError::TypeMismatch {
                instruction: "sqrt",
                ..
            })
        ));
    }
}

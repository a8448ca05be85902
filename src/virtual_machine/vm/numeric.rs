//! Generic arithmetic and comparison over the four numeric types.
//!
//! Every typed opcode is classified by [`Opcode::numeric_class`] into an
//! operation and a type; [`Numeric`] supplies the per-type semantics so the
//! dispatch loop needs a single handler.
//!
//! [`Opcode::numeric_class`]: crate::virtual_machine::isa::Opcode::numeric_class

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::NumericOp;
use crate::virtual_machine::value::Value;

pub(super) trait Numeric: Copy + PartialOrd {
    const TYPE_NAME: &'static str;

    fn from_value(value: Value) -> Option<Self>;
    fn into_value(self) -> Value;
    /// Applies a binary arithmetic operation.
    fn arith(op: NumericOp, a: Self, b: Self) -> Result<Self, VMError>;
    fn negate(self) -> Self;
}

/// Evaluates a comparison operation.
pub(super) fn compare<T: Numeric>(op: NumericOp, a: T, b: T) -> bool {
    match op {
        NumericOp::Lt => a < b,
        NumericOp::Le => a <= b,
        NumericOp::Gt => a > b,
        NumericOp::Ge => a >= b,
        NumericOp::Eq => a == b,
        _ => a != b,
    }
}

macro_rules! impl_int_numeric {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl Numeric for $t {
                const TYPE_NAME: &'static str = stringify!($variant);

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn arith(op: NumericOp, a: Self, b: Self) -> Result<Self, VMError> {
                    Ok(match op {
                        NumericOp::Add => a.wrapping_add(b),
                        NumericOp::Sub => a.wrapping_sub(b),
                        NumericOp::Mult => a.wrapping_mul(b),
                        NumericOp::Div => {
                            if b == 0 {
                                return Err(VMError::DivisionByZero);
                            }
                            a.wrapping_div(b)
                        }
                        NumericOp::Pow => {
                            if b >= 0 {
                                let mut result: $t = 1;
                                let mut base = a;
                                let mut exp = b as u64;
                                while exp > 0 {
                                    if exp & 1 == 1 {
                                        result = result.wrapping_mul(base);
                                    }
                                    base = base.wrapping_mul(base);
                                    exp >>= 1;
                                }
                                result
                            } else {
                                // a^-n == 1 / a^n under truncating division
                                match a {
                                    0 => return Err(VMError::DivisionByZero),
                                    1 => 1,
                                    -1 => if b % 2 == 0 { 1 } else { -1 },
                                    _ => 0,
                                }
                            }
                        }
                        _ => a.wrapping_neg(),
                    })
                }

                fn negate(self) -> Self {
                    self.wrapping_neg()
                }
            }
        )*
    };
}

macro_rules! impl_float_numeric {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl Numeric for $t {
                const TYPE_NAME: &'static str = stringify!($variant);

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn arith(op: NumericOp, a: Self, b: Self) -> Result<Self, VMError> {
                    Ok(match op {
                        NumericOp::Add => a + b,
                        NumericOp::Sub => a - b,
                        NumericOp::Mult => a * b,
                        NumericOp::Div => a / b,
                        NumericOp::Pow => a.powf(b),
                        _ => -a,
                    })
                }

                fn negate(self) -> Self {
                    -self
                }
            }
        )*
    };
}

impl_int_numeric!(i32 => I32, i64 => I64);
impl_float_numeric!(f32 => F32, f64 => F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(i32::arith(NumericOp::Add, i32::MAX, 1).unwrap(), i32::MIN);
        assert_eq!(i64::arith(NumericOp::Mult, i64::MAX, 2).unwrap(), -2);
        assert_eq!(i32::arith(NumericOp::Div, i32::MIN, -1).unwrap(), i32::MIN);
        assert_eq!(i32::MIN.negate(), i32::MIN);
    }

    #[test]
    fn each_operation_uses_its_own_operator() {
        assert_eq!(i32::arith(NumericOp::Add, 7, 3).unwrap(), 10);
        assert_eq!(i32::arith(NumericOp::Sub, 7, 3).unwrap(), 4);
        assert_eq!(i32::arith(NumericOp::Mult, 7, 3).unwrap(), 21);
        assert_eq!(i32::arith(NumericOp::Div, 7, 3).unwrap(), 2);
        assert_eq!(i32::arith(NumericOp::Pow, 7, 3).unwrap(), 343);
        assert_eq!(f64::arith(NumericOp::Sub, 1.5, 0.5).unwrap(), 1.0);
        assert_eq!(f32::arith(NumericOp::Div, 1.0, 4.0).unwrap(), 0.25);
    }

    #[test]
    fn integer_division_by_zero_faults() {
        assert!(matches!(
            i64::arith(NumericOp::Div, 1, 0),
            Err(VMError::DivisionByZero)
        ));
    }

    #[test]
    fn negative_integer_exponents_truncate() {
        assert_eq!(i32::arith(NumericOp::Pow, 2, -1).unwrap(), 0);
        assert_eq!(i32::arith(NumericOp::Pow, 1, -5).unwrap(), 1);
        assert_eq!(i32::arith(NumericOp::Pow, -1, -3).unwrap(), -1);
        assert_eq!(i64::arith(NumericOp::Pow, -1, -4).unwrap(), 1);
        assert!(matches!(
            i32::arith(NumericOp::Pow, 0, -2),
            Err(VMError::DivisionByZero)
        ));
    }

    #[test]
    fn large_exponents_wrap() {
        assert_eq!(i64::arith(NumericOp::Pow, -1, i64::MAX).unwrap(), -1);
        assert_eq!(i32::arith(NumericOp::Pow, 2, 32).unwrap(), 0);
        assert_eq!(i32::arith(NumericOp::Pow, 5, 0).unwrap(), 1);
    }

    #[test]
    fn float_semantics_are_ieee() {
        assert_eq!(f64::arith(NumericOp::Div, 1.0, 0.0).unwrap(), f64::INFINITY);
        assert!(f64::arith(NumericOp::Div, 0.0, 0.0).unwrap().is_nan());
        assert_eq!(f64::arith(NumericOp::Pow, 2.0, 0.5).unwrap(), 2f64.sqrt());
        assert!(!compare(NumericOp::Eq, f32::NAN, f32::NAN));
        assert!(compare(NumericOp::Neq, f64::NAN, f64::NAN));
    }

    #[test]
    fn comparisons() {
        assert!(compare(NumericOp::Lt, 1, 2));
        assert!(compare(NumericOp::Le, 2, 2));
        assert!(!compare(NumericOp::Gt, 2i64, 2));
        assert!(compare(NumericOp::Ge, 3.0f32, 2.5));
    }

    #[test]
    fn tags_are_checked() {
        assert_eq!(i32::from_value(Value::from_i32(4)), Some(4));
        assert_eq!(i32::from_value(Value::from_i64(4)), None);
        assert_eq!(f64::from_value(Value::from_f32(1.0)), None);
        assert_eq!(<f32 as Numeric>::TYPE_NAME, "F32");
    }
}

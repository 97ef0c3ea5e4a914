//! Compile-time constant values.
//!
//! [`ConstValue`] is the payload of constant expression nodes. Integers are
//! arbitrary precision so folding never overflows silently; wrapping to a
//! destination width is an explicit step ([`ConstValue::wrap_to_type`]) that
//! the typed operations apply.
//!
//! ## Failure semantics
//!
//! - Operations on operands of different variants are a contract violation
//!   (earlier stages convert operands to a common type) and panic.
//! - Shift counts above `0xFFFF` and integer division by zero do not fold:
//!   the operation returns `None` and the caller keeps the operator node.
//! - [`ConstValue::check_bounds`] never fails; it answers whether the value
//!   is representable and leaves reporting to the caller.

use std::fmt;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

use crate::operator::Operator;
use crate::types::{TypeId, TypeKind, TypeTable};

/// Largest accepted shift count.
pub const MAX_SHIFT: u32 = 0xFFFF;

/// A typed compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Integer(BigInt),
    Float(f32),
    Double(f64),
    String(String),
    /// UTF-16 code unit.
    Char(u16),
    Boolean(bool),
    /// Members of a tuple, struct or fixed array, in declaration order.
    Structured(Vec<ConstValue>),
    /// Untyped all-bits-zero value, concretized once its type is known.
    Zero,
    Null,
}

/// The variant of a [`ConstValue`] a type's constants use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstKind {
    Integer,
    Float,
    Double,
    String,
    Char,
    Boolean,
    Structured,
    Zero,
    Null,
}

impl ConstKind {
    /// The constant variant used for values of `ty`.
    pub fn of_type(ty: TypeId, types: &TypeTable) -> Option<ConstKind> {
        Some(match types.kind(types.non_ref(ty)) {
            TypeKind::Integer { .. } | TypeKind::Enum { .. } | TypeKind::Pointer { .. } => {
                ConstKind::Integer
            }
            TypeKind::Float { size: 4 } => ConstKind::Float,
            TypeKind::Float { .. } => ConstKind::Double,
            TypeKind::Char => ConstKind::Char,
            TypeKind::Boolean => ConstKind::Boolean,
            TypeKind::String => ConstKind::String,
            TypeKind::Tuple { .. }
            | TypeKind::Struct { class: false, .. }
            | TypeKind::FixedArray { .. } => ConstKind::Structured,
            TypeKind::Null
            | TypeKind::Object
            | TypeKind::RefArray { .. }
            | TypeKind::Struct { class: true, .. } => ConstKind::Null,
            TypeKind::Void | TypeKind::Auto | TypeKind::Function { .. } | TypeKind::Reference { .. } => {
                return None;
            }
        })
    }
}

/// Types of the members of a structured type, in order.
pub fn member_types(ty: TypeId, types: &TypeTable) -> Option<Vec<TypeId>> {
    match types.kind(types.non_ref(ty)) {
        TypeKind::Tuple { members } => Some(members.iter().map(|m| m.ty).collect()),
        TypeKind::Struct {
            fields,
            class: false,
            ..
        } => Some(fields.clone()),
        TypeKind::FixedArray { element, lengths } => {
            let count: usize = lengths.iter().map(|&l| l as usize).product();
            Some(vec![*element; count])
        }
        _ => None,
    }
}

impl ConstValue {
    #[inline]
    pub fn integer(value: impl Into<BigInt>) -> Self {
        ConstValue::Integer(value.into())
    }

    pub fn kind(&self) -> ConstKind {
        match self {
            ConstValue::Integer(_) => ConstKind::Integer,
            ConstValue::Float(_) => ConstKind::Float,
            ConstValue::Double(_) => ConstKind::Double,
            ConstValue::String(_) => ConstKind::String,
            ConstValue::Char(_) => ConstKind::Char,
            ConstValue::Boolean(_) => ConstKind::Boolean,
            ConstValue::Structured(_) => ConstKind::Structured,
            ConstValue::Zero => ConstKind::Zero,
            ConstValue::Null => ConstKind::Null,
        }
    }

    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            ConstValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as a double, for the number variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Integer(v) => v.to_f64(),
            ConstValue::Float(v) => Some(f64::from(*v)),
            ConstValue::Double(v) => Some(*v),
            ConstValue::Char(v) => Some(f64::from(*v)),
            ConstValue::Zero => Some(0.0),
            _ => None,
        }
    }

    /// Semantic equality: same variant and same value.
    #[inline]
    pub fn is_equal(&self, other: &ConstValue) -> bool {
        self == other
    }

    /// Whether every scalar in the value is the number zero.
    pub fn is_zero_number(&self) -> bool {
        match self {
            ConstValue::Integer(v) => v.is_zero(),
            ConstValue::Float(v) => *v == 0.0,
            ConstValue::Double(v) => *v == 0.0,
            ConstValue::Char(v) => *v == 0,
            ConstValue::Zero => true,
            ConstValue::Structured(members) => members.iter().all(ConstValue::is_zero_number),
            _ => false,
        }
    }

    /// Whether every scalar in the value is the number one.
    pub fn is_one_number(&self) -> bool {
        match self {
            ConstValue::Integer(v) => v.is_one(),
            ConstValue::Float(v) => *v == 1.0,
            ConstValue::Double(v) => *v == 1.0,
            ConstValue::Char(v) => *v == 1,
            ConstValue::Structured(members) => {
                !members.is_empty() && members.iter().all(ConstValue::is_one_number)
            }
            _ => false,
        }
    }

    /// Whether the value is a negative integer or floating point number.
    pub fn is_negative_number(&self) -> bool {
        match self {
            ConstValue::Integer(v) => v.is_negative(),
            ConstValue::Float(v) => *v < 0.0,
            ConstValue::Double(v) => *v < 0.0,
            _ => false,
        }
    }

    /// Member `index` of a structured value. `Zero` has zero members of any index.
    pub fn get_member(&self, index: usize) -> Option<ConstValue> {
        match self {
            ConstValue::Structured(members) => members.get(index).cloned(),
            ConstValue::Zero => Some(ConstValue::Zero),
            _ => None,
        }
    }

    /// A structured value of `count` copies of this value.
    pub fn create_structure(&self, count: usize) -> ConstValue {
        ConstValue::Structured(vec![self.clone(); count])
    }

    /// The concrete zero of `ty`.
    pub fn zero_of_type(ty: TypeId, types: &TypeTable) -> Option<ConstValue> {
        let ty = types.non_ref(ty);
        Some(match types.kind(ty) {
            TypeKind::Integer { .. } | TypeKind::Enum { .. } => ConstValue::integer(0),
            TypeKind::Float { size: 4 } => ConstValue::Float(0.0),
            TypeKind::Float { .. } => ConstValue::Double(0.0),
            TypeKind::Boolean => ConstValue::Boolean(false),
            TypeKind::Char => ConstValue::Char(0),
            TypeKind::Pointer { .. } => ConstValue::Null,
            _ if types.is_reference_type(ty) || types.is_null(ty) => ConstValue::Null,
            _ => match member_types(ty, types) {
                Some(members) => ConstValue::Structured(
                    members
                        .into_iter()
                        .map(|m| ConstValue::zero_of_type(m, types))
                        .collect::<Option<Vec<_>>>()?,
                ),
                None => return None,
            },
        })
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Apply `op` to this value and `src` (`None` for unary operators).
    ///
    /// # Panics
    ///
    /// Panics if the operands are of different variants or the operator is
    /// not defined for the variant.
    pub fn do_operation(&self, src: Option<&ConstValue>, op: Operator) -> Option<ConstValue> {
        match self {
            ConstValue::Integer(value) => integer_operation(value, src, op),
            ConstValue::Double(value) => {
                let rhs = || match src {
                    Some(ConstValue::Double(v)) => *v,
                    other => mismatch(op, self, other),
                };
                float_operation(*value, rhs, op, ConstValue::Double)
            }
            ConstValue::Float(value) => {
                let rhs = || match src {
                    Some(ConstValue::Float(v)) => *v,
                    other => mismatch(op, self, other),
                };
                float_operation(*value, rhs, op, ConstValue::Float)
            }
            ConstValue::String(value) => {
                let rhs = match src {
                    Some(ConstValue::String(v)) => v,
                    other => mismatch(op, self, other),
                };
                Some(match op {
                    Operator::Add => ConstValue::String(format!("{value}{rhs}")),
                    Operator::Equality => ConstValue::Boolean(value == rhs),
                    Operator::Inequality => ConstValue::Boolean(value != rhs),
                    _ => unsupported(op, self),
                })
            }
            ConstValue::Char(value) => char_operation(*value, src, op),
            ConstValue::Boolean(value) => {
                if op == Operator::Not {
                    return Some(ConstValue::Boolean(!value));
                }
                let rhs = match src {
                    Some(ConstValue::Boolean(v)) => *v,
                    other => mismatch(op, self, other),
                };
                Some(ConstValue::Boolean(match op {
                    Operator::Equality => *value == rhs,
                    Operator::Inequality => *value != rhs,
                    Operator::And => *value && rhs,
                    Operator::Or => *value || rhs,
                    _ => unsupported(op, self),
                }))
            }
            ConstValue::Structured(members) => {
                if matches!(
                    op,
                    Operator::UnaryPlus | Operator::Negation | Operator::Complement
                ) {
                    return members
                        .iter()
                        .map(|m| m.do_operation(None, op))
                        .collect::<Option<Vec<_>>>()
                        .map(ConstValue::Structured);
                }

                let broadcast;
                let rhs = match src {
                    Some(ConstValue::Structured(rhs)) if rhs.len() != members.len() => return None,
                    Some(ConstValue::Structured(rhs)) => rhs,
                    Some(scalar) => {
                        broadcast = vec![scalar.clone(); members.len()];
                        &broadcast
                    }
                    None => unsupported(op, self),
                };
                members
                    .iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| a.do_operation(Some(b), op))
                    .collect::<Option<Vec<_>>>()
                    .map(ConstValue::Structured)
            }
            ConstValue::Zero | ConstValue::Null => unsupported(op, self),
        }
    }

    /// Apply `op` producing a value of type `ty`: integer results are wrapped
    /// to the width of `ty`, structured operands work member-wise using the
    /// member types of `ty`.
    pub fn do_operation_typed(
        &self,
        src: Option<&ConstValue>,
        op: Operator,
        ty: TypeId,
        types: &TypeTable,
    ) -> Option<ConstValue> {
        if let ConstValue::Structured(members) = self {
            let Some(member_tys) = member_types(ty, types) else {
                return self.do_operation(src, op);
            };
            assert_eq!(
                member_tys.len(),
                members.len(),
                "structured constant does not match its type"
            );

            let broadcast;
            let rhs: Option<&[ConstValue]> = match src {
                Some(ConstValue::Structured(rhs)) if rhs.len() != members.len() => return None,
                Some(ConstValue::Structured(rhs)) => Some(rhs),
                Some(scalar) => {
                    broadcast = vec![scalar.clone(); members.len()];
                    Some(&broadcast)
                }
                None => None,
            };

            return members
                .iter()
                .enumerate()
                .map(|(i, m)| m.do_operation_typed(rhs.and_then(|r| r.get(i)), op, member_tys[i], types))
                .collect::<Option<Vec<_>>>()
                .map(ConstValue::Structured);
        }

        let result = self.do_operation(src, op)?;
        Some(match result {
            ConstValue::Integer(_) => result.wrap_to_type(ty, types),
            other => other,
        })
    }

    /// Wrap integer members to the bit width of `ty` (two's complement).
    pub fn wrap_to_type(&self, ty: TypeId, types: &TypeTable) -> ConstValue {
        match self {
            ConstValue::Integer(value) => match types.kind(types.underlying(types.non_ref(ty))) {
                TypeKind::Integer { size, signed } => {
                    ConstValue::Integer(wrap_integer(value, u32::from(*size) * 8, *signed))
                }
                TypeKind::Char => ConstValue::Integer(wrap_integer(value, 16, false)),
                _ => self.clone(),
            },
            ConstValue::Structured(members) => match member_types(ty, types) {
                Some(member_tys) if member_tys.len() == members.len() => ConstValue::Structured(
                    members
                        .iter()
                        .zip(member_tys)
                        .map(|(m, t)| m.wrap_to_type(t, types))
                        .collect(),
                ),
                _ => self.clone(),
            },
            other => other.clone(),
        }
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    /// Convert to another scalar variant. `None` if the pair is unsupported
    /// or the value does not survive the conversion (e.g. integer to char
    /// outside `0..=0xFFFF`).
    pub fn convert(&self, to: ConstKind) -> Option<ConstValue> {
        match (self, to) {
            (ConstValue::Zero, _) => Some(ConstValue::Zero),
            (ConstValue::Null, ConstKind::Null) => Some(ConstValue::Null),

            (ConstValue::Integer(v), ConstKind::Integer) => Some(ConstValue::Integer(v.clone())),
            (ConstValue::Integer(v), ConstKind::Double) => v.to_f64().map(ConstValue::Double),
            (ConstValue::Integer(v), ConstKind::Float) => v.to_f32().map(ConstValue::Float),
            (ConstValue::Integer(v), ConstKind::String) => Some(ConstValue::String(v.to_string())),
            (ConstValue::Integer(v), ConstKind::Char) => v.to_u16().map(ConstValue::Char),

            (ConstValue::Double(v), ConstKind::Double) => Some(ConstValue::Double(*v)),
            (ConstValue::Double(v), ConstKind::Float) => Some(ConstValue::Float(*v as f32)),
            (ConstValue::Double(v), ConstKind::Integer) => {
                BigInt::from_f64(v.trunc()).map(ConstValue::Integer)
            }
            (ConstValue::Double(v), ConstKind::String) => Some(ConstValue::String(v.to_string())),

            (ConstValue::Float(v), ConstKind::Float) => Some(ConstValue::Float(*v)),
            (ConstValue::Float(v), ConstKind::Double) => Some(ConstValue::Double(f64::from(*v))),
            (ConstValue::Float(v), ConstKind::Integer) => {
                BigInt::from_f32(v.trunc()).map(ConstValue::Integer)
            }
            (ConstValue::Float(v), ConstKind::String) => Some(ConstValue::String(v.to_string())),

            (ConstValue::String(v), ConstKind::String) => Some(ConstValue::String(v.clone())),

            (ConstValue::Char(v), ConstKind::Integer) => Some(ConstValue::integer(*v)),
            (ConstValue::Char(v), ConstKind::Char) => Some(ConstValue::Char(*v)),
            (ConstValue::Char(v), ConstKind::String) => {
                Some(ConstValue::String(String::from_utf16_lossy(&[*v])))
            }

            (ConstValue::Boolean(v), ConstKind::Boolean) => Some(ConstValue::Boolean(*v)),
            (ConstValue::Boolean(v), ConstKind::String) => Some(ConstValue::String(v.to_string())),

            (ConstValue::Structured(v), ConstKind::Structured) => {
                Some(ConstValue::Structured(v.clone()))
            }
            _ => None,
        }
    }

    /// Convert to the constant representation of `ty`.
    pub fn convert_to_type(&self, ty: TypeId, types: &TypeTable) -> Option<ConstValue> {
        let ty = types.non_ref(ty);
        match self {
            ConstValue::Zero => Some(ConstValue::Zero),
            ConstValue::Null => {
                let accepts = types.is_reference_type(ty) || types.is_pointer(ty) || types.is_null(ty);
                accepts.then_some(ConstValue::Null)
            }
            ConstValue::Structured(members) => {
                let member_tys = member_types(ty, types)?;
                if member_tys.len() != members.len() {
                    return None;
                }
                members
                    .iter()
                    .zip(member_tys)
                    .map(|(m, t)| m.convert_to_type(t, types))
                    .collect::<Option<Vec<_>>>()
                    .map(ConstValue::Structured)
            }
            _ => self.convert(ConstKind::of_type(ty, types)?),
        }
    }

    /// Whether the value is representable in `ty`.
    pub fn check_bounds(&self, ty: TypeId, types: &TypeTable) -> bool {
        let ty = types.non_ref(ty);
        match self {
            ConstValue::Integer(value) => match types.kind(ty) {
                TypeKind::Integer { .. } | TypeKind::Char => types
                    .integer_bounds(ty)
                    .is_some_and(|(lo, hi)| lo <= *value && *value <= hi),
                TypeKind::Enum { underlying, .. } => self.check_bounds(*underlying, types),
                TypeKind::Pointer { .. } | TypeKind::Struct { class: true, .. } => true,
                _ => false,
            },
            ConstValue::Float(_) | ConstValue::Double(_) => types.is_float(ty),
            ConstValue::String(_) => types.is_string(ty),
            ConstValue::Char(_) => types.is_char(ty),
            ConstValue::Boolean(_) => types.is_boolean(ty),
            ConstValue::Zero => true,
            ConstValue::Null => {
                types.is_reference_type(ty) || types.is_pointer(ty) || types.is_null(ty)
            }
            ConstValue::Structured(members) => match types.kind(ty) {
                TypeKind::FixedArray { element, .. } => {
                    types.fixed_length(ty) == Some(members.len() as u64)
                        && members.iter().all(|m| m.check_bounds(*element, types))
                }
                TypeKind::Tuple { .. } | TypeKind::Struct { class: false, .. } => {
                    match member_types(ty, types) {
                        Some(member_tys) => {
                            member_tys.len() == members.len()
                                && members
                                    .iter()
                                    .zip(member_tys)
                                    .all(|(m, t)| m.check_bounds(t, types))
                        }
                        None => false,
                    }
                }
                _ => false,
            },
        }
    }

    // ========================================================================
    // Raw bytes
    // ========================================================================

    /// Little-endian raw bytes. Integers use their minimal two's complement
    /// form. `None` for strings, structured values, `Zero` and `Null`.
    pub fn to_byte_array(&self) -> Option<Vec<u8>> {
        match self {
            ConstValue::Integer(v) => Some(v.to_signed_bytes_le()),
            ConstValue::Double(v) => Some(v.to_le_bytes().to_vec()),
            ConstValue::Float(v) => Some(v.to_le_bytes().to_vec()),
            ConstValue::Char(v) => Some(v.to_le_bytes().to_vec()),
            ConstValue::Boolean(v) => Some(vec![u8::from(*v)]),
            _ => None,
        }
    }

    /// Bytes `offset..offset + size` of the value, extended to cover the
    /// window. Integers extend with their own sign so the window always holds
    /// the two's complement bit pattern; other variants extend with zeros.
    fn window(&self, offset: usize, size: usize) -> Option<[u8; 8]> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return None;
        }
        if matches!(self, ConstValue::Zero | ConstValue::Null) {
            return Some([0; 8]);
        }

        let bytes = self.to_byte_array()?;
        let negative = matches!(self, ConstValue::Integer(v) if v.is_negative());
        let fill = if negative { 0xFF } else { 0x00 };

        let mut out = [0u8; 8];
        for (i, slot) in out.iter_mut().enumerate().take(size) {
            *slot = bytes.get(offset + i).copied().unwrap_or(fill);
        }
        Some(out)
    }

    /// Reinterpret `size` bytes at `offset` as a signed integer.
    pub fn get_signed(&self, offset: usize, size: usize) -> Option<i64> {
        let w = self.window(offset, size)?;
        Some(match size {
            1 => i64::from(w[0] as i8),
            2 => i64::from(i16::from_le_bytes([w[0], w[1]])),
            4 => i64::from(i32::from_le_bytes([w[0], w[1], w[2], w[3]])),
            _ => i64::from_le_bytes(w),
        })
    }

    /// Reinterpret `size` bytes at `offset` as an unsigned integer.
    pub fn get_unsigned(&self, offset: usize, size: usize) -> Option<u64> {
        let w = self.window(offset, size)?;
        Some(match size {
            1 => u64::from(w[0]),
            2 => u64::from(u16::from_le_bytes([w[0], w[1]])),
            4 => u64::from(u32::from_le_bytes([w[0], w[1], w[2], w[3]])),
            _ => u64::from_le_bytes(w),
        })
    }
}

fn mismatch(op: Operator, lhs: &ConstValue, rhs: Option<&ConstValue>) -> ! {
    panic!("constant operation '{op}' on mismatched operands {lhs:?} and {rhs:?}")
}

fn unsupported(op: Operator, value: &ConstValue) -> ! {
    panic!("constant operation '{op}' is not defined for {value:?}")
}

/// Reduce `value` modulo `2^bits` into the signed or unsigned range.
pub fn wrap_integer(value: &BigInt, bits: u32, signed: bool) -> BigInt {
    let modulus = BigInt::one() << bits;
    let mut wrapped = value % &modulus;
    if wrapped.is_negative() {
        wrapped += &modulus;
    }
    if signed && wrapped >= (BigInt::one() << (bits - 1)) {
        wrapped -= modulus;
    }
    wrapped
}

fn integer_operation(value: &BigInt, src: Option<&ConstValue>, op: Operator) -> Option<ConstValue> {
    match op {
        Operator::Complement => return Some(ConstValue::Integer(!value)),
        Operator::Negation => return Some(ConstValue::Integer(-value)),
        Operator::UnaryPlus => return Some(ConstValue::Integer(value.clone())),
        _ => {}
    }

    let rhs = match src {
        Some(ConstValue::Integer(v)) => v,
        other => mismatch(op, &ConstValue::Integer(value.clone()), other),
    };

    Some(match op {
        Operator::Add => ConstValue::Integer(value + rhs),
        Operator::Subtract => ConstValue::Integer(value - rhs),
        Operator::Multiply => ConstValue::Integer(value * rhs),
        Operator::Divide | Operator::Modulo if rhs.is_zero() => return None,
        Operator::Divide => ConstValue::Integer(value / rhs),
        Operator::Modulo => ConstValue::Integer(value % rhs),
        Operator::ShiftLeft | Operator::ShiftRight => {
            let count = rhs.to_u32().filter(|&c| c <= MAX_SHIFT)?;
            if op == Operator::ShiftLeft {
                ConstValue::Integer(value << count)
            } else {
                ConstValue::Integer(value >> count)
            }
        }
        Operator::BitwiseAnd => ConstValue::Integer(value & rhs),
        Operator::BitwiseOr => ConstValue::Integer(value | rhs),
        Operator::BitwiseXor => ConstValue::Integer(value ^ rhs),
        Operator::Equality => ConstValue::Boolean(value == rhs),
        Operator::Inequality => ConstValue::Boolean(value != rhs),
        Operator::Greater => ConstValue::Boolean(value > rhs),
        Operator::GreaterEqual => ConstValue::Boolean(value >= rhs),
        Operator::Less => ConstValue::Boolean(value < rhs),
        Operator::LessEqual => ConstValue::Boolean(value <= rhs),
        _ => unsupported(op, &ConstValue::Integer(value.clone())),
    })
}

fn float_operation<T, R, W>(value: T, rhs: R, op: Operator, wrap: W) -> Option<ConstValue>
where
    T: Copy
        + PartialOrd
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>
        + std::ops::Rem<Output = T>
        + std::ops::Neg<Output = T>,
    R: FnOnce() -> T,
    W: Fn(T) -> ConstValue,
{
    match op {
        Operator::Negation => return Some(wrap(-value)),
        Operator::UnaryPlus => return Some(wrap(value)),
        _ => {}
    }

    let rhs = rhs();
    Some(match op {
        Operator::Add => wrap(value + rhs),
        Operator::Subtract => wrap(value - rhs),
        Operator::Multiply => wrap(value * rhs),
        Operator::Divide => wrap(value / rhs),
        Operator::Modulo => wrap(value % rhs),
        Operator::Equality => ConstValue::Boolean(value == rhs),
        Operator::Inequality => ConstValue::Boolean(value != rhs),
        Operator::Greater => ConstValue::Boolean(value > rhs),
        Operator::GreaterEqual => ConstValue::Boolean(value >= rhs),
        Operator::Less => ConstValue::Boolean(value < rhs),
        Operator::LessEqual => ConstValue::Boolean(value <= rhs),
        _ => panic!("constant operation '{op}' is not defined for floating point values"),
    })
}

fn char_operation(value: u16, src: Option<&ConstValue>, op: Operator) -> Option<ConstValue> {
    match op {
        Operator::Complement => return Some(ConstValue::Char(!value)),
        Operator::Negation => return Some(ConstValue::Char(value.wrapping_neg())),
        Operator::UnaryPlus => return Some(ConstValue::Char(value)),
        _ => {}
    }

    let rhs = match src {
        Some(ConstValue::Char(v)) => *v,
        other => mismatch(op, &ConstValue::Char(value), other),
    };

    Some(match op {
        Operator::Add => ConstValue::Char(value.wrapping_add(rhs)),
        Operator::Subtract => ConstValue::Char(value.wrapping_sub(rhs)),
        Operator::Multiply => ConstValue::Char(value.wrapping_mul(rhs)),
        Operator::Divide => ConstValue::Char(value.checked_div(rhs)?),
        Operator::Modulo => ConstValue::Char(value.checked_rem(rhs)?),
        Operator::BitwiseAnd => ConstValue::Char(value & rhs),
        Operator::BitwiseOr => ConstValue::Char(value | rhs),
        Operator::BitwiseXor => ConstValue::Char(value ^ rhs),
        Operator::Equality => ConstValue::Boolean(value == rhs),
        Operator::Inequality => ConstValue::Boolean(value != rhs),
        Operator::Greater => ConstValue::Boolean(value > rhs),
        Operator::GreaterEqual => ConstValue::Boolean(value >= rhs),
        Operator::Less => ConstValue::Boolean(value < rhs),
        Operator::LessEqual => ConstValue::Boolean(value <= rhs),
        _ => unsupported(op, &ConstValue::Char(value)),
    })
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Integer(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v}"),
            ConstValue::Double(v) => write!(f, "{v}"),
            ConstValue::String(v) => f.write_str(v),
            ConstValue::Char(v) => f.write_str(&String::from_utf16_lossy(&[*v])),
            ConstValue::Boolean(v) => write!(f, "{v}"),
            ConstValue::Structured(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str(")")
            }
            ConstValue::Zero => f.write_str("0"),
            ConstValue::Null => f.write_str("null"),
        }
    }
}

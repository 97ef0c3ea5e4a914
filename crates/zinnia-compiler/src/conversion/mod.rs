//! Type conversion system.
//!
//! Determines whether a value of one type can become a value of another
//! type, whether that may happen implicitly, and at what cost. Used for:
//!
//! - Inserting casts while typing assignments, calls and operators
//! - Ranking overload candidates
//! - Validating explicit casts
//!
//! ## Conversion Priority
//!
//! Conversions are checked in this order:
//! 1. Identity (same interned type)
//! 2. References (a `ref T` target only binds a `T`)
//! 3. Tuples, member-wise, and scalar broadcast into tuples
//! 4. Null to pointers, functions and reference types
//! 5. Enum conversions
//! 6. Primitive conversions (integer, float, char)
//! 7. Pointer conversions
//! 8. Reference casts to and from `object`
//! 9. User-defined conversion functions of the source type

use zinnia_core::{ConstValue, IdentId, NameHash, TypeId, TypeKind};

use crate::state::CompilerState;

mod primitive;

pub use primitive::{find_primitive_conversion, size_steps};

/// A type conversion with its cost for overload resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: ConversionKind,
    /// Lower is better.
    pub cost: u32,
    /// Whether the conversion may be inserted without an explicit cast.
    pub is_implicit: bool,
}

/// The kind of conversion being performed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionKind {
    /// No conversion needed.
    Identity,
    /// Between integers, floats and chars.
    Primitive { from: TypeId, to: TypeId },
    /// `null` to a pointer, function or reference type.
    NullToReference,
    /// Between pointers, or between pointers and integers of pointer size.
    PointerCast,
    /// Enum to an integer.
    EnumToInt,
    /// Integer to an enum.
    IntToEnum { enum_type: TypeId },
    /// Class or string to `object`, or back.
    ReferenceCast { target: TypeId },
    /// Member-wise conversion of a tuple.
    Tuple { members: Vec<Conversion> },
    /// A scalar copied into every member of a tuple.
    Broadcast { members: Vec<Conversion> },
    /// A conversion function declared by the source type.
    UserDefined { function: IdentId },
}

impl Conversion {
    // Lower cost = better match:
    // 1. no conversion needed
    // 2. null to handle
    // 3. enum to integer of same size
    // 4. enum to integer of different size
    // 5. size of primitive type increases, one step per size doubling
    // 6. size of primitive type decreases
    // 7. signed to unsigned integer
    // 8. unsigned to signed integer
    // 9. integer to float
    // 10. float to integer
    // 11. reference cast
    // 12. user-defined conversion function

    pub const COST_EXACT: u32 = 0;
    pub const COST_NULL_TO_REFERENCE: u32 = 1;
    pub const COST_ENUM_SAME_SIZE: u32 = 2;
    pub const COST_ENUM_DIFF_SIZE: u32 = 3;
    /// Widening by one size step; every further step adds one.
    pub const COST_PRIMITIVE_WIDENING: u32 = 4;
    pub const COST_PRIMITIVE_NARROWING: u32 = 8;
    pub const COST_SIGNED_TO_UNSIGNED: u32 = 9;
    pub const COST_UNSIGNED_TO_SIGNED: u32 = 10;
    pub const COST_INT_TO_FLOAT: u32 = 11;
    pub const COST_FLOAT_TO_INT: u32 = 12;
    pub const COST_REFERENCE_CAST: u32 = 13;
    pub const COST_USER_DEFINED: u32 = 14;
    /// Cost marker for explicit-only conversions.
    pub const COST_EXPLICIT_ONLY: u32 = 100;

    #[inline]
    pub(crate) fn identity() -> Self {
        Self {
            kind: ConversionKind::Identity,
            cost: Self::COST_EXACT,
            is_implicit: true,
        }
    }

    #[inline]
    pub(crate) fn implicit(kind: ConversionKind, cost: u32) -> Self {
        Self {
            kind,
            cost,
            is_implicit: true,
        }
    }

    #[inline]
    pub(crate) fn explicit(kind: ConversionKind, cost: u32) -> Self {
        Self {
            kind,
            cost,
            is_implicit: false,
        }
    }

    #[inline]
    pub fn is_implicit(&self) -> bool {
        self.is_implicit
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        matches!(self.kind, ConversionKind::Identity)
    }
}

/// Check if `from` can convert to `to`.
///
/// Returns `None` if no conversion exists, explicit or implicit.
pub fn find_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let types = &state.types;
    let from = types.non_ref(from);

    // 1. Identity
    if from == to {
        return Some(Conversion::identity());
    }

    // 2. References only bind their exact child type
    if let TypeKind::Reference { child, .. } = types.kind(to) {
        return (*child == from).then(Conversion::identity);
    }

    // 3. Tuples
    if types.is_tuple(to) {
        return find_tuple_conversion(from, to, state);
    }

    // 4. Null
    if types.is_null(from) {
        let accepts = types.is_pointer(to) || types.is_function(to) || types.is_reference_type(to);
        return accepts.then(|| {
            Conversion::implicit(ConversionKind::NullToReference, Conversion::COST_NULL_TO_REFERENCE)
        });
    }

    // 5. Enums
    if let Some(conv) = find_enum_conversion(from, to, state) {
        return Some(conv);
    }

    // 6. Primitives
    if let Some(conv) = primitive::find_primitive_conversion(from, to, types) {
        return Some(conv);
    }

    // 7. Pointers
    if let Some(conv) = find_pointer_conversion(from, to, state) {
        return Some(conv);
    }

    // 8. Object hierarchy
    if let Some(conv) = find_object_conversion(from, to, state) {
        return Some(conv);
    }

    // 9. User-defined
    find_user_conversion(from, to, state)
}

/// Check if implicit conversion is possible.
pub fn can_implicitly_convert(from: TypeId, to: TypeId, state: &CompilerState) -> bool {
    find_conversion(from, to, state).is_some_and(|c| c.is_implicit)
}

/// Conversion of a known constant. Integer constants convert implicitly to
/// any integer or char type that can represent them, and the untyped zero
/// converts to every type that has a zero.
pub fn find_constant_conversion(
    value: &ConstValue,
    from: TypeId,
    to: TypeId,
    state: &CompilerState,
) -> Option<Conversion> {
    let types = &state.types;
    let conv = find_conversion(from, to, state);
    if conv.as_ref().is_some_and(Conversion::is_implicit) {
        return conv;
    }

    let target = types.non_ref(to);
    let representable = match value {
        ConstValue::Integer(_) => {
            (types.is_integer(target) || types.is_char(target)) && value.check_bounds(target, types)
        }
        ConstValue::Zero => ConstValue::zero_of_type(target, types).is_some(),
        _ => false,
    };

    if representable {
        let kind = ConversionKind::Primitive {
            from: types.non_ref(from),
            to: target,
        };
        return Some(Conversion::implicit(kind, Conversion::COST_PRIMITIVE_NARROWING));
    }
    conv
}

fn find_tuple_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let types = &state.types;
    let targets: Vec<TypeId> = types.tuple_members(to)?.iter().map(|m| m.ty).collect();

    let (members, broadcast) = match types.tuple_members(from) {
        Some(sources) => {
            if sources.len() != targets.len() {
                return None;
            }
            let sources: Vec<TypeId> = sources.iter().map(|m| m.ty).collect();
            let members = sources
                .into_iter()
                .zip(targets)
                .map(|(s, t)| find_conversion(s, t, state))
                .collect::<Option<Vec<_>>>()?;
            (members, false)
        }
        None => {
            let members = targets
                .into_iter()
                .map(|t| find_conversion(from, t, state))
                .collect::<Option<Vec<_>>>()?;
            (members, true)
        }
    };

    let is_implicit = members.iter().all(Conversion::is_implicit);
    let cost: u32 = members.iter().map(|c| c.cost).sum::<u32>() + u32::from(broadcast);
    let kind = if broadcast {
        ConversionKind::Broadcast { members }
    } else {
        ConversionKind::Tuple { members }
    };
    Some(Conversion {
        kind,
        cost,
        is_implicit,
    })
}

/// Enum values convert to integers and integers to enums, both only
/// explicitly.
fn find_enum_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let types = &state.types;

    if let TypeKind::Enum { underlying, .. } = types.kind(from) {
        if !types.is_integer(to) {
            return None;
        }
        let cost = if *underlying == to {
            Conversion::COST_ENUM_SAME_SIZE
        } else {
            Conversion::COST_ENUM_DIFF_SIZE
        };
        return Some(Conversion::explicit(ConversionKind::EnumToInt, cost));
    }

    if let TypeKind::Enum { underlying, .. } = types.kind(to) {
        if !types.is_integer(from) {
            return None;
        }
        let cost = if *underlying == from {
            Conversion::COST_ENUM_SAME_SIZE
        } else {
            Conversion::COST_ENUM_DIFF_SIZE
        };
        return Some(Conversion::explicit(
            ConversionKind::IntToEnum { enum_type: to },
            cost,
        ));
    }

    None
}

fn find_pointer_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let types = &state.types;
    let void_ptr = types.builtins().void_ptr;
    let pointer_size = types.pointer_size();

    match (types.kind(from), types.kind(to)) {
        (TypeKind::Pointer { child: a }, TypeKind::Pointer { child: b }) => {
            let implicit = to == void_ptr || equivalent(*a, *b, state);
            Some(Conversion {
                kind: ConversionKind::PointerCast,
                cost: Conversion::COST_REFERENCE_CAST,
                is_implicit: implicit,
            })
        }
        (TypeKind::Function { .. }, _) if to == void_ptr => Some(Conversion::explicit(
            ConversionKind::PointerCast,
            Conversion::COST_REFERENCE_CAST,
        )),
        (TypeKind::Integer { size, .. }, TypeKind::Pointer { .. })
        | (TypeKind::Pointer { .. }, TypeKind::Integer { size, .. })
            if u32::from(*size) == pointer_size =>
        {
            Some(Conversion::explicit(
                ConversionKind::PointerCast,
                Conversion::COST_REFERENCE_CAST,
            ))
        }
        _ => None,
    }
}

/// Pointee types that share a representation: identical, or tuples whose
/// members are equivalent.
fn equivalent(a: TypeId, b: TypeId, state: &CompilerState) -> bool {
    if a == b {
        return true;
    }
    let types = &state.types;
    match (types.tuple_members(a), types.tuple_members(b)) {
        (Some(ma), Some(mb)) => {
            ma.len() == mb.len() && ma.iter().zip(mb).all(|(x, y)| equivalent(x.ty, y.ty, state))
        }
        _ => false,
    }
}

/// Classes and strings convert implicitly to `object`; `object` converts
/// back to a class only explicitly.
fn find_object_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let types = &state.types;
    let is_class = |ty| matches!(types.kind(ty), TypeKind::Struct { class: true, .. });
    let kind = ConversionKind::ReferenceCast { target: to };

    if types.kind(to) == &TypeKind::Object && (is_class(from) || types.is_string(from)) {
        return Some(Conversion::implicit(kind, Conversion::COST_REFERENCE_CAST));
    }
    if types.kind(from) == &TypeKind::Object && is_class(to) {
        return Some(Conversion::explicit(kind, Conversion::COST_REFERENCE_CAST));
    }
    None
}

/// Conversion functions of the source type returning the target type.
/// Implicit functions are preferred; several equally applicable functions
/// give no conversion.
fn find_user_conversion(from: TypeId, to: TypeId, state: &CompilerState) -> Option<Conversion> {
    let scope = match state.types.kind(from) {
        TypeKind::Struct { scope, .. } => *scope,
        _ => return None,
    };

    for explicit in [false, true] {
        let hash = NameHash::conversion_function(explicit);
        let candidates: Vec<IdentId> = state
            .idents
            .members_by_hash(scope, hash)
            .iter()
            .copied()
            .filter(|&id| state.idents.get(id).function().is_some_and(|f| f.ret == to))
            .collect();

        match candidates.as_slice() {
            [] => continue,
            [function] => {
                let kind = ConversionKind::UserDefined {
                    function: *function,
                };
                return Some(if explicit {
                    Conversion::explicit(kind, Conversion::COST_EXPLICIT_ONLY)
                } else {
                    Conversion::implicit(kind, Conversion::COST_USER_DEFINED)
                });
            }
            _ => {
                tracing::debug!(
                    from = %state.types.name(from),
                    to = %state.types.name(to),
                    count = candidates.len(),
                    "ambiguous user conversion"
                );
                return None;
            }
        }
    }
    None
}

//! Primitive type conversions.
//!
//! Conversions between integers, floating point types and chars. Widening
//! within a signedness, unsigned to a strictly larger signed type, integer
//! to float and float to a larger float are implicit; every other numeric
//! pair converts only explicitly.

use zinnia_core::{TypeId, TypeKind, TypeTable};

use super::{Conversion, ConversionKind};

/// Find primitive type conversion.
pub fn find_primitive_conversion(from: TypeId, to: TypeId, types: &TypeTable) -> Option<Conversion> {
    let kind = ConversionKind::Primitive { from, to };

    match (types.kind(from), types.kind(to)) {
        (
            TypeKind::Integer {
                size: sf,
                signed: gf,
            },
            TypeKind::Integer {
                size: st,
                signed: gt,
            },
        ) => Some(integer_conversion(kind, (*sf, *gf), (*st, *gt))),

        (TypeKind::Integer { .. }, TypeKind::Float { .. }) => Some(Conversion::implicit(
            kind,
            Conversion::COST_INT_TO_FLOAT,
        )),

        (TypeKind::Float { .. }, TypeKind::Integer { .. }) => Some(Conversion::explicit(
            kind,
            Conversion::COST_FLOAT_TO_INT,
        )),

        (TypeKind::Float { size: sf }, TypeKind::Float { size: st }) => Some(if st > sf {
            Conversion::implicit(kind, widening_cost(*sf, *st))
        } else {
            Conversion::explicit(kind, Conversion::COST_PRIMITIVE_NARROWING)
        }),

        (TypeKind::Integer { .. }, TypeKind::Char) | (TypeKind::Char, TypeKind::Integer { .. }) => Some(
            Conversion::explicit(kind, Conversion::COST_PRIMITIVE_NARROWING),
        ),

        _ => None,
    }
}

fn integer_conversion(kind: ConversionKind, from: (u8, bool), to: (u8, bool)) -> Conversion {
    let ((sf, gf), (st, gt)) = (from, to);

    // Widening within a signedness, or unsigned into a larger signed type
    if (gf == gt && st >= sf) || (!gf && gt && st > sf) {
        return Conversion::implicit(kind, widening_cost(sf, st));
    }

    let cost = match (gf, gt) {
        (true, false) => Conversion::COST_SIGNED_TO_UNSIGNED,
        (false, true) => Conversion::COST_UNSIGNED_TO_SIGNED,
        _ => Conversion::COST_PRIMITIVE_NARROWING,
    };
    Conversion::explicit(kind, cost)
}

fn widening_cost(from_size: u8, to_size: u8) -> u32 {
    Conversion::COST_PRIMITIVE_WIDENING + size_steps(from_size, to_size).saturating_sub(1)
}

/// Number of size doublings between two byte sizes (`2 -> 8` is two steps).
pub fn size_steps(from_size: u8, to_size: u8) -> u32 {
    let from = u32::from(from_size.max(1)).trailing_zeros();
    let to = u32::from(to_size.max(1)).trailing_zeros();
    to.abs_diff(from)
}

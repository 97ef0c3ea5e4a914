//! Deterministic hashes for identifier names.
//!
//! Scope member tables are keyed by [`NameHash`] rather than by string, so a
//! lookup never allocates. Special members (operator functions, conversion
//! operators, constructors) get their own hash domains and can never collide
//! with a user-visible name.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

use crate::operator::Operator;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Domain marker for plain identifier names.
    pub const IDENT: u64 = 0x1a095090689d4647;

    /// Domain marker for `%Operator_<Name>` functions.
    pub const OPERATOR: u64 = 0x3e9f5d2a8c7b1403;

    /// Domain marker for implicit conversion operators.
    pub const IMPLICIT_CONVERSION: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for explicit conversion operators.
    pub const EXPLICIT_CONVERSION: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructors.
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;
}

/// A 64-bit hash of an identifier name within a hash domain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NameHash(pub u64);

impl NameHash {
    /// Hash of an ordinary identifier name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        NameHash(hash_constants::IDENT ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of the member function implementing `op` for a user type.
    #[inline]
    pub fn operator_function(op: Operator) -> Self {
        NameHash(hash_constants::OPERATOR ^ xxh64(op.function_name().as_bytes(), 0))
    }

    /// Hash of the implicit or explicit user conversion operator.
    #[inline]
    pub fn conversion_function(explicit: bool) -> Self {
        if explicit {
            NameHash(hash_constants::EXPLICIT_CONVERSION)
        } else {
            NameHash(hash_constants::IMPLICIT_CONVERSION)
        }
    }

    /// Hash under which a type's constructors are stored.
    #[inline]
    pub fn constructor() -> Self {
        NameHash(hash_constants::CONSTRUCTOR)
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}

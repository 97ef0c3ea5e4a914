//! The type table.
//!
//! Types live in an arena addressed by [`TypeId`]. Structural types (pointers,
//! references, tuples, arrays, function types) are interned, so two requests
//! for the same structure return the same id and type equality is id equality.
//! Structs, classes and enums are nominal and get a fresh id per declaration.
//!
//! ## Builtins
//!
//! A new table always contains the builtin types listed in [`Builtins`]; they
//! are looked up through [`TypeTable::builtins`].

use std::fmt::Write as _;

use num_bigint::BigInt;
use rustc_hash::FxHashMap;

use crate::identifier::ScopeId;

/// Index of a type in the [`TypeTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypeId(pub u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a reference promises about the assignment state of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceMode {
    /// Not tracked.
    Unsafe,
    /// The target must be assigned before the reference is taken (`ref`).
    IdMustBeAssigned,
    /// The callee assigns the target (`out`).
    IdGetsAssigned,
}

/// A member of a tuple type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleMember {
    pub name: Option<String>,
    pub ty: TypeId,
}

/// The structure of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    /// Placeholder resolved by inference.
    Auto,
    /// The type of the `null` literal.
    Null,
    /// Root of every class type.
    Object,
    Boolean,
    /// UTF-16 code unit.
    Char,
    String,
    Integer {
        size: u8,
        signed: bool,
    },
    Float {
        size: u8,
    },
    Enum {
        underlying: TypeId,
        scope: ScopeId,
    },
    Pointer {
        child: TypeId,
    },
    Reference {
        child: TypeId,
        mode: ReferenceMode,
    },
    Tuple {
        members: Vec<TupleMember>,
    },
    /// Value struct or reference class; members live in `scope`.
    Struct {
        scope: ScopeId,
        fields: Vec<TypeId>,
        class: bool,
    },
    FixedArray {
        element: TypeId,
        lengths: Vec<u32>,
    },
    /// Heap array referenced by handle.
    RefArray {
        element: TypeId,
        dimensions: u32,
    },
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
    },
}

/// Field offsets of a struct, filled in when layouts are calculated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub offsets: Vec<u32>,
    pub size: u32,
    pub align: u32,
}

/// An entry of the type table.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
    pub layout: Option<StructLayout>,
}

/// Ids of the builtin types.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub void: TypeId,
    pub auto: TypeId,
    pub null: TypeId,
    pub object: TypeId,
    pub boolean: TypeId,
    pub char: TypeId,
    pub string: TypeId,
    pub int8: TypeId,
    pub int16: TypeId,
    pub int32: TypeId,
    pub int64: TypeId,
    pub uint8: TypeId,
    pub uint16: TypeId,
    pub uint32: TypeId,
    pub uint64: TypeId,
    pub float32: TypeId,
    pub float64: TypeId,
    pub void_ptr: TypeId,
}

/// Arena of every type known to a compilation.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
    interned: FxHashMap<TypeKind, TypeId>,
    pointer_size: u32,
    builtins: Builtins,
}

impl TypeTable {
    /// A table holding the builtin types, using `pointer_size` bytes for
    /// pointers and handles.
    pub fn new(pointer_size: u32) -> Self {
        let placeholder = TypeId(0);
        let mut table = TypeTable {
            types: Vec::new(),
            interned: FxHashMap::default(),
            pointer_size,
            builtins: Builtins {
                void: placeholder,
                auto: placeholder,
                null: placeholder,
                object: placeholder,
                boolean: placeholder,
                char: placeholder,
                string: placeholder,
                int8: placeholder,
                int16: placeholder,
                int32: placeholder,
                int64: placeholder,
                uint8: placeholder,
                uint16: placeholder,
                uint32: placeholder,
                uint64: placeholder,
                float32: placeholder,
                float64: placeholder,
                void_ptr: placeholder,
            },
        };

        let void = table.intern(TypeKind::Void);
        table.builtins = Builtins {
            void,
            auto: table.intern(TypeKind::Auto),
            null: table.intern(TypeKind::Null),
            object: table.intern(TypeKind::Object),
            boolean: table.intern(TypeKind::Boolean),
            char: table.intern(TypeKind::Char),
            string: table.intern(TypeKind::String),
            int8: table.intern(TypeKind::Integer { size: 1, signed: true }),
            int16: table.intern(TypeKind::Integer { size: 2, signed: true }),
            int32: table.intern(TypeKind::Integer { size: 4, signed: true }),
            int64: table.intern(TypeKind::Integer { size: 8, signed: true }),
            uint8: table.intern(TypeKind::Integer { size: 1, signed: false }),
            uint16: table.intern(TypeKind::Integer { size: 2, signed: false }),
            uint32: table.intern(TypeKind::Integer { size: 4, signed: false }),
            uint64: table.intern(TypeKind::Integer { size: 8, signed: false }),
            float32: table.intern(TypeKind::Float { size: 4 }),
            float64: table.intern(TypeKind::Float { size: 8 }),
            void_ptr: table.intern(TypeKind::Pointer { child: void }),
        };
        table
    }

    #[inline]
    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    #[inline]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Return the id of a structural type, creating it on first use.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }

        let name = self.describe(&kind);
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            name,
            kind: kind.clone(),
            layout: None,
        });
        self.interned.insert(kind, id);
        id
    }

    pub fn pointer_to(&mut self, child: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { child })
    }

    pub fn reference_to(&mut self, child: TypeId, mode: ReferenceMode) -> TypeId {
        self.intern(TypeKind::Reference { child, mode })
    }

    /// Tuple of unnamed members.
    pub fn tuple(&mut self, members: impl IntoIterator<Item = TypeId>) -> TypeId {
        let members = members
            .into_iter()
            .map(|ty| TupleMember { name: None, ty })
            .collect();
        self.intern(TypeKind::Tuple { members })
    }

    pub fn named_tuple(&mut self, members: Vec<TupleMember>) -> TypeId {
        self.intern(TypeKind::Tuple { members })
    }

    pub fn fixed_array(&mut self, element: TypeId, lengths: Vec<u32>) -> TypeId {
        self.intern(TypeKind::FixedArray { element, lengths })
    }

    pub fn ref_array(&mut self, element: TypeId, dimensions: u32) -> TypeId {
        self.intern(TypeKind::RefArray {
            element,
            dimensions,
        })
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Function { ret, params })
    }

    /// Declare a nominal struct (`class == false`) or class type. Fields are
    /// supplied later with [`TypeTable::set_struct_fields`].
    pub fn declare_struct(&mut self, name: impl Into<String>, scope: ScopeId, class: bool) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            name: name.into(),
            kind: TypeKind::Struct {
                scope,
                fields: Vec::new(),
                class,
            },
            layout: None,
        });
        id
    }

    /// # Panics
    ///
    /// Panics if `ty` is not a struct type.
    pub fn set_struct_fields(&mut self, ty: TypeId, new_fields: Vec<TypeId>) {
        match &mut self.types[ty.index()].kind {
            TypeKind::Struct { fields, .. } => *fields = new_fields,
            other => panic!("set_struct_fields on non-struct type {other:?}"),
        }
        self.types[ty.index()].layout = None;
    }

    pub fn declare_enum(&mut self, name: impl Into<String>, underlying: TypeId, scope: ScopeId) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            name: name.into(),
            kind: TypeKind::Enum { underlying, scope },
            layout: None,
        });
        id
    }

    /// The builtin integer type with the given size and signedness.
    pub fn integer(&self, size: u8, signed: bool) -> Option<TypeId> {
        let b = &self.builtins;
        Some(match (size, signed) {
            (1, true) => b.int8,
            (2, true) => b.int16,
            (4, true) => b.int32,
            (8, true) => b.int64,
            (1, false) => b.uint8,
            (2, false) => b.uint16,
            (4, false) => b.uint32,
            (8, false) => b.uint64,
            _ => return None,
        })
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()].kind
    }

    #[inline]
    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.index()].name
    }

    /// The referenced type for references, the type itself otherwise.
    pub fn non_ref(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Reference { child, .. } => *child,
            _ => id,
        }
    }

    /// Underlying integer type of enums, the type itself otherwise.
    pub fn underlying(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Enum { underlying, .. } => *underlying,
            _ => id,
        }
    }

    pub fn tuple_members(&self, id: TypeId) -> Option<&[TupleMember]> {
        match self.kind(id) {
            TypeKind::Tuple { members } => Some(members),
            _ => None,
        }
    }

    pub fn struct_scope(&self, id: TypeId) -> Option<ScopeId> {
        match self.kind(id) {
            TypeKind::Struct { scope, .. } | TypeKind::Enum { scope, .. } => Some(*scope),
            _ => None,
        }
    }

    /// Element type of fixed arrays, reference arrays and pointers.
    pub fn element_type(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::FixedArray { element, .. } | TypeKind::RefArray { element, .. } => Some(*element),
            TypeKind::Pointer { child } => Some(*child),
            _ => None,
        }
    }

    /// Number of elements of a fixed array (product of its lengths).
    pub fn fixed_length(&self, id: TypeId) -> Option<u64> {
        match self.kind(id) {
            TypeKind::FixedArray { lengths, .. } => {
                Some(lengths.iter().map(|&l| l as u64).product())
            }
            _ => None,
        }
    }

    // ========================================================================
    // Classification
    // ========================================================================

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Void)
    }

    pub fn is_auto(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Auto)
    }

    /// Whether `auto` appears anywhere inside the type.
    pub fn contains_auto(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Auto => true,
            TypeKind::Tuple { members } => members.iter().any(|m| self.contains_auto(m.ty)),
            TypeKind::Pointer { child } | TypeKind::Reference { child, .. } => self.contains_auto(*child),
            TypeKind::FixedArray { element, .. } | TypeKind::RefArray { element, .. } => {
                self.contains_auto(*element)
            }
            _ => false,
        }
    }

    pub fn is_boolean(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Boolean)
    }

    pub fn is_char(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Char)
    }

    pub fn is_string(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::String)
    }

    pub fn is_null(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Null)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Integer { .. })
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Float { .. })
    }

    /// Integer or floating point.
    pub fn is_number(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_float(id)
    }

    pub fn is_unsigned(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Integer { signed: false, .. })
    }

    pub fn is_signed_integer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Integer { signed: true, .. })
    }

    pub fn is_enum(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Enum { .. })
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Pointer { .. })
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Reference { .. })
    }

    pub fn is_tuple(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Tuple { .. })
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Struct { class: false, .. })
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Function { .. })
    }

    /// Types accessed through a handle: classes, strings, objects and
    /// reference arrays. `null` converts to all of them.
    pub fn is_reference_type(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Struct { class: true, .. }
                | TypeKind::String
                | TypeKind::Object
                | TypeKind::RefArray { .. }
        )
    }

    /// Tuple whose members are all numbers.
    pub fn is_vector_number(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Tuple { members } => {
                !members.is_empty() && members.iter().all(|m| self.is_number(m.ty))
            }
            _ => false,
        }
    }

    /// Number or tuple of numbers.
    pub fn is_scalar_or_vector_number(&self, id: TypeId) -> bool {
        self.is_number(id) || self.is_vector_number(id)
    }

    /// Inclusive value range of an integer, char or enum type.
    pub fn integer_bounds(&self, id: TypeId) -> Option<(BigInt, BigInt)> {
        match self.kind(id) {
            TypeKind::Integer { size, signed } => {
                let bits = u32::from(*size) * 8;
                Some(if *signed {
                    let half = BigInt::from(1) << (bits - 1);
                    (-half.clone(), half - 1)
                } else {
                    (BigInt::from(0), (BigInt::from(1) << bits) - 1)
                })
            }
            TypeKind::Char => Some((BigInt::from(0), BigInt::from(0xFFFF))),
            TypeKind::Enum { underlying, .. } => self.integer_bounds(*underlying),
            _ => None,
        }
    }

    // ========================================================================
    // Size and layout
    // ========================================================================

    /// Size in bytes of a value of this type.
    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.kind(id) {
            TypeKind::Void | TypeKind::Auto => 0,
            TypeKind::Boolean => 1,
            TypeKind::Char => 2,
            TypeKind::Integer { size, .. } | TypeKind::Float { size } => u32::from(*size),
            TypeKind::Enum { underlying, .. } => self.size_of(*underlying),
            TypeKind::Null
            | TypeKind::Object
            | TypeKind::String
            | TypeKind::Pointer { .. }
            | TypeKind::Reference { .. }
            | TypeKind::RefArray { .. }
            | TypeKind::Function { .. }
            | TypeKind::Struct { class: true, .. } => self.pointer_size,
            TypeKind::Tuple { members } => {
                let fields: Vec<TypeId> = members.iter().map(|m| m.ty).collect();
                self.compute_layout(&fields).size
            }
            TypeKind::Struct { fields, .. } => match &self.get(id).layout {
                Some(layout) => layout.size,
                None => self.compute_layout(fields).size,
            },
            TypeKind::FixedArray { element, lengths } => {
                let count: u32 = lengths.iter().product();
                self.size_of(*element) * count
            }
        }
    }

    /// Natural alignment of a type.
    pub fn align_of(&self, id: TypeId) -> u32 {
        match self.kind(id) {
            TypeKind::Tuple { members } => {
                members.iter().map(|m| self.align_of(m.ty)).max().unwrap_or(1)
            }
            TypeKind::Struct {
                fields,
                class: false,
                ..
            } => fields.iter().map(|&f| self.align_of(f)).max().unwrap_or(1),
            TypeKind::FixedArray { element, .. } => self.align_of(*element),
            _ => self.size_of(id).clamp(1, self.pointer_size.max(1)),
        }
    }

    fn compute_layout(&self, fields: &[TypeId]) -> StructLayout {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0u32;
        let mut align = 1u32;

        for &field in fields {
            let field_align = self.align_of(field);
            align = align.max(field_align);
            offset = offset.next_multiple_of(field_align);
            offsets.push(offset);
            offset += self.size_of(field);
        }

        StructLayout {
            offsets,
            size: offset.next_multiple_of(align),
            align,
        }
    }

    /// Compute and store the field offsets of a struct type.
    pub fn calculate_layout(&mut self, id: TypeId) {
        let fields = match self.kind(id) {
            TypeKind::Struct {
                fields,
                class: false,
                ..
            } => fields.clone(),
            _ => return,
        };
        if self.types[id.index()].layout.is_some() {
            return;
        }

        let layout = self.compute_layout(&fields);
        tracing::trace!(ty = %self.name(id), size = layout.size, "struct layout calculated");
        self.types[id.index()].layout = Some(layout);
    }

    // ========================================================================
    // Inference helpers
    // ========================================================================

    /// The type both number operands are promoted to by arithmetic.
    ///
    /// Floats win over integers and the wider float wins. Integers of equal
    /// signedness take the wider size; mixed signedness takes the signed type
    /// when it is wider, otherwise a signed type of twice the unsigned width
    /// (capped at 64 bits).
    pub fn common_number_type(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        let a = self.underlying(a);
        let b = self.underlying(b);
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Float { size: sa }, TypeKind::Float { size: sb }) => {
                Some(if sa >= sb { a } else { b })
            }
            (TypeKind::Float { .. }, TypeKind::Integer { .. }) => Some(a),
            (TypeKind::Integer { .. }, TypeKind::Float { .. }) => Some(b),
            (
                TypeKind::Integer {
                    size: sa,
                    signed: ga,
                },
                TypeKind::Integer {
                    size: sb,
                    signed: gb,
                },
            ) => {
                let (sa, ga, sb, gb) = (*sa, *ga, *sb, *gb);
                if ga == gb {
                    Some(if sa >= sb { a } else { b })
                } else {
                    let (signed_size, unsigned_size) = if ga { (sa, sb) } else { (sb, sa) };
                    if signed_size > unsigned_size {
                        self.integer(signed_size, true)
                    } else {
                        self.integer((unsigned_size * 2).min(8), true)
                    }
                }
            }
            _ => None,
        }
    }

    fn describe(&self, kind: &TypeKind) -> String {
        match kind {
            TypeKind::Void => "void".into(),
            TypeKind::Auto => "auto".into(),
            TypeKind::Null => "null".into(),
            TypeKind::Object => "object".into(),
            TypeKind::Boolean => "bool".into(),
            TypeKind::Char => "char".into(),
            TypeKind::String => "string".into(),
            TypeKind::Integer { size, signed } => {
                format!("{}int{}", if *signed { "" } else { "u" }, u32::from(*size) * 8)
            }
            TypeKind::Float { size: 4 } => "float".into(),
            TypeKind::Float { .. } => "double".into(),
            TypeKind::Pointer { child } => format!("{}*", self.name(*child)),
            TypeKind::Reference { child, mode } => match mode {
                ReferenceMode::Unsafe => format!("ref unsafe {}", self.name(*child)),
                ReferenceMode::IdMustBeAssigned => format!("ref {}", self.name(*child)),
                ReferenceMode::IdGetsAssigned => format!("out {}", self.name(*child)),
            },
            TypeKind::Tuple { members } => {
                let mut out = String::from("(");
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(self.name(member.ty));
                    if let Some(name) = &member.name {
                        let _ = write!(out, " {name}");
                    }
                }
                out.push(')');
                out
            }
            TypeKind::FixedArray { element, lengths } => {
                let lengths: Vec<String> = lengths.iter().map(u32::to_string).collect();
                format!("{}[{}]", self.name(*element), lengths.join(", "))
            }
            TypeKind::RefArray {
                element,
                dimensions,
            } => {
                let commas = ",".repeat(dimensions.saturating_sub(1) as usize);
                format!("{}[{commas}]", self.name(*element))
            }
            TypeKind::Function { ret, params } => {
                let params: Vec<&str> = params.iter().map(|&p| self.name(p)).collect();
                format!("{}({})", self.name(*ret), params.join(", "))
            }
            TypeKind::Struct { .. } | TypeKind::Enum { .. } => "<nominal>".into(),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new(8)
    }
}

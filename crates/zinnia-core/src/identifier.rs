//! The identifier table.
//!
//! Every declared entity (variable, constant, function, property, type,
//! namespace) is an [`Identifier`] stored in one arena and addressed by
//! [`IdentId`]. Scopes form a tree through parent links:
//!
//! - global and namespace scopes hold globals, functions and types
//! - type scopes hold members; their parent is the declaring namespace
//! - function scopes hold parameters and number every local of the function
//! - code scopes hold locals of a block
//!
//! Members are keyed by [`NameHash`] and keep their insertion order. Only
//! functions may share a name within a scope (overloads).

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::const_value::ConstValue;
use crate::error::CompilationError;
use crate::intrinsic::MathIntrinsic;
use crate::name_hash::NameHash;
use crate::span::Span;
use crate::types::TypeId;

// ============================================================================
// Ids
// ============================================================================

/// Index of an identifier in the [`IdentifierTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct IdentId(pub u32);

/// Index of a scope in the [`IdentifierTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ScopeId(pub u32);

impl IdentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ScopeId {
    /// The global scope, created with every table.
    pub const GLOBAL: ScopeId = ScopeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// Scopes
// ============================================================================

/// What a scope belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeKind {
    Global,
    Namespace,
    /// Members of a struct, class or enum.
    Type(TypeId),
    /// Parameters of a function body; numbers the locals of the whole body.
    Function {
        function: Option<IdentId>,
        ret: TypeId,
        self_type: Option<TypeId>,
    },
    /// A block inside a function body.
    Code,
}

/// A scope with its members.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    members: FxHashMap<NameHash, Vec<IdentId>>,
    order: Vec<IdentId>,
    /// Locals numbered by this scope (function scopes only).
    locals: Vec<IdentId>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            members: FxHashMap::default(),
            order: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// Published members in declaration order.
    pub fn members(&self) -> &[IdentId] {
        &self.order
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ScopeKind::Function { .. })
    }
}

// ============================================================================
// Identifiers
// ============================================================================

bitflags! {
    /// Modifiers and usage state of an identifier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IdentFlags: u8 {
        const STATIC = 1 << 0;
        const READ_ONLY = 1 << 1;
        /// Referenced at least once.
        const USED = 1 << 2;
        /// Holds a value on entry (parameters, globals).
        const PRE_ASSIGNED = 1 << 3;
    }
}

/// Access level of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Local,
    Parameter,
    Global,
    Member,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    /// Value used when the call site omits the argument.
    pub default: Option<ConstValue>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, value: ConstValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Signature details of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub params: Vec<Param>,
    pub ret: TypeId,
    /// The last parameter is a reference array absorbing extra arguments.
    pub variadic: bool,
    pub constructor: bool,
    pub intrinsic: Option<MathIntrinsic>,
}

impl FunctionInfo {
    pub fn new(params: Vec<Param>, ret: TypeId) -> Self {
        Self {
            params,
            ret,
            variadic: false,
            constructor: false,
            intrinsic: None,
        }
    }

    /// Number of parameters without default value.
    pub fn required_params(&self) -> usize {
        let fixed = if self.variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        };
        self.params[..fixed]
            .iter()
            .rposition(|p| p.default.is_none())
            .map_or(0, |i| i + 1)
    }
}

/// Accessors of a property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyInfo {
    pub getter: Option<IdentId>,
    pub setter: Option<IdentId>,
    /// Non-empty for indexers.
    pub index_params: Vec<Param>,
}

/// What an identifier names.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentKind {
    Variable(VariableKind),
    /// A named constant, replaced by its value on recognition.
    Constant(ConstValue),
    Function(FunctionInfo),
    Property(PropertyInfo),
    Type,
    Namespace(ScopeId),
}

/// A declared entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub kind: IdentKind,
    /// Value type of variables, constants and properties; the function type
    /// of functions; the named type itself for types.
    pub ty: TypeId,
    /// Declaring scope.
    pub scope: ScopeId,
    pub access: Access,
    pub flags: IdentFlags,
    pub declaration: Span,
    /// Position among the locals of the enclosing function.
    pub local_index: Option<u32>,
}

impl Identifier {
    pub fn new(name: impl Into<String>, kind: IdentKind, ty: TypeId, declaration: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            scope: ScopeId::GLOBAL,
            access: Access::Public,
            flags: IdentFlags::empty(),
            declaration,
            local_index: None,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_flags(mut self, flags: IdentFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, IdentKind::Variable(_))
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind,
            IdentKind::Variable(VariableKind::Local | VariableKind::Parameter)
        )
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, IdentKind::Function(_))
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(IdentFlags::STATIC)
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(IdentFlags::READ_ONLY)
    }

    pub fn function(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            IdentKind::Function(info) => Some(info),
            _ => None,
        }
    }

    pub fn property(&self) -> Option<&PropertyInfo> {
        match &self.kind {
            IdentKind::Property(info) => Some(info),
            _ => None,
        }
    }

    /// Whether the identifier has a storage location that can be assigned.
    pub fn is_assignable_location(&self) -> bool {
        matches!(self.kind, IdentKind::Variable(_) | IdentKind::Property(_))
    }

    /// Whether using the identifier requires an instance of its declaring
    /// type.
    pub fn needs_instance(&self) -> bool {
        !self.is_static()
            && match &self.kind {
                IdentKind::Variable(VariableKind::Member) | IdentKind::Property(_) => true,
                IdentKind::Function(info) => !info.constructor && info.intrinsic.is_none(),
                _ => false,
            }
    }
}

// ============================================================================
// IdentifierTable
// ============================================================================

/// Arena of scopes and identifiers.
#[derive(Debug, Clone)]
pub struct IdentifierTable {
    scopes: Vec<Scope>,
    idents: Vec<Identifier>,
}

impl Default for IdentifierTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierTable {
    /// A table containing only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, None)],
            idents: Vec::new(),
        }
    }

    pub fn create_scope(&mut self, kind: ScopeKind, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, Some(parent)));
        id
    }

    /// Mark `scope` as the member scope of `ty`. Types and their scopes
    /// refer to each other, so the scope is created first and bound once
    /// the type exists.
    pub fn bind_type_scope(&mut self, scope: ScopeId, ty: TypeId) {
        self.scopes[scope.index()].kind = ScopeKind::Type(ty);
    }

    #[inline]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    #[inline]
    pub fn get(&self, id: IdentId) -> &Identifier {
        &self.idents[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: IdentId) -> &mut Identifier {
        &mut self.idents[id.index()]
    }

    pub fn len(&self) -> usize {
        self.idents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idents.is_empty()
    }

    // ========================================================================
    // Declaration
    // ========================================================================

    /// Add an identifier to the arena without making it visible by name.
    ///
    /// Locals of a function scope get their `local_index` here. Fails with
    /// `IdAlreadyDefined` if `scope` already publishes a conflicting name.
    pub fn create(&mut self, scope: ScopeId, mut ident: Identifier) -> Result<IdentId, CompilationError> {
        self.check_redefinition(scope, &ident)?;

        let id = IdentId(self.idents.len() as u32);
        ident.scope = scope;
        if ident.is_local() {
            let function_scope = self
                .function_scope_of(scope)
                .ok_or(CompilationError::CannotDeclVar {
                    span: ident.declaration,
                })?;
            let locals = &mut self.scopes[function_scope.index()].locals;
            ident.local_index = Some(locals.len() as u32);
            locals.push(id);
        }
        self.idents.push(ident);
        Ok(id)
    }

    /// Make a created identifier visible by name in its scope.
    pub fn publish(&mut self, id: IdentId) {
        let ident = &self.idents[id.index()];
        let hash = NameHash::from_name(&ident.name);
        let scope = &mut self.scopes[ident.scope.index()];
        let entry = scope.members.entry(hash).or_default();
        if !entry.contains(&id) {
            entry.push(id);
            scope.order.push(id);
        }
    }

    /// Create and publish.
    pub fn declare(&mut self, scope: ScopeId, ident: Identifier) -> Result<IdentId, CompilationError> {
        let id = self.create(scope, ident)?;
        self.publish(id);
        Ok(id)
    }

    /// Publish `id` under `hash` instead of its name (operator functions,
    /// conversion operators, constructors).
    pub fn declare_with_hash(&mut self, scope: ScopeId, hash: NameHash, mut ident: Identifier) -> IdentId {
        let id = IdentId(self.idents.len() as u32);
        ident.scope = scope;
        self.idents.push(ident);
        let scope = &mut self.scopes[scope.index()];
        scope.members.entry(hash).or_default().push(id);
        scope.order.push(id);
        id
    }

    /// Declare a local variable of the function enclosing `scope`.
    pub fn create_local(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: TypeId,
        span: Span,
    ) -> Result<IdentId, CompilationError> {
        self.create(
            scope,
            Identifier::new(name, IdentKind::Variable(VariableKind::Local), ty, span),
        )
    }

    /// Declare a parameter in a function scope.
    pub fn declare_parameter(
        &mut self,
        function_scope: ScopeId,
        name: impl Into<String>,
        ty: TypeId,
        span: Span,
    ) -> Result<IdentId, CompilationError> {
        self.declare(
            function_scope,
            Identifier::new(name, IdentKind::Variable(VariableKind::Parameter), ty, span)
                .with_flags(IdentFlags::PRE_ASSIGNED),
        )
    }

    /// Declare a namespace and its scope.
    pub fn declare_namespace(
        &mut self,
        parent: ScopeId,
        name: impl Into<String>,
        void: TypeId,
        span: Span,
    ) -> Result<(IdentId, ScopeId), CompilationError> {
        let scope = self.create_scope(ScopeKind::Namespace, parent);
        let id = self.declare(
            parent,
            Identifier::new(name, IdentKind::Namespace(scope), void, span),
        )?;
        Ok((id, scope))
    }

    fn check_redefinition(&self, scope: ScopeId, ident: &Identifier) -> Result<(), CompilationError> {
        let existing = self.members_by_hash(scope, NameHash::from_name(&ident.name));
        let conflict = existing
            .iter()
            .any(|&other| !(ident.is_function() && self.get(other).is_function()));
        if conflict {
            return Err(CompilationError::IdAlreadyDefined {
                name: ident.name.clone(),
                span: ident.declaration,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Members of `scope` published under `hash`.
    pub fn members_by_hash(&self, scope: ScopeId, hash: NameHash) -> &[IdentId] {
        self.scopes[scope.index()]
            .members
            .get(&hash)
            .map_or(&[], Vec::as_slice)
    }

    /// Members of `scope` named `name`.
    pub fn members(&self, scope: ScopeId, name: &str) -> &[IdentId] {
        self.members_by_hash(scope, NameHash::from_name(name))
    }

    /// Resolve `hash` from `scope` outward; the innermost scope with any
    /// match wins.
    pub fn lookup_hash(&self, scope: ScopeId, hash: NameHash) -> &[IdentId] {
        let mut current = Some(scope);
        while let Some(id) = current {
            let found = self.members_by_hash(id, hash);
            if !found.is_empty() {
                return found;
            }
            current = self.scopes[id.index()].parent;
        }
        &[]
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> &[IdentId] {
        self.lookup_hash(scope, NameHash::from_name(name))
    }

    /// Whether `scope` is `ancestor` or nested inside it.
    pub fn is_sub_scope_of(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.scopes[id.index()].parent;
        }
        false
    }

    /// The closest function scope enclosing `scope` (inclusive).
    pub fn function_scope_of(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scopes[id.index()].is_function() {
                return Some(id);
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// The closest type scope enclosing `scope` (inclusive).
    pub fn type_scope_of(&self, scope: ScopeId) -> Option<(ScopeId, TypeId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let ScopeKind::Type(ty) = self.scopes[id.index()].kind {
                return Some((id, ty));
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// Locals of a function scope, indexed by `local_index`.
    pub fn locals(&self, function_scope: ScopeId) -> &[IdentId] {
        &self.scopes[function_scope.index()].locals
    }

    /// Whether code in `from` may access `id`.
    pub fn can_access(&self, from: ScopeId, id: IdentId) -> bool {
        let ident = self.get(id);
        match ident.access {
            Access::Public => true,
            Access::Protected | Access::Private => self.is_sub_scope_of(from, ident.scope),
        }
    }

    /// Whether `id` is visible by name in its scope.
    pub fn is_published(&self, id: IdentId) -> bool {
        self.scopes[self.get(id).scope.index()].order.contains(&id)
    }

    #[inline]
    pub fn mark_used(&mut self, id: IdentId) {
        self.idents[id.index()].flags |= IdentFlags::USED;
    }
}

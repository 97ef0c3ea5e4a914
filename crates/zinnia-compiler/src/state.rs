//! State shared by every stage of one compilation unit.

use std::sync::Arc;

use zinnia_core::{
    CompilationError, CompilerConfig, ConstCache, Diagnostics, IdentKind, Identifier,
    IdentifierTable, NameHash, ScopeId, ScopeKind, Span, TypeId, TypeTable,
};

use crate::plugins::preproc::MacroTable;

/// Tables and settings the pipeline reads and extends.
///
/// The diagnostics sink and the constant cache may be shared with other
/// compilation units running on other threads.
#[derive(Debug)]
pub struct CompilerState {
    pub types: TypeTable,
    pub idents: IdentifierTable,
    pub config: CompilerConfig,
    pub diagnostics: Arc<Diagnostics>,
    pub consts: Arc<ConstCache>,
    pub macros: MacroTable,
}

impl CompilerState {
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_shared(config, Arc::default(), Arc::default())
    }

    /// A state reporting into `diagnostics` and interning into `consts`.
    pub fn with_shared(config: CompilerConfig, diagnostics: Arc<Diagnostics>, consts: Arc<ConstCache>) -> Self {
        let mut state = Self {
            types: config.type_table(),
            idents: IdentifierTable::new(),
            config,
            diagnostics,
            consts,
            macros: MacroTable::new(),
        };
        state.declare_builtin_types();
        state
    }

    /// Make the builtin types nameable from the global scope.
    fn declare_builtin_types(&mut self) {
        let b = self.types.builtins();
        let named = [
            b.void, b.auto, b.object, b.boolean, b.char, b.string, b.int8, b.int16, b.int32,
            b.int64, b.uint8, b.uint16, b.uint32, b.uint64, b.float32, b.float64,
        ];
        for ty in named {
            let name = self.types.name(ty).to_string();
            self.idents.declare_with_hash(
                ScopeId::GLOBAL,
                NameHash::from_name(&name),
                Identifier::new(name, IdentKind::Type, ty, Span::default()),
            );
        }
    }

    /// Declare a struct (`class == false`) or class type named `name` in
    /// `parent`, with its member scope.
    pub fn declare_struct(
        &mut self,
        name: &str,
        parent: ScopeId,
        class: bool,
    ) -> Result<(TypeId, ScopeId), CompilationError> {
        let scope = self.idents.create_scope(ScopeKind::Namespace, parent);
        let ty = self.types.declare_struct(name, scope, class);
        self.idents.bind_type_scope(scope, ty);
        self.idents
            .declare(parent, Identifier::new(name, IdentKind::Type, ty, Span::default()))?;
        Ok((ty, scope))
    }

    /// Declare an enum type and its member scope.
    pub fn declare_enum(
        &mut self,
        name: &str,
        underlying: TypeId,
        parent: ScopeId,
    ) -> Result<(TypeId, ScopeId), CompilationError> {
        let scope = self.idents.create_scope(ScopeKind::Namespace, parent);
        let ty = self.types.declare_enum(name, underlying, scope);
        self.idents.bind_type_scope(scope, ty);
        self.idents
            .declare(parent, Identifier::new(name, IdentKind::Type, ty, Span::default()))?;
        Ok((ty, scope))
    }

    /// Create the scope of a function body. Methods pass the type scope as
    /// `parent` and the declaring type as `self_type`.
    pub fn function_scope(&mut self, parent: ScopeId, ret: TypeId, self_type: Option<TypeId>) -> ScopeId {
        self.idents.create_scope(
            ScopeKind::Function {
                function: None,
                ret,
                self_type,
            },
            parent,
        )
    }

    /// Report `error` if there is one.
    #[inline]
    pub fn report<T>(&self, result: Result<T, CompilationError>) -> Option<T> {
        self.diagnostics.report(result)
    }
}

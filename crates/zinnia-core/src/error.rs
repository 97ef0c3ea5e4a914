//! Error types for semantic analysis.
//!
//! Every user-facing problem found by the pipeline is a [`CompilationError`]
//! carrying the span it refers to. Some variants are only warnings; their
//! [`Severity`] is fixed per variant and exposed through
//! [`CompilationError::severity`].

use thiserror::Error;

use crate::span::Span;

/// How serious a reported message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Compilation can continue and produce output.
    Warning,
    /// The current expression or statement failed.
    Error,
}

// ============================================================================
// Compilation Errors
// ============================================================================

/// Errors and warnings produced while recognizing, typing, folding and
/// checking expressions and statements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    // === Name resolution ===
    /// A name could not be resolved in any enclosing scope.
    #[error("at {span}: unknown identifier '{name}'")]
    UnknownId { name: String, span: Span },

    /// A name resolves to several equally valid identifiers.
    #[error("at {span}: ambiguous reference '{name}'")]
    AmbiguousReference { name: String, span: Span },

    /// A name is already declared in the same scope.
    #[error("at {span}: identifier '{name}' is already defined")]
    IdAlreadyDefined { name: String, span: Span },

    /// A variable was declared where no function scope exists.
    #[error("at {span}: variables cannot be declared here")]
    CannotDeclVar { span: Span },

    /// A member is not accessible from the current scope.
    #[error("at {span}: '{name}' is inaccessible due to its protection level")]
    InaccessibleMember { name: String, span: Span },

    /// A non-static member was referenced without an instance.
    #[error("at {span}: an object reference is required to access '{name}'")]
    NonStatic { name: String, span: Span },

    /// A static member was referenced through an instance.
    #[error("at {span}: static member '{name}' cannot be accessed through an instance")]
    Static { name: String, span: Span },

    // === Calls and parameters ===
    /// Wrong number of arguments.
    #[error("at {span}: '{name}' takes {expected} parameter(s), {found} given")]
    ParamCount {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    /// A named argument targets a parameter that already has a value.
    #[error("at {span}: parameter '{name}' is already specified")]
    ParamAlreadySpecified { name: String, span: Span },

    /// A positional argument follows a named one.
    #[error("at {span}: unnamed parameter after named parameters")]
    UnnamedParamAfterNamed { span: Span },

    /// A parameter without default value received no argument.
    #[error("at {span}: parameter '{name}' is not specified")]
    ParamNotSpecified { name: String, span: Span },

    /// No overload accepts the argument types.
    #[error("at {span}: no overload of '{name}' matches argument types ({args})")]
    NoMatchingOverload {
        name: String,
        args: String,
        span: Span,
    },

    /// Several overloads match equally well.
    #[error("at {span}: ambiguous call to '{name}': could be {candidates}")]
    AmbiguousOverload {
        name: String,
        candidates: String,
        span: Span,
    },

    /// The callee of a call expression is not a function.
    #[error("at {span}: expression is not callable")]
    CallingNotFunc { span: Span },

    /// Constructors cannot be called like member functions.
    #[error("at {span}: constructors cannot be called directly")]
    CantUseConstructors { span: Span },

    // === Types and conversions ===
    /// No conversion exists between two types.
    #[error("at {span}: cannot convert '{from}' to '{to}'")]
    CannotConvert { from: String, to: String, span: Span },

    /// The conversion exists but must be written explicitly.
    #[error("at {span}: cannot implicitly convert '{from}' to '{to}'; an explicit cast is required")]
    ImplicitlyCast { from: String, to: String, span: Span },

    /// A constant value cannot be represented in the target type.
    #[error("at {span}: cannot convert constant '{value}' to '{to}'")]
    CannotConvertConst { value: String, to: String, span: Span },

    /// A folded constant does not fit its type.
    #[error("at {span}: constant '{value}' is out of range of '{ty}'")]
    ConstOutOfRange { value: String, ty: String, span: Span },

    /// A unary operator does not apply to the operand type.
    #[error("at {span}: operator '{op}' cannot be applied to '{ty}'")]
    CantOpApplied { op: String, ty: String, span: Span },

    /// A binary operator does not apply to the operand types.
    #[error("at {span}: operator '{op}' cannot be applied to '{left}' and '{right}'")]
    CantOpApplied2 {
        op: String,
        left: String,
        right: String,
        span: Span,
    },

    /// A type name was expected.
    #[error("at {span}: a type is expected")]
    MustBeType { span: Span },

    /// Reinterpretation between types of different sizes.
    #[error("at {span}: cannot reinterpret '{from}' as '{to}': sizes differ")]
    ReinterpretSize { from: String, to: String, span: Span },

    /// The type of an expression could not be determined.
    #[error("at {span}: the type of the expression cannot be inferred")]
    Untyped { span: Span },

    /// Taking the address of something that has no address.
    #[error("at {span}: cannot take the address of this expression")]
    InvalidAddressType { span: Span },

    // === Values ===
    /// Writing a read-only identifier.
    #[error("at {span}: '{name}' is read-only")]
    ReadOnly { name: String, span: Span },

    /// Assigning to something that is not an lvalue.
    #[error("at {span}: the left side of an assignment must be a variable")]
    AssignRValue { span: Span },

    /// Passing an rvalue where the callee assigns through a reference.
    #[error("at {span}: cannot pass an rvalue as an output reference")]
    AddressOfRValue { span: Span },

    /// Constant index outside a fixed array.
    #[error("at {span}: index out of range")]
    IndexOutOfRange { span: Span },

    /// An indexed property was used without its indices.
    #[error("at {span}: the property requires index parameters")]
    MissingPropertyIndices { span: Span },

    /// A value that must be known at compile time is not.
    #[error("at {span}: the expression must be constant")]
    MustBeConst { span: Span },

    // === Assignment analysis ===
    /// Use of a variable that is not assigned on every path.
    #[error("at {span}: use of unassigned variable '{name}'")]
    UnassignedVar { name: String, span: Span },

    /// A variable declared in this expression is read before it gets a value.
    #[error("at {span}: '{name}' must have an initial value")]
    MustHaveInitVal { name: String, span: Span },

    /// A property read without getter.
    #[error("at {span}: property '{name}' has no getter")]
    NoPropertyGetter { name: String, span: Span },

    /// A property write without setter.
    #[error("at {span}: property '{name}' has no setter")]
    NoPropertySetter { name: String, span: Span },

    // === Control flow ===
    /// A non-void function can reach its end without returning.
    #[error("at {span}: not all code paths return a value")]
    NotAllPathReturn { span: Span },

    /// A jump leaves a finally block.
    #[error("at {span}: control cannot leave the body of a finally clause")]
    CannotLeaveFinally { span: Span },

    // === Warnings ===
    /// A local variable is never used.
    #[error("at {span}: '{name}' is declared but never used")]
    UnusedId { name: String, span: Span },

    /// A local variable is assigned but its value is never read.
    #[error("at {span}: '{name}' is assigned but its value is never used")]
    AssignedButNeverUsed { name: String, span: Span },

    /// Code that can never execute.
    #[error("at {span}: unreachable code detected")]
    UnreachableCode { span: Span },

    /// A cast to the type the value already has.
    #[error("at {span}: casting to the same type '{ty}'")]
    CastToSameType { ty: String, span: Span },

    /// `x = x`.
    #[error("at {span}: assignment made to the same variable")]
    AssignSameVar { span: Span },

    /// `x == x` and similar.
    #[error("at {span}: comparison made to the same variable")]
    CmpSameVariable { span: Span },
}

impl CompilationError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompilationError::UnknownId { span, .. } => *span,
            CompilationError::AmbiguousReference { span, .. } => *span,
            CompilationError::IdAlreadyDefined { span, .. } => *span,
            CompilationError::CannotDeclVar { span } => *span,
            CompilationError::InaccessibleMember { span, .. } => *span,
            CompilationError::NonStatic { span, .. } => *span,
            CompilationError::Static { span, .. } => *span,
            CompilationError::ParamCount { span, .. } => *span,
            CompilationError::ParamAlreadySpecified { span, .. } => *span,
            CompilationError::UnnamedParamAfterNamed { span } => *span,
            CompilationError::ParamNotSpecified { span, .. } => *span,
            CompilationError::NoMatchingOverload { span, .. } => *span,
            CompilationError::AmbiguousOverload { span, .. } => *span,
            CompilationError::CallingNotFunc { span } => *span,
            CompilationError::CantUseConstructors { span } => *span,
            CompilationError::CannotConvert { span, .. } => *span,
            CompilationError::ImplicitlyCast { span, .. } => *span,
            CompilationError::CannotConvertConst { span, .. } => *span,
            CompilationError::ConstOutOfRange { span, .. } => *span,
            CompilationError::CantOpApplied { span, .. } => *span,
            CompilationError::CantOpApplied2 { span, .. } => *span,
            CompilationError::MustBeType { span } => *span,
            CompilationError::ReinterpretSize { span, .. } => *span,
            CompilationError::Untyped { span } => *span,
            CompilationError::InvalidAddressType { span } => *span,
            CompilationError::ReadOnly { span, .. } => *span,
            CompilationError::AssignRValue { span } => *span,
            CompilationError::AddressOfRValue { span } => *span,
            CompilationError::IndexOutOfRange { span } => *span,
            CompilationError::MissingPropertyIndices { span } => *span,
            CompilationError::MustBeConst { span } => *span,
            CompilationError::UnassignedVar { span, .. } => *span,
            CompilationError::MustHaveInitVal { span, .. } => *span,
            CompilationError::NoPropertyGetter { span, .. } => *span,
            CompilationError::NoPropertySetter { span, .. } => *span,
            CompilationError::NotAllPathReturn { span } => *span,
            CompilationError::CannotLeaveFinally { span } => *span,
            CompilationError::UnusedId { span, .. } => *span,
            CompilationError::AssignedButNeverUsed { span, .. } => *span,
            CompilationError::UnreachableCode { span } => *span,
            CompilationError::CastToSameType { span, .. } => *span,
            CompilationError::AssignSameVar { span } => *span,
            CompilationError::CmpSameVariable { span } => *span,
        }
    }

    /// Whether this message fails compilation or is only advisory.
    pub fn severity(&self) -> Severity {
        match self {
            CompilationError::UnusedId { .. }
            | CompilationError::AssignedButNeverUsed { .. }
            | CompilationError::UnreachableCode { .. }
            | CompilationError::CastToSameType { .. }
            | CompilationError::AssignSameVar { .. }
            | CompilationError::CmpSameVariable { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = CompilationError::UnknownId {
            name: "foo".into(),
            span: Span::new(4, 9, 3),
        };
        assert_eq!(err.to_string(), "at 4:9: unknown identifier 'foo'");
        assert_eq!(err.span(), Span::new(4, 9, 3));
    }

    #[test]
    fn warnings_are_not_errors() {
        let warn = CompilationError::UnreachableCode {
            span: Span::point(1, 1),
        };
        assert_eq!(warn.severity(), Severity::Warning);
        assert!(!warn.is_error());

        let err = CompilationError::MustBeConst {
            span: Span::point(1, 1),
        };
        assert!(err.is_error());
    }

    #[test]
    fn param_count_message() {
        let err = CompilationError::ParamCount {
            name: "max".into(),
            expected: 2,
            found: 3,
            span: Span::point(2, 5),
        };
        assert_eq!(err.to_string(), "at 2:5: 'max' takes 2 parameter(s), 3 given");
    }
}

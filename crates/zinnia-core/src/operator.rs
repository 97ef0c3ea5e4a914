//! The operator set of operator expression nodes.
//!
//! Every operator node carries one [`Operator`]. The category predicates group
//! operators the way the typing, folding and desugaring stages dispatch on them.

use std::fmt;

/// Operators of operator expression nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // === Conversions and scoping ===
    /// Semantic conversion `(T)x`.
    Cast,
    /// Bit reinterpretation, requires equal sizes.
    Reinterpret,
    /// `A::B`
    ScopeResolution,
    /// Runtime type test.
    Is,
    /// Checked conversion yielding the target type.
    As,

    // === Assignment ===
    /// `=`
    Assignment,
    /// `++`
    Increase,
    /// `--`
    Decrease,

    // === Composite ===
    /// `c ? a : b`
    Condition,
    /// `(a, b, c)`
    Tuple,
    /// `[a, b, c]`
    Array,
    /// `new T(args)`
    NewObject,
    /// `new T[n]`
    NewArray,

    // === References ===
    /// Reference whose target assignment state is not tracked.
    RefUnsafe,
    /// Reference to a variable that must already hold a value (`ref`).
    RefIdMustBeAssigned,
    /// Reference to a variable that the callee assigns (`out`).
    RefIdGetsAssigned,

    // === Access ===
    /// `f(args)`
    Call,
    /// `a[i]`, also dereference of pointers
    Index,
    /// `a.b`
    Member,

    // === Unary ===
    /// `+a`
    UnaryPlus,
    /// `-a`
    Negation,
    /// `!a`
    Not,
    /// `&a`
    Address,
    /// `~a`
    Complement,

    // === Comparison ===
    /// Reference identity `===`
    RefEquality,
    /// Reference non-identity `!==`
    RefInequality,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `==`
    Equality,
    /// `!=`
    Inequality,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,

    // === Logical ===
    /// `&&`
    And,
    /// `||`
    Or,

    // === Arithmetic ===
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,

    // === Shift ===
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,

    // === Bitwise ===
    /// `&`
    BitwiseAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    BitwiseXor,
}

impl Operator {
    /// Name of the user member function implementing this operator.
    pub const fn function_name(&self) -> &'static str {
        match self {
            Operator::Cast => "%Operator_Cast",
            Operator::Reinterpret => "%Operator_Reinterpret",
            Operator::ScopeResolution => "%Operator_ScopeResolution",
            Operator::Is => "%Operator_Is",
            Operator::As => "%Operator_As",
            Operator::Assignment => "%Operator_Assignment",
            Operator::Increase => "%Operator_Increase",
            Operator::Decrease => "%Operator_Decrease",
            Operator::Condition => "%Operator_Condition",
            Operator::Tuple => "%Operator_Tuple",
            Operator::Array => "%Operator_Array",
            Operator::NewObject => "%Operator_NewObject",
            Operator::NewArray => "%Operator_NewArray",
            Operator::RefUnsafe => "%Operator_RefUnsafe",
            Operator::RefIdMustBeAssigned => "%Operator_RefIdMustBeAssigned",
            Operator::RefIdGetsAssigned => "%Operator_RefIdGetsAssigned",
            Operator::Call => "%Operator_Call",
            Operator::Index => "%Operator_Index",
            Operator::Member => "%Operator_Member",
            Operator::UnaryPlus => "%Operator_UnaryPlus",
            Operator::Negation => "%Operator_Negation",
            Operator::Not => "%Operator_Not",
            Operator::Address => "%Operator_Address",
            Operator::Complement => "%Operator_Complement",
            Operator::RefEquality => "%Operator_RefEquality",
            Operator::RefInequality => "%Operator_RefInequality",
            Operator::Less => "%Operator_Less",
            Operator::Greater => "%Operator_Greater",
            Operator::Equality => "%Operator_Equality",
            Operator::Inequality => "%Operator_Inequality",
            Operator::LessEqual => "%Operator_LessEqual",
            Operator::GreaterEqual => "%Operator_GreaterEqual",
            Operator::And => "%Operator_And",
            Operator::Or => "%Operator_Or",
            Operator::Add => "%Operator_Add",
            Operator::Subtract => "%Operator_Subtract",
            Operator::Multiply => "%Operator_Multiply",
            Operator::Divide => "%Operator_Divide",
            Operator::Modulo => "%Operator_Modulo",
            Operator::ShiftLeft => "%Operator_ShiftLeft",
            Operator::ShiftRight => "%Operator_ShiftRight",
            Operator::BitwiseAnd => "%Operator_BitwiseAnd",
            Operator::BitwiseOr => "%Operator_BitwiseOr",
            Operator::BitwiseXor => "%Operator_BitwiseXor",
        }
    }

    /// Source spelling used in diagnostics.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Operator::Cast => "cast",
            Operator::Reinterpret => "reinterpret_cast",
            Operator::ScopeResolution => "::",
            Operator::Is => "is",
            Operator::As => "as",
            Operator::Assignment => "=",
            Operator::Increase => "++",
            Operator::Decrease => "--",
            Operator::Condition => "?:",
            Operator::Tuple => "(,)",
            Operator::Array => "[,]",
            Operator::NewObject => "new",
            Operator::NewArray => "new[]",
            Operator::RefUnsafe => "ref unsafe",
            Operator::RefIdMustBeAssigned => "ref",
            Operator::RefIdGetsAssigned => "out",
            Operator::Call => "()",
            Operator::Index => "[]",
            Operator::Member => ".",
            Operator::UnaryPlus | Operator::Add => "+",
            Operator::Negation | Operator::Subtract => "-",
            Operator::Not => "!",
            Operator::Address | Operator::BitwiseAnd => "&",
            Operator::Complement => "~",
            Operator::RefEquality => "===",
            Operator::RefInequality => "!==",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Equality => "==",
            Operator::Inequality => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::BitwiseOr => "|",
            Operator::BitwiseXor => "^",
        }
    }

    pub const fn is_reference(&self) -> bool {
        matches!(
            self,
            Operator::RefUnsafe | Operator::RefIdMustBeAssigned | Operator::RefIdGetsAssigned
        )
    }

    pub const fn is_new(&self) -> bool {
        matches!(self, Operator::NewArray | Operator::NewObject)
    }

    pub const fn is_ref_equality(&self) -> bool {
        matches!(self, Operator::RefEquality | Operator::RefInequality)
    }

    pub const fn is_inc_dec(&self) -> bool {
        matches!(self, Operator::Increase | Operator::Decrease)
    }

    pub const fn is_cast(&self) -> bool {
        matches!(self, Operator::Cast | Operator::Reinterpret)
    }

    pub const fn is_arithmetical(&self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Subtract
                | Operator::Multiply
                | Operator::Divide
                | Operator::Modulo
        )
    }

    pub const fn is_rel_equality(&self) -> bool {
        matches!(
            self,
            Operator::Equality
                | Operator::Inequality
                | Operator::Less
                | Operator::LessEqual
                | Operator::Greater
                | Operator::GreaterEqual
        )
    }

    pub const fn is_shift(&self) -> bool {
        matches!(self, Operator::ShiftLeft | Operator::ShiftRight)
    }

    pub const fn is_bitwise(&self) -> bool {
        matches!(
            self,
            Operator::BitwiseAnd | Operator::BitwiseOr | Operator::BitwiseXor
        )
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }

    pub const fn is_bit_arithm(&self) -> bool {
        self.is_arithmetical() || self.is_bitwise()
    }

    pub const fn is_bit_arithm_shift(&self) -> bool {
        self.is_arithmetical() || self.is_shift() || self.is_bitwise()
    }

    pub const fn is_bool_ret(&self) -> bool {
        self.is_logical() || self.is_rel_equality()
    }

    pub const fn is_bool_ret_bit_arithm_shift(&self) -> bool {
        self.is_bit_arithm_shift() || self.is_bool_ret()
    }

    /// Operators whose result has the type of their first operand.
    pub const fn is_same_type_return(&self) -> bool {
        self.is_bit_arithm_shift()
            || matches!(
                self,
                Operator::UnaryPlus | Operator::Negation | Operator::Complement
            )
    }

    /// Operators that a user type may implement with a `%Operator_<Name>` function.
    pub const fn can_be_op_function(&self) -> bool {
        self.is_bool_ret_bit_arithm_shift()
            || self.is_inc_dec()
            || matches!(
                self,
                Operator::Negation | Operator::UnaryPlus | Operator::Not | Operator::Complement
            )
    }

    /// Operators whose operands may be swapped, with a relation flip where needed.
    pub const fn is_reversible(&self) -> bool {
        matches!(self, Operator::Add | Operator::Multiply) || self.is_bitwise() || self.is_bool_ret()
    }

    /// Operators the evaluator can compute from constant operands.
    pub const fn is_calculable(&self) -> bool {
        self.is_bool_ret_bit_arithm_shift()
            || matches!(
                self,
                Operator::Negation
                    | Operator::UnaryPlus
                    | Operator::Not
                    | Operator::Complement
                    | Operator::Condition
            )
    }

    /// Whether the operator takes a single operand.
    pub const fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::UnaryPlus
                | Operator::Negation
                | Operator::Not
                | Operator::Address
                | Operator::Complement
                | Operator::Increase
                | Operator::Decrease
                | Operator::RefUnsafe
                | Operator::RefIdMustBeAssigned
                | Operator::RefIdGetsAssigned
        )
    }

    /// Logical negation of a boolean-returning operator.
    ///
    /// # Panics
    ///
    /// Panics for operators without a logical negation.
    pub fn negate(self) -> Operator {
        match self {
            Operator::And => Operator::Or,
            Operator::Or => Operator::And,
            Operator::Equality => Operator::Inequality,
            Operator::Inequality => Operator::Equality,
            Operator::Less => Operator::GreaterEqual,
            Operator::LessEqual => Operator::Greater,
            Operator::Greater => Operator::LessEqual,
            Operator::GreaterEqual => Operator::Less,
            other => panic!("operator {other:?} has no logical negation"),
        }
    }

    /// The relation that holds after swapping the operands (`a < b` is `b > a`).
    pub const fn mirrored(self) -> Operator {
        match self {
            Operator::Less => Operator::Greater,
            Operator::Greater => Operator::Less,
            Operator::LessEqual => Operator::GreaterEqual,
            Operator::GreaterEqual => Operator::LessEqual,
            other => other,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

//! Compilation settings shared by every stage.

use crate::types::{TypeId, TypeTable};

/// Integer overflow policy for constant folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckingMode {
    /// Wrap to the destination width; out-of-range casts of constants are
    /// reported.
    #[default]
    Default,
    /// Wrap silently, casts included.
    Unchecked,
    /// Report every fold whose result does not fit its type.
    Checked,
}

/// Settings of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Size of pointers and handles in bytes.
    pub pointer_size: u32,
    pub checking_mode: CheckingMode,
    /// Index operands are converted to an integer of this size and signedness.
    pub index_size: u8,
    pub index_signed: bool,
    /// Run the statement-level code checker on function bodies.
    pub check_code: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            checking_mode: CheckingMode::Default,
            index_size: 4,
            index_signed: true,
            check_code: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pointer_size(mut self, size: u32) -> Self {
        self.pointer_size = size;
        self
    }

    pub fn with_checking_mode(mut self, mode: CheckingMode) -> Self {
        self.checking_mode = mode;
        self
    }

    pub fn with_index_type(mut self, size: u8, signed: bool) -> Self {
        self.index_size = size;
        self.index_signed = signed;
        self
    }

    pub fn with_code_checking(mut self, enabled: bool) -> Self {
        self.check_code = enabled;
        self
    }

    /// The builtin integer type used for array indices.
    pub fn index_type(&self, types: &TypeTable) -> TypeId {
        types
            .integer(self.index_size, self.index_signed)
            .unwrap_or(types.builtins().int32)
    }

    /// A fresh type table using this configuration's pointer size.
    pub fn type_table(&self) -> TypeTable {
        TypeTable::new(self.pointer_size)
    }
}

/// Failure while evaluating an expression, before a line is attached.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("undefined label \"{0}\"")]
    UndefinedLabel(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression is not an immediate")]
    NotImmediate,
}

impl ExprError {
    pub fn at(self, line: usize) -> AsmError {
        match self {
            ExprError::UndefinedLabel(name) => AsmError::UndefinedLabel { name, line },
            ExprError::DivisionByZero => AsmError::DivisionByZero { line },
            ExprError::NotImmediate => AsmError::NotImmediate { line },
        }
    }
}

/// Fatal assembly diagnostic. Lines are 1-based.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: no match for instruction")]
    NoMatch { line: usize },
    #[error("line {line}: relocation failed for every candidate encoding")]
    RelocationFailed { line: usize },
    #[error("line {line}: undefined label \"{name}\"")]
    UndefinedLabel { name: String, line: usize },
    #[error("line {line}: division by zero")]
    DivisionByZero { line: usize },
    #[error("line {line}: expression is not an immediate")]
    NotImmediate { line: usize },
    #[error("line {line}: label \"{name}\" redeclared")]
    LabelRedeclared { name: String, line: usize },
    #[error("line {line}: misaligned 8-byte instruction and no predecessor form to realign it")]
    AlignmentUnshrinkable { line: usize },
    #[error("line {line}: wrong arguments for {directive}")]
    BadDirective { directive: String, line: usize },
    #[error("line {line}: unknown directive {directive}")]
    UnknownDirective { directive: String, line: usize },
    #[error("line {line}: argument {index} too large for {directive}")]
    DataOverflow { directive: String, index: usize, line: usize },
    #[error("line {line}: {count} encodings match, expected exactly one")]
    Ambiguous { count: usize, line: usize },
    #[error("line {line}: expected a resolved 8-byte encoding, got {oplen} bytes with {relocs} relocations")]
    NotAWord { oplen: usize, relocs: usize, line: usize },
}

impl AsmError {
    pub fn line(&self) -> usize {
        match self {
            AsmError::NoMatch { line }
            | AsmError::RelocationFailed { line }
            | AsmError::UndefinedLabel { line, .. }
            | AsmError::DivisionByZero { line }
            | AsmError::NotImmediate { line }
            | AsmError::LabelRedeclared { line, .. }
            | AsmError::AlignmentUnshrinkable { line }
            | AsmError::BadDirective { line, .. }
            | AsmError::UnknownDirective { line, .. }
            | AsmError::DataOverflow { line, .. }
            | AsmError::Ambiguous { line, .. }
            | AsmError::NotAWord { line, .. } => *line,
        }
    }
}

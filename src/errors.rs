use thiserror::Error;

use crate::bytecode::Word;

/// Errors that abort assembly. The first error wins and no machine code is produced.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AssemblyError {
  /// Source text that matches no statement of the grammar.
  #[error("syntax error on line {line}, column {column}: unexpected `{found}`")]
  Parse { line: usize, column: usize, found: String },
  /// A mnemonic with no form accepting the given operands.
  #[error("line {line}: `{mnemonic}` is not an instruction or its operands match none of its forms")]
  UnknownInstruction { line: usize, mnemonic: String },
  /// A name bound twice, by labels, constants, data blocks, or structs.
  #[error("duplicate binding: {0}")]
  DuplicateBinding(String),
  /// A `!name` reference with no binding.
  #[error("unresolved label: {0}")]
  UnresolvedLabel(String),
  /// `<Name>` names no struct.
  #[error("unresolved struct: {0}")]
  UnresolvedStruct(String),
  #[error("struct {structure} has no member {member}")]
  UnknownMember { structure: String, member: String },
  /// The base symbol of a struct-member address has no binding.
  #[error("unresolved symbol: {0}")]
  UnresolvedSymbol(String),
}

/// Errors raised by the memory mapper.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum MemoryError {
  #[error("no memory region mapped at address 0x{0:04x}")]
  NoRegionMapped(Word),
}

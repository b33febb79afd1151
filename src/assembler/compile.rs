/*!
  Two-pass assembly of one module.

  The pipeline is this:
  ```text
  text -> [`parse_program`] -> `Statement`s -> [pass 1: layout] -> `SymbolTable` ->⋯

  ⋯-> [pass 2: encode] -> machine code
  ```
  Pass 1 walks the statements with a cursor starting at the load offset, binding every label,
  constant, data block, and struct and advancing the cursor by the size of everything that
  occupies memory. Pass 2 walks the same statements again and emits bytes. Because every name is
  bound before any byte is emitted, forward references resolve like backward ones.

  Assembly is all or nothing: the first error aborts it and no machine code is returned.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use tracing::debug;

use crate::bytecode::{emit_byte, emit_word, render_machine_code, Byte, OperandKind, Radix, Word};
use crate::errors::AssemblyError;
use crate::symboltable::{Binding, StructLayout, SymbolTable};

use super::ast::{DataWidth, Operand, Statement};
use super::expression::{evaluate, parse_hex};
use super::parser::parse_program;

/// The result of assembling one module with [`process_module`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Module {
  /// Code and data, to be loaded at `load_offset`.
  pub machine_code : Vec<Byte>,
  /// Every label, constant, data block, and struct the module binds.
  pub symbols      : SymbolTable,
  /// Names bound with a leading `+`, in source order.
  pub exports      : Vec<DefaultAtom>,
  pub load_offset  : Word,
}

impl Module {
  /// The machine code as text in the given radix, e.g. `14 00 0A 00 50` for hex.
  pub fn render(&self, radix: Radix) -> String {
    render_machine_code(&self.machine_code, radix)
  }

  pub fn len(&self) -> usize {
    self.machine_code.len()
  }

  pub fn is_empty(&self) -> bool {
    self.machine_code.is_empty()
  }
}

impl Display for Module {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "% {} bytes at &{:04X}", self.machine_code.len(), self.load_offset)?;
    for (name, binding) in self.symbols.iter() {
      let export = match self.exports.contains(name) {
        true  => "+",
        false => " "
      };
      writeln!(f, "{}{:<16} {}", export, name, binding)?;
    }
    write!(f, "{}", self.render(Radix::Hex))
  }
}

/// Assembles `source` as if it will be loaded at `load_offset`: labels and data blocks are bound
/// to addresses relative to it.
pub fn process_module(source: &str, load_offset: Word) -> Result<Module, AssemblyError> {
  let statements = parse_program(source)?;

  let symbols      = layout(&statements, load_offset)?;
  let machine_code = encode(&statements, &symbols)?;
  let exports      = statements
    .iter()
    .filter(|statement| statement.is_exported())
    .filter_map(|statement| statement.binding_name().cloned())
    .collect();

  debug!(
    bytes   = machine_code.len(),
    symbols = symbols.len(),
    "assembled module at {:04X}", load_offset
  );

  Ok(Module { machine_code, symbols, exports, load_offset })
}

/// Pass 1. Binds names and computes addresses without emitting anything.
fn layout(statements: &[Statement], load_offset: Word) -> Result<SymbolTable, AssemblyError> {
  let mut symbols      = SymbolTable::new();
  let mut cursor: Word = load_offset;

  for statement in statements {
    match statement {

      Statement::Label { name, .. } => {
        debug!("label {} = {:04X}", name, cursor);
        symbols.insert(name.clone(), Binding::Address(cursor))?;
      }

      Statement::Constant { name, value, .. } => {
        let value = parse_hex(value);
        debug!("constant {} = {:04X}", name, value);
        symbols.insert(name.clone(), Binding::Value(value))?;
      }

      Statement::Data { name, width, values, .. } => {
        debug!("data {} = {:04X}", name, cursor);
        symbols.insert(name.clone(), Binding::Address(cursor))?;
        let size = width.size().wrapping_mul(values.len() as Word);
        cursor   = cursor.wrapping_add(size);
      }

      Statement::Struct { name, members, .. } => {
        let members: Vec<(DefaultAtom, Word)> =
          members.iter()
                 .map(|(member, size)| (member.clone(), parse_hex(size)))
                 .collect();
        let layout = StructLayout::new(name.clone(), &members);
        debug!("struct {} ({} bytes)", name, layout.size());
        symbols.insert_struct(layout)?;
      }

      Statement::Instruction { descriptor, .. } => {
        cursor = cursor.wrapping_add(descriptor.size as Word);
      }

    }
  }

  Ok(symbols)
}

/// Pass 2. Emits data and instructions in source order.
fn encode(statements: &[Statement], symbols: &SymbolTable) -> Result<Vec<Byte>, AssemblyError> {
  let mut code: Vec<Byte> = Vec::new();

  for statement in statements {
    match statement {

      Statement::Data { width, values, .. } => {
        for value in values {
          let value = parse_hex(value);
          match width {
            DataWidth::Byte => emit_byte(&mut code, value),
            DataWidth::Word => emit_word(&mut code, value),
          }
        }
      }

      Statement::Instruction { descriptor, args, .. } => {
        code.push(descriptor.opcode.code());
        for (kind, operand) in descriptor.format.operands().iter().zip(args) {
          encode_operand(&mut code, *kind, operand, symbols)?;
        }
      }

      // Symbol-only statements occupy no memory.
      Statement::Label { .. } | Statement::Constant { .. } | Statement::Struct { .. } => {}

    }
  }

  Ok(code)
}

fn encode_operand(code: &mut Vec<Byte>, kind: OperandKind, operand: &Operand, symbols: &SymbolTable)
  -> Result<(), AssemblyError>
{
  match (kind, operand) {

    (OperandKind::Register, Operand::Register(index))
    | (OperandKind::Pointer, Operand::Register(index)) => {
      code.push(*index);
    }

    (OperandKind::Literal8, Operand::Value(expr)) => {
      emit_byte(code, evaluate(expr, symbols)?);
    }

    (OperandKind::Literal, Operand::Value(expr))
    | (OperandKind::Address, Operand::Value(expr)) => {
      emit_word(code, evaluate(expr, symbols)?);
    }

    (kind, operand) => {
      unreachable!("The parser produced operand {} for a {} position.", operand, kind);
    }

  }
  Ok(())
}

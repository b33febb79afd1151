//! The abstract syntax of assembly source. Statements are produced by the parser in source
//! order, walked twice by the assembler, and dropped once the module is encoded.

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::bytecode::Descriptor;
use crate::register::register_name;

/// Binary operators of the expression sub-language.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Operator {
  Plus,
  Minus,
  Multiply,
}

impl Operator {
  /// Higher binds tighter. `+` and `-` share a level.
  pub fn priority(&self) -> u8 {
    match self {
      Operator::Multiply => 2,
      Operator::Plus | Operator::Minus => 1,
    }
  }
}

impl Display for Operator {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operator::Plus     => write!(f, "+"),
      Operator::Minus    => write!(f, "-"),
      Operator::Multiply => write!(f, "*"),
    }
  }
}

/// An unfolded operand/operator sequence as written between brackets: `head (op operand)*`.
/// The shape guarantees the sequence is non-empty and alternates.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ExprChain {
  pub head : Box<Expr>,
  pub tail : Vec<(Operator, Expr)>,
}

impl ExprChain {
  pub fn single(expr: Expr) -> ExprChain {
    ExprChain { head: Box::new(expr), tail: vec![] }
  }
}

/// A value-producing node.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Expr {
  /// `$HEX`, kept as source text until it is evaluated.
  HexLiteral(String),
  /// `&HEX`
  Address(String),
  /// `!name`, a label, data block, or constant.
  Variable(DefaultAtom),
  /// `<Struct> symbol.member`, the address of a member of the struct at `symbol`.
  InterpretAs {
    structure : DefaultAtom,
    symbol    : DefaultAtom,
    member    : DefaultAtom,
  },
  /// Produced by folding a chain by operator priority.
  BinaryOperation {
    operator : Operator,
    a        : Box<Expr>,
    b        : Box<Expr>,
  },
  /// `( ... )`
  Grouped(ExprChain),
  /// `[ ... ]`
  Bracket(ExprChain),
}

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Expr::HexLiteral(text) => write!(f, "${}", text),
      Expr::Address(text)    => write!(f, "&{}", text),
      Expr::Variable(name)   => write!(f, "!{}", name),
      Expr::InterpretAs { structure, symbol, member } => {
        write!(f, "<{}> {}.{}", structure, symbol, member)
      }
      Expr::BinaryOperation { operator, a, b } => write!(f, "({} {} {})", a, operator, b),
      Expr::Grouped(chain) => write!(f, "({})", chain),
      Expr::Bracket(chain) => write!(f, "[{}]", chain),
    }
  }
}

impl Display for ExprChain {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.head)?;
    for (operator, operand) in &self.tail {
      write!(f, " {} {}", operator, operand)?;
    }
    Ok(())
  }
}

/// An instruction operand. Its width in machine code comes from the instruction's format.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Operand {
  /// A register slot index.
  Register(u8),
  Value(Expr),
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operand::Register(index) => write!(f, "{}", register_name(*index).unwrap_or("r?")),
      Operand::Value(expr)     => write!(f, "{}", expr),
    }
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum DataWidth {
  Byte,
  Word,
}

impl DataWidth {
  pub fn size(&self) -> u16 {
    match self {
      DataWidth::Byte => 1,
      DataWidth::Word => 2,
    }
  }
}

/// A top level statement.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Statement {
  Instruction {
    descriptor : Descriptor,
    args       : Vec<Operand>,
    /// 1-based source line, for diagnostics.
    line       : usize,
  },
  /// `name:`
  Label {
    name     : DefaultAtom,
    exported : bool,
  },
  /// `constant NAME = $HEX`
  Constant {
    name     : DefaultAtom,
    exported : bool,
    value    : String,
  },
  /// `data8 NAME = { $HEX, ... }` or `data16 ...`
  Data {
    name     : DefaultAtom,
    exported : bool,
    width    : DataWidth,
    values   : Vec<String>,
  },
  /// `struct NAME { member: $SIZE, ... }`
  Struct {
    name     : DefaultAtom,
    exported : bool,
    members  : Vec<(DefaultAtom, String)>,
  },
}

impl Statement {
  /// The name the statement binds, if any.
  pub fn binding_name(&self) -> Option<&DefaultAtom> {
    match self {
      Statement::Instruction { .. } => None,

      | Statement::Label    { name, .. }
      | Statement::Constant { name, .. }
      | Statement::Data     { name, .. }
      | Statement::Struct   { name, .. } => Some(name),
    }
  }

  pub fn is_exported(&self) -> bool {
    match self {
      Statement::Instruction { .. } => false,

      | Statement::Label    { exported, .. }
      | Statement::Constant { exported, .. }
      | Statement::Data     { exported, .. }
      | Statement::Struct   { exported, .. } => *exported,
    }
  }
}

impl Display for Statement {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let export = if self.is_exported() { "+" } else { "" };
    match self {
      Statement::Instruction { descriptor, args, .. } => {
        let args: Vec<String> = args.iter().map(Operand::to_string).collect();
        write!(f, "{}({})", descriptor.name, args.join(", "))
      }
      Statement::Label { name, .. } => write!(f, "{}{}:", export, name),
      Statement::Constant { name, value, .. } => {
        write!(f, "{}constant {} = ${}", export, name, value)
      }
      Statement::Data { name, width, values, .. } => {
        let keyword = match width {
          DataWidth::Byte => "data8",
          DataWidth::Word => "data16",
        };
        let values: Vec<String> = values.iter().map(|v| format!("${}", v)).collect();
        write!(f, "{}{} {} = {{ {} }}", export, keyword, name, values.join(", "))
      }
      Statement::Struct { name, members, .. } => {
        let members: Vec<String> =
          members.iter().map(|(member, size)| format!("{}: ${}", member, size)).collect();
        write!(f, "{}struct {} {{ {} }}", export, name, members.join(", "))
      }
    }
  }
}

/*!
  Assembly source to machine code.

  [`parse_program`] turns text into `Statement`s, and [`process_module`] runs both assembly
  passes over them to produce a [`Module`]: the machine code, the symbols it binds, and the names
  it exports. Bracketed operand expressions are folded by [`disambiguate`] and resolved by
  [`evaluate`].
*/

mod ast;
mod compile;
mod expression;
mod parser;

pub use ast::{DataWidth, Expr, ExprChain, Operand, Operator, Statement};
pub use compile::{process_module, Module};
pub use expression::{disambiguate, evaluate, parse_hex};
pub use parser::parse_program;

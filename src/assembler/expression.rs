/*!
  Folding and evaluation of bracketed expressions.

  A bracket holds a flat, alternating operand/operator list. Folding repeatedly finds the
  leftmost operator of highest priority, replaces it and its two neighbors with a single
  `BinaryOperation`, and continues until one node remains. `*` outranks `+` and `-`, which rank
  equally, so operators of equal priority associate to the left. Evaluation is 16 bit and wraps.
*/

use crate::bytecode::Word;
use crate::errors::AssemblyError;
use crate::symboltable::SymbolTable;

use super::ast::{Expr, ExprChain, Operator};

/// Turns `Grouped` and `Bracket` nodes into `BinaryOperation` trees. Other nodes are returned as
/// they are.
pub fn disambiguate(expr: Expr) -> Expr {
  match expr {
    Expr::Grouped(chain) | Expr::Bracket(chain) => fold(chain),
    other => other
  }
}

fn fold(chain: ExprChain) -> Expr {
  let mut operands : Vec<Expr>     = Vec::with_capacity(chain.tail.len() + 1);
  let mut operators: Vec<Operator> = Vec::with_capacity(chain.tail.len());
  operands.push(*chain.head);
  for (operator, operand) in chain.tail {
    operators.push(operator);
    operands.push(operand);
  }

  while !operators.is_empty() {
    // `max_by_key` keeps the last maximum; we want the first.
    let mut position = 0;
    for (i, operator) in operators.iter().enumerate() {
      if operator.priority() > operators[position].priority() {
        position = i;
      }
    }

    let operator = operators.remove(position);
    let a        = operands.remove(position);
    let b        = operands.remove(position);
    operands.insert(position, Expr::BinaryOperation {
      operator,
      a: Box::new(disambiguate(a)),
      b: Box::new(disambiguate(b)),
    });
  }

  // A single element collapses to that element.
  match operands.pop() {
    Some(expr) => disambiguate(expr),
    None       => unreachable!("An expression chain always has a head.")
  }
}

/// Reads hex digits as a 16 bit value. Only the last four digits survive, as if the full value
/// had been masked to 16 bits. The grammar guarantees `text` holds only hex digits; anything else
/// is skipped.
pub fn parse_hex(text: &str) -> Word {
  text.chars()
      .filter_map(|c| c.to_digit(16))
      .fold(0, |value: Word, digit| (value << 4) | digit as Word)
}

/// Resolves an expression to its 16 bit value against the module's symbols.
pub fn evaluate(expr: &Expr, symbols: &SymbolTable) -> Result<Word, AssemblyError> {
  match expr {
    | Expr::HexLiteral(text)
    | Expr::Address(text) => Ok(parse_hex(text)),

    Expr::Variable(name) => {
      symbols.get_atom(name)
             .map(|binding| binding.value())
             .ok_or_else(|| AssemblyError::UnresolvedLabel(name.to_string()))
    }

    Expr::InterpretAs { structure, symbol, member } => {
      let layout = symbols.get_struct(structure)
                          .ok_or_else(|| AssemblyError::UnresolvedStruct(structure.to_string()))?;
      let member = layout.member(member)
                         .ok_or_else(|| AssemblyError::UnknownMember {
                           structure : structure.to_string(),
                           member    : member.to_string()
                         })?;
      let base   = symbols.get_atom(symbol)
                          .ok_or_else(|| AssemblyError::UnresolvedSymbol(symbol.to_string()))?;
      Ok(base.value().wrapping_add(member.offset))
    }

    Expr::BinaryOperation { operator, a, b } => {
      let a = evaluate(a, symbols)?;
      let b = evaluate(b, symbols)?;
      Ok(match operator {
        Operator::Plus     => a.wrapping_add(b),
        Operator::Minus    => a.wrapping_sub(b),
        Operator::Multiply => a.wrapping_mul(b),
      })
    }

    | Expr::Grouped(_)
    | Expr::Bracket(_) => evaluate(&disambiguate(expr.clone()), symbols),
  }
}


#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use string_cache::DefaultAtom;

  use super::*;
  use crate::symboltable::{Binding, StructLayout};

  fn hex(text: &str) -> Expr {
    Expr::HexLiteral(text.to_string())
  }

  fn chain(head: Expr, tail: Vec<(Operator, Expr)>) -> ExprChain {
    ExprChain { head: Box::new(head), tail }
  }

  fn binary(operator: Operator, a: Expr, b: Expr) -> Expr {
    Expr::BinaryOperation { operator, a: Box::new(a), b: Box::new(b) }
  }

  #[test]
  fn multiply_binds_tighter() {
    // [$2 + $3 * $4]
    let folded = disambiguate(Expr::Bracket(chain(
      hex("2"),
      vec![(Operator::Plus, hex("3")), (Operator::Multiply, hex("4"))]
    )));
    assert_eq!(
      folded,
      binary(Operator::Plus, hex("2"), binary(Operator::Multiply, hex("3"), hex("4")))
    );
    assert_eq!(evaluate(&folded, &SymbolTable::new()), Ok(0x0E));
  }

  #[test]
  fn plus_and_minus_associate_left() {
    // [$10 - $4 + $2] is (10 - 4) + 2, not 10 - (4 + 2).
    let folded = disambiguate(Expr::Bracket(chain(
      hex("10"),
      vec![(Operator::Minus, hex("4")), (Operator::Plus, hex("2"))]
    )));
    assert_eq!(
      folded,
      binary(Operator::Plus, binary(Operator::Minus, hex("10"), hex("4")), hex("2"))
    );
    assert_eq!(evaluate(&folded, &SymbolTable::new()), Ok(0x0E));
  }

  #[test]
  fn single_elements_collapse() {
    assert_eq!(disambiguate(Expr::Bracket(ExprChain::single(hex("7")))), hex("7"));
    // [($7)]
    let nested = Expr::Bracket(ExprChain::single(Expr::Grouped(ExprChain::single(hex("7")))));
    assert_eq!(disambiguate(nested), hex("7"));
  }

  #[test]
  fn groups_fold_inside_out() {
    // [($2 + $3) * $4]
    let group  = Expr::Grouped(chain(hex("2"), vec![(Operator::Plus, hex("3"))]));
    let folded = disambiguate(Expr::Bracket(chain(group, vec![(Operator::Multiply, hex("4"))])));
    assert_eq!(evaluate(&folded, &SymbolTable::new()), Ok(0x14));
  }

  #[test]
  fn arithmetic_wraps_at_sixteen_bits() {
    let expr = Expr::Bracket(chain(hex("FFFF"), vec![(Operator::Plus, hex("2"))]));
    assert_eq!(evaluate(&expr, &SymbolTable::new()), Ok(0x0001));
    let expr = Expr::Bracket(chain(hex("0"), vec![(Operator::Minus, hex("1"))]));
    assert_eq!(evaluate(&expr, &SymbolTable::new()), Ok(0xFFFF));
    assert_eq!(parse_hex("12345"), 0x2345);
    assert_eq!(parse_hex("aBc"), 0x0ABC);
  }

  #[test]
  fn variables_and_struct_members() {
    let mut symbols = SymbolTable::new();
    symbols.insert(DefaultAtom::from("rect"), Binding::Address(0x3000)).unwrap();
    symbols.insert(DefaultAtom::from("size"), Binding::Value(0x0010)).unwrap();
    symbols.insert_struct(StructLayout::new(
      DefaultAtom::from("Rect"),
      &[(DefaultAtom::from("x"), 2), (DefaultAtom::from("y"), 2)]
    )).unwrap();

    let member = |structure: &str, symbol: &str, member: &str| Expr::InterpretAs {
      structure : DefaultAtom::from(structure),
      symbol    : DefaultAtom::from(symbol),
      member    : DefaultAtom::from(member),
    };

    assert_eq!(evaluate(&member("Rect", "rect", "y"), &symbols), Ok(0x3002));
    assert_eq!(
      evaluate(&member("Circle", "rect", "y"), &symbols),
      Err(AssemblyError::UnresolvedStruct("Circle".to_string()))
    );
    assert_eq!(
      evaluate(&member("Rect", "rect", "z"), &symbols),
      Err(AssemblyError::UnknownMember { structure: "Rect".to_string(), member: "z".to_string() })
    );
    assert_eq!(
      evaluate(&member("Rect", "nowhere", "x"), &symbols),
      Err(AssemblyError::UnresolvedSymbol("nowhere".to_string()))
    );

    let sum = Expr::Bracket(chain(
      Expr::Variable(DefaultAtom::from("rect")),
      vec![(Operator::Plus, Expr::Variable(DefaultAtom::from("size")))]
    ));
    assert_eq!(evaluate(&sum, &symbols), Ok(0x3010));
    assert_eq!(
      evaluate(&Expr::Variable(DefaultAtom::from("missing")), &symbols),
      Err(AssemblyError::UnresolvedLabel("missing".to_string()))
    );
  }
}

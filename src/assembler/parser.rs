/*!

This module parses assembly source.

The language is given by the following EBNF:
```text
    <program>     ::=  <statement>*
    <statement>   ::=  <constant> | <data> | <struct> | <label> | <instruction>
    <constant>    ::=  '+'? 'constant' <identifier> '=' <hex_literal>
    <data>        ::=  '+'? ('data8' | 'data16') <identifier> '=' '{' (<hex_literal> ','?)* '}'
    <struct>      ::=  '+'? 'struct' <identifier> '{' (<identifier> ':' <hex_literal> ','?)* '}'
    <label>       ::=  '+'? <identifier> ':'
    <instruction> ::=  <mnemonic> (<operand> (',' <operand>)*)? <end_of_line>

    <literal>     ::=  <hex_literal> | <variable> | <bracket> | <interpret_as>
    <address>     ::=  '&' (<hex_digits> | <variable> | <bracket> | <interpret_as>)
    <register>    ::=  'ip' | 'acc' | 'r1' .. 'r8' | 'sp' | 'fp'
    <pointer>     ::=  '&' <register>

    <bracket>     ::=  '[' <chain> ']'
    <group>       ::=  '(' <chain> ')'
    <chain>       ::=  <leaf> (<operator> <leaf>)*
    <leaf>        ::=  <group> | <hex_literal> | <variable> | <interpret_as>
    <operator>    ::=  '+' | '-' | '*'

    <hex_literal>  ::= '$' <hex_digits>
    <variable>     ::= '!' <identifier>
    <interpret_as> ::= '<' <identifier> '>' <identifier> '.' <identifier>
    <identifier>   ::= [A-Za-z_] [A-Za-z0-9_]*
```

Special lexical forms, which are ignored between statements:
```text
    <comment>     ::= ';;' [^\n]* ('\n' | EOF)
    <whitespace>  ::= [ \t\r\n]+
```

Mnemonics and register names are case-insensitive. Which form of a mnemonic an instruction is
depends on the shape of its operands: every form registered for the mnemonic is tried in opcode
order and the first whose operands run to the end of the line is taken. The first syntax error
aborts parsing.

*/

use nom::{
  branch::alt,
  bytes::complete::{is_not, tag},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    hex_digit1,
    line_ending,
    multispace0,
    multispace1,
    space0,
    space1
  },
  combinator::{eof, map, map_opt, opt, peek, recognize, value},
  multi::{many0, many0_count, separated_list0},
  sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
  IResult
};
use string_cache::DefaultAtom;

use crate::bytecode::{forms_of, Descriptor, OperandKind};
use crate::errors::AssemblyError;
use crate::register::register_index;

use super::ast::{DataWidth, Expr, ExprChain, Operand, Operator, Statement};
use super::expression::disambiguate;

/// Parses a whole program into statements in source order.
pub fn parse_program(source: &str) -> Result<Vec<Statement>, AssemblyError> {
  let mut statements = Vec::new();
  let mut text       = source;

  loop {
    // Whitespace and comments never fail.
    if let Ok((rest, _)) = pskip(text) {
      text = rest;
    }
    if text.is_empty() {
      break;
    }

    let offset = source.len() - text.len();
    match pstatement(text, line_of(source, offset)) {
      Ok((rest, statement)) => {
        statements.push(statement);
        text = rest;
      }
      Err(_) => return Err(syntax_error(source, offset)),
    }
  }

  Ok(statements)
}

/// 1-based line number of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
  source[..offset].matches('\n').count() + 1
}

/// Describes the failure at `offset`. A known mnemonic whose operands fit none of its forms gets
/// its own error; anything else is a plain syntax error.
fn syntax_error(source: &str, offset: usize) -> AssemblyError {
  let text   = &source[offset..];
  let line   = line_of(source, offset);
  let column = offset - source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
  let found  = text.lines().next().unwrap_or("").trim_end().to_string();

  if let Ok((_, mnemonic)) = pidentifier(text) {
    if !forms_of(mnemonic).is_empty() {
      return AssemblyError::UnknownInstruction { line, mnemonic: mnemonic.to_string() };
    }
  }
  AssemblyError::Parse { line, column, found }
}

fn pstatement(text: &str, line: usize) -> IResult<&str, Statement> {
  alt((
    pconstant,
    pdata,
    pstruct,
    plabel,
    |i| pinstruction(i, line)
  ))(text)
}

// region Directives

fn pexported(text: &str) -> IResult<&str, bool> {
  map(opt(one_char('+')), |out| out.is_some())(text)
}

/// `constant NAME = $HEX`
fn pconstant(text: &str) -> IResult<&str, Statement> {
  map(
    tuple((
      pexported,
      terminated(tag("constant"), space1),
      pidentifier,
      delimited(space0, one_char('='), space0),
      phex_text
    )),
    |(exported, _, name, _, value)| Statement::Constant {
      name: DefaultAtom::from(name),
      exported,
      value: value.to_string()
    }
  )(text)
}

/// `data8 NAME = { $HEX, ... }` and `data16 NAME = { ... }`
fn pdata(text: &str) -> IResult<&str, Statement> {
  map(
    tuple((
      pexported,
      terminated(
        alt((
          value(DataWidth::Word, tag("data16")),
          value(DataWidth::Byte, tag("data8"))
        )),
        space1
      ),
      pidentifier,
      delimited(space0, one_char('='), space0),
      pbraced(phex_text)
    )),
    |(exported, width, name, _, values)| Statement::Data {
      name: DefaultAtom::from(name),
      exported,
      width,
      values: values.into_iter().map(str::to_string).collect()
    }
  )(text)
}

/// `struct NAME { member: $SIZE, ... }`
fn pstruct(text: &str) -> IResult<&str, Statement> {
  map(
    tuple((
      pexported,
      terminated(tag("struct"), space1),
      pidentifier,
      space0,
      pbraced(separated_pair(pidentifier, delimited(space0, one_char(':'), space0), phex_text))
    )),
    |(exported, _, name, _, members)| Statement::Struct {
      name: DefaultAtom::from(name),
      exported,
      members: members
        .into_iter()
        .map(|(member, size)| (DefaultAtom::from(member), size.to_string()))
        .collect()
    }
  )(text)
}

/// `{ item, item, ... }`, spanning lines, with comments and a trailing comma allowed.
fn pbraced<'a, O, F>(item: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
  where
    F: FnMut(&'a str) -> IResult<&'a str, O>
{
  delimited(
    pair(one_char('{'), pskip),
    terminated(
      separated_list0(delimited(pskip, one_char(','), pskip), item),
      opt(preceded(pskip, one_char(',')))
    ),
    pair(pskip, one_char('}'))
  )
}

/// `name:`
fn plabel(text: &str) -> IResult<&str, Statement> {
  map(
    pair(pexported, terminated(pidentifier, one_char(':'))),
    |(exported, name)| Statement::Label { name: DefaultAtom::from(name), exported }
  )(text)
}

// endregion

// region Instructions

/**
  `mnemonic operand, operand, ...` followed by the end of the line.

  Each form of the mnemonic is attempted in turn. A form only matches if its operands are
  followed by the end of the line, so `mov $1, &acc, r1` is not taken as `mov $1, &acc` with
  trailing garbage.
*/
fn pinstruction(text: &str, line: usize) -> IResult<&str, Statement> {
  let (rest, mnemonic) = pidentifier(text)?;

  for descriptor in forms_of(mnemonic) {
    if let Ok((rest, args)) = terminated(|i| poperands(i, descriptor), pend_of_line)(rest) {
      return Ok((rest, Statement::Instruction { descriptor: *descriptor, args, line }));
    }
  }

  Err(nom::Err::Error(nom::error::Error::new(text, nom::error::ErrorKind::Alt)))
}

/// Operands in the order and kinds the descriptor's format lists.
fn poperands<'a>(text: &'a str, descriptor: &Descriptor) -> IResult<&'a str, Vec<Operand>> {
  let kinds    = descriptor.format.operands();
  let mut args = Vec::with_capacity(kinds.len());
  let mut text = text;

  for (i, kind) in kinds.iter().enumerate() {
    let separator: IResult<&str, &str> = match i {
      0 => space1(text),
      _ => recognize(tuple((space0, one_char(','), space0)))(text),
    };
    let (rest, _)       = separator?;
    let (rest, operand) = poperand(rest, *kind)?;
    args.push(operand);
    text = rest;
  }

  Ok((text, args))
}

fn poperand(text: &str, kind: OperandKind) -> IResult<&str, Operand> {
  match kind {
    | OperandKind::Literal
    | OperandKind::Literal8 => map(pliteral, Operand::Value)(text),
    OperandKind::Address   => map(paddress, Operand::Value)(text),
    OperandKind::Register  => map(pregister, Operand::Register)(text),
    OperandKind::Pointer   => map(preceded(one_char('&'), pregister), Operand::Register)(text),
  }
}

/// Trailing spaces, then a comment, a line break, or the end of input. Only the spaces are
/// consumed.
fn pend_of_line(text: &str) -> IResult<&str, ()> {
  value(
    (),
    terminated(space0, peek(alt((line_ending, tag(";;"), eof))))
  )(text)
}

// endregion

// region Operands and expressions

fn pregister(text: &str) -> IResult<&str, u8> {
  map_opt(pidentifier, register_index)(text)
}

/// A value in literal position.
fn pliteral(text: &str) -> IResult<&str, Expr> {
  alt((phex_literal, pbracket, pvariable, pinterpret_as))(text)
}

/// A value in address position.
fn paddress(text: &str) -> IResult<&str, Expr> {
  preceded(
    one_char('&'),
    alt((
      map(hex_digit1, |out: &str| Expr::Address(out.to_string())),
      pbracket,
      pvariable,
      pinterpret_as
    ))
  )(text)
}

/// `[ chain ]`, folded by operator priority.
fn pbracket(text: &str) -> IResult<&str, Expr> {
  map(
    delimited(one_char('['), pchain, one_char(']')),
    |chain| disambiguate(Expr::Bracket(chain))
  )(text)
}

/// `( chain )`, left unfolded until the enclosing bracket folds.
fn pgroup(text: &str) -> IResult<&str, Expr> {
  map(delimited(one_char('('), pchain, one_char(')')), Expr::Grouped)(text)
}

fn pchain(text: &str) -> IResult<&str, ExprChain> {
  map(
    pair(
      ws(pleaf),
      many0(pair(ws(poperator), ws(pleaf)))
    ),
    |(head, tail)| ExprChain { head: Box::new(head), tail }
  )(text)
}

fn pleaf(text: &str) -> IResult<&str, Expr> {
  alt((pgroup, phex_literal, pvariable, pinterpret_as))(text)
}

fn poperator(text: &str) -> IResult<&str, Operator> {
  alt((
    value(Operator::Plus, one_char('+')),
    value(Operator::Minus, one_char('-')),
    value(Operator::Multiply, one_char('*'))
  ))(text)
}

fn phex_text(text: &str) -> IResult<&str, &str> {
  preceded(one_char('$'), hex_digit1)(text)
}

fn phex_literal(text: &str) -> IResult<&str, Expr> {
  map(phex_text, |out| Expr::HexLiteral(out.to_string()))(text)
}

fn pvariable(text: &str) -> IResult<&str, Expr> {
  map(preceded(one_char('!'), pidentifier), |out| Expr::Variable(DefaultAtom::from(out)))(text)
}

/// `<Struct> symbol.member`
fn pinterpret_as(text: &str) -> IResult<&str, Expr> {
  map(
    tuple((
      delimited(pair(one_char('<'), space0), pidentifier, pair(space0, one_char('>'))),
      preceded(space0, pidentifier),
      preceded(one_char('.'), pidentifier)
    )),
    |(structure, symbol, member)| Expr::InterpretAs {
      structure : DefaultAtom::from(structure),
      symbol    : DefaultAtom::from(symbol),
      member    : DefaultAtom::from(member),
    }
  )(text)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn pidentifier(text: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0_count(alt((alphanumeric1, tag("_"))))
    )
  )(text)
}

// endregion

// region Whitespace

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
  where
    F: FnMut(&'a str) -> IResult<&'a str, O>
{
  delimited(multispace0, inner, multispace0)
}

/// Skips whitespace and comments.
fn pskip(text: &str) -> IResult<&str, ()> {
  value((), many0_count(alt((value((), multispace1), pcomment))))(text)
}

/// `;; ...` to the end of the line.
fn pcomment(text: &str) -> IResult<&str, ()> {
  value((), pair(tag(";;"), opt(is_not("\n\r"))))(text)
}

// endregion

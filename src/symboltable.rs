use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::bytecode::Word;
use crate::errors::AssemblyError;

/// What a name is bound to: an address (labels and data blocks) or a plain value (constants).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Binding {
  Address(Word),
  Value(Word)
}

impl Binding {
  pub fn value(&self) -> Word {
    match self {
      Binding::Address(address) => *address,
      Binding::Value(value)     => *value
    }
  }
}

impl Display for Binding {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Binding::Address(address) => write!(f, "&{:04X}", address),
      Binding::Value(value)     => write!(f, "${:04X}", value)
    }
  }
}

/// One member of a struct layout.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StructMember {
  pub name   : DefaultAtom,
  pub offset : Word,
  pub size   : Word,
}

/// A compile-time record layout. Members are laid out in declaration order with no padding.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StructLayout {
  pub name    : DefaultAtom,
  pub members : Vec<StructMember>,
}

impl StructLayout {
  /// Lays out `(name, size)` pairs sequentially. Offsets wrap at 16 bits.
  pub fn new(name: DefaultAtom, members: &[(DefaultAtom, Word)]) -> StructLayout {
    let mut offset: Word = 0;
    let members = members.iter().map(|(member, size)| {
      let laid_out = StructMember { name: member.clone(), offset, size: *size };
      offset = offset.wrapping_add(*size);
      laid_out
    }).collect();
    StructLayout { name, members }
  }

  pub fn member(&self, name: &DefaultAtom) -> Option<&StructMember> {
    self.members.iter().find(|member| member.name == *name)
  }

  /// Total size of the layout in bytes.
  pub fn size(&self) -> Word {
    self.members.iter().fold(0, |total, member| total.wrapping_add(member.size))
  }
}

/**
  The names bound while assembling one module. Labels, constants, data blocks, and structs share
  a single namespace, so binding a name that is already a symbol or a struct fails with
  `DuplicateBinding`. The first binding of a name is the one that stands.
*/
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SymbolTable {
  symbols : HashMap<DefaultAtom, Binding>,
  structs : HashMap<DefaultAtom, StructLayout>,
  /// Names in the order they were bound.
  order   : Vec<DefaultAtom>,
}

impl SymbolTable {
  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  fn is_bound(&self, name: &DefaultAtom) -> bool {
    self.symbols.contains_key(name) || self.structs.contains_key(name)
  }

  pub fn insert(&mut self, name: DefaultAtom, binding: Binding) -> Result<(), AssemblyError> {
    if self.is_bound(&name) {
      return Err(AssemblyError::DuplicateBinding(name.to_string()));
    }
    self.order.push(name.clone());
    self.symbols.insert(name, binding);
    Ok(())
  }

  pub fn insert_struct(&mut self, layout: StructLayout) -> Result<(), AssemblyError> {
    if self.is_bound(&layout.name) {
      return Err(AssemblyError::DuplicateBinding(layout.name.to_string()));
    }
    self.order.push(layout.name.clone());
    self.structs.insert(layout.name.clone(), layout);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<Binding> {
    self.symbols.get(&DefaultAtom::from(name)).copied()
  }

  pub fn get_atom(&self, name: &DefaultAtom) -> Option<Binding> {
    self.symbols.get(name).copied()
  }

  pub fn get_struct(&self, name: &DefaultAtom) -> Option<&StructLayout> {
    self.structs.get(name)
  }

  /// The resolved value of a symbol, whether it is an address or a constant.
  pub fn value_of(&self, name: &str) -> Option<Word> {
    self.get(name).map(|binding| binding.value())
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Symbols (not structs) in binding order.
  pub fn iter(&self) -> impl Iterator<Item = (&DefaultAtom, Binding)> + '_ {
    self.order
        .iter()
        .filter_map(move |name| self.symbols.get(name).map(|binding| (name, *binding)))
  }

  pub fn structs(&self) -> impl Iterator<Item = &StructLayout> + '_ {
    self.order.iter().filter_map(move |name| self.structs.get(name))
  }
}

//! Register names and the register file. Each register is a 16 bit slot in a flat array; the
//! name to slot mapping is fixed and is also the index byte the assembler emits for a register
//! operand.

use std::fmt::{Display, Formatter};

use bimap::BiMap;

use crate::bytecode::Word;

/// Register names in slot order.
pub const REGISTER_NAMES: [&str; 12] = [
  "ip", "acc", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "sp", "fp"
];

pub const REGISTER_COUNT: usize = REGISTER_NAMES.len();

/// Slot indices of the registers the CPU addresses directly.
pub const IP : u8 = 0;
pub const ACC: u8 = 1;
pub const R1 : u8 = 2;
pub const R8 : u8 = 9;
pub const SP : u8 = 10;
pub const FP : u8 = 11;

lazy_static! {
  static ref REGISTER_TABLE: BiMap<&'static str, u8> =
    REGISTER_NAMES
      .iter()
      .enumerate()
      .map(|(i, name)| (*name, i as u8))
      .collect();
}

/// The slot index of a register name, matched case-insensitively.
pub fn register_index(name: &str) -> Option<u8> {
  match REGISTER_TABLE.get_by_left(name) {
    Some(index) => Some(*index),
    None        => REGISTER_TABLE.get_by_left(name.to_ascii_lowercase().as_str()).copied()
  }
}

pub fn register_name(index: u8) -> Option<&'static str> {
  REGISTER_TABLE.get_by_right(&index).copied()
}

/// The flat register array.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct RegisterFile {
  slots: [Word; REGISTER_COUNT]
}

impl RegisterFile {
  pub fn new() -> RegisterFile {
    RegisterFile::default()
  }

  /// Reads a slot. Out-of-range indices wrap around the register count, the same way a register
  /// byte in machine code is decoded.
  pub fn get(&self, index: u8) -> Word {
    self.slots[index as usize % REGISTER_COUNT]
  }

  pub fn set(&mut self, index: u8, value: Word) {
    self.slots[index as usize % REGISTER_COUNT] = value;
  }

  /// Panics if `name` is not a register. Register names come from the host program, never from
  /// machine code, so an unknown name is a bug in the caller.
  pub fn get_named(&self, name: &str) -> Word {
    match register_index(name) {
      Some(index) => self.get(index),
      None        => panic!("Error: get_register: no such register '{}'", name)
    }
  }

  /// Panics if `name` is not a register.
  pub fn set_named(&mut self, name: &str, value: Word) {
    match register_index(name) {
      Some(index) => self.set(index, value),
      None        => panic!("Error: set_register: no such register '{}'", name)
    }
  }

  /// `(name, value)` pairs in slot order.
  pub fn iter(&self) -> impl Iterator<Item = (&'static str, Word)> + '_ {
    REGISTER_NAMES.iter().copied().zip(self.slots.iter().copied())
  }
}

impl Display for RegisterFile {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let parts: Vec<String> =
      self.iter()
          .map(|(name, value)| format!("{}=0x{:04x}", name, value))
          .collect();
    write!(f, "{}", parts.join(" "))
  }
}

/*!
  Byte-level encoding shared by the assembler and the CPU. Words are two bytes, big-endian. A
  16-bit operand is written high byte first, an 8-bit operand is a single masked byte, and a
  register operand is a single slot-index byte.
*/

use std::fmt::Write;

use strum_macros::{Display as StrumDisplay, EnumString};

pub type Byte = u8;
pub type Word = u16;

/// Splits a word into its big-endian byte pair.
pub fn word_to_bytes(word: Word) -> [Byte; 2] {
  word.to_be_bytes()
}

pub fn bytes_to_word(high: Byte, low: Byte) -> Word {
  Word::from_be_bytes([high, low])
}

/// Appends a 16-bit operand.
pub fn emit_word(code: &mut Vec<Byte>, word: Word) {
  code.extend_from_slice(&word_to_bytes(word));
}

/// Appends an 8-bit operand, keeping only the low byte of `value`.
pub fn emit_byte(code: &mut Vec<Byte>, value: Word) {
  code.push((value & 0xFF) as Byte);
}

/// Output bases for inspecting machine code as text.
#[derive(StrumDisplay, EnumString, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Radix {
  Hex,
  Binary,
  Decimal,
}

/// Renders machine code as space separated bytes: `10 00 42 02` in hex.
pub fn render_machine_code(code: &[Byte], radix: Radix) -> String {
  let mut buffer = String::with_capacity(code.len() * 3);
  for (i, byte) in code.iter().enumerate() {
    if i != 0 {
      buffer.push(' ');
    }
    // Writing to a `String` cannot fail.
    let _ = match radix {
      Radix::Hex     => write!(buffer, "{:02X}", byte),
      Radix::Binary  => write!(buffer, "{:08b}", byte),
      Radix::Decimal => write!(buffer, "{}", byte),
    };
  }
  buffer
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn words_are_big_endian() {
    let mut code = vec![];
    emit_word(&mut code, 0x1234);
    emit_byte(&mut code, 0xABCD);
    assert_eq!(code, vec![0x12, 0x34, 0xCD]);
    assert_eq!(bytes_to_word(0x12, 0x34), 0x1234);
  }

  #[test]
  fn renders_each_radix() {
    let code = [0x10, 0x00, 0x42, 0x02];
    assert_eq!(render_machine_code(&code, Radix::Hex), "10 00 42 02");
    assert_eq!(render_machine_code(&code, Radix::Decimal), "16 0 66 2");
    assert_eq!(render_machine_code(&code[..2], Radix::Binary), "00010000 00000000");
    assert_eq!(render_machine_code(&[], Radix::Hex), "");
  }
}

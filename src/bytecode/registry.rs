/*!
  Lookup tables over the instruction set. The set is closed and known at compile time, so the
  tables are built once, on first use, from `Opcode::iter()`. Opcode lookup is a direct index into
  a 256 entry array; name and mnemonic lookups are hash lookups.
*/

use std::collections::HashMap;

use strum::IntoEnumIterator;

use super::instruction::{Descriptor, Opcode};

lazy_static! {
  static ref BY_OPCODE: [Option<Descriptor>; 256] = {
    let mut table = [None; 256];
    for opcode in Opcode::iter() {
      table[opcode.code() as usize] = Some(Descriptor::of(opcode));
    }
    table
  };

  static ref BY_NAME: HashMap<&'static str, Descriptor> =
    Opcode::iter()
      .map(|opcode| (opcode.name(), Descriptor::of(opcode)))
      .collect();

  // Forms sharing a mnemonic, in opcode order. The parser tries them in this order.
  static ref BY_MNEMONIC: HashMap<&'static str, Vec<Descriptor>> = {
    let mut table: HashMap<&'static str, Vec<Descriptor>> = HashMap::new();
    for opcode in Opcode::iter() {
      table.entry(opcode.mnemonic()).or_default().push(Descriptor::of(opcode));
    }
    table
  };
}

/// Looks up a descriptor by instruction name, e.g. `MOV_LIT_REG`.
pub fn lookup_by_mnemonic(name: &str) -> Option<&'static Descriptor> {
  BY_NAME.get(name)
}

/// Decodes an opcode byte. `None` for unassigned bytes.
pub fn lookup_by_opcode(byte: u8) -> Option<&'static Descriptor> {
  BY_OPCODE[byte as usize].as_ref()
}

/// Every form of a source mnemonic such as `mov`, matched case-insensitively.
pub fn forms_of(mnemonic: &str) -> &'static [Descriptor] {
  let found = match BY_MNEMONIC.get(mnemonic) {
    Some(forms) => Some(forms),
    None        => BY_MNEMONIC.get(mnemonic.to_ascii_lowercase().as_str())
  };
  match found {
    Some(forms) => forms.as_slice(),
    None        => &[]
  }
}

/// All descriptors in opcode order.
pub fn descriptors() -> impl Iterator<Item = &'static Descriptor> {
  BY_OPCODE.iter().filter_map(Option::as_ref)
}

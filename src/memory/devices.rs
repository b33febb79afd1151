//! Concrete devices: plain RAM, read-only memory, and a bank-switched window.

use std::cell::Cell;
use std::rc::Rc;

use super::Device;
use crate::bytecode::{bytes_to_word, word_to_bytes, Byte, Word};

/// Byte storage shared by the devices below. Addresses past the end wrap around the length,
/// so a device handed global addresses by an unremapped region still behaves.
#[derive(Clone, Debug)]
struct Bytes(Vec<Byte>);

impl Bytes {
  fn index(&self, address: Word) -> usize {
    address as usize % self.0.len()
  }

  fn get_uint8(&self, address: Word) -> Byte {
    self.0[self.index(address)]
  }

  fn get_uint16(&self, address: Word) -> Word {
    bytes_to_word(self.get_uint8(address), self.get_uint8(address.wrapping_add(1)))
  }

  fn set_uint8(&mut self, address: Word, value: Byte) {
    let index = self.index(address);
    self.0[index] = value;
  }

  fn set_uint16(&mut self, address: Word, value: Word) {
    let [high, low] = word_to_bytes(value);
    self.set_uint8(address, high);
    self.set_uint8(address.wrapping_add(1), low);
  }
}

/// Zero-initialized read/write memory.
#[derive(Clone, Debug)]
pub struct Ram {
  bytes: Bytes
}

impl Ram {
  /// A zero-length RAM is not useful, so the size is at least one byte.
  pub fn new(size: usize) -> Ram {
    Ram { bytes: Bytes(vec![0; size.max(1)]) }
  }

  pub fn len(&self) -> usize {
    self.bytes.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.0.is_empty()
  }
}

impl Device for Ram {
  fn get_uint8(&self, address: Word) -> Byte { self.bytes.get_uint8(address) }
  fn get_uint16(&self, address: Word) -> Word { self.bytes.get_uint16(address) }
  fn set_uint8(&mut self, address: Word, value: Byte) { self.bytes.set_uint8(address, value) }
  fn set_uint16(&mut self, address: Word, value: Word) { self.bytes.set_uint16(address, value) }
}

/// Memory fixed at construction. Writes are ignored.
#[derive(Clone, Debug)]
pub struct Rom {
  bytes: Bytes
}

impl Rom {
  pub fn new(image: &[Byte]) -> Rom {
    match image.is_empty() {
      true  => Rom { bytes: Bytes(vec![0]) },
      false => Rom { bytes: Bytes(image.to_vec()) }
    }
  }
}

impl Device for Rom {
  fn get_uint8(&self, address: Word) -> Byte { self.bytes.get_uint8(address) }
  fn get_uint16(&self, address: Word) -> Word { self.bytes.get_uint16(address) }
  fn set_uint8(&mut self, _address: Word, _value: Byte) {}
  fn set_uint16(&mut self, _address: Word, _value: Word) {}
}

/// Shared handle to the active bank of a `MemoryBank`. Cloning it gives another handle to the
/// same selection, so the host can switch banks while the mapper owns the device.
#[derive(Clone, Debug, Default)]
pub struct BankSelector(Rc<Cell<usize>>);

impl BankSelector {
  pub fn new() -> BankSelector {
    BankSelector::default()
  }

  pub fn select(&self, bank: usize) {
    self.0.set(bank);
  }

  pub fn current(&self) -> usize {
    self.0.get()
  }
}

/// `bank_count` banks of `bank_size` bytes behind one window. Device addresses index into the
/// selected bank; selections past the last bank wrap.
#[derive(Clone, Debug)]
pub struct MemoryBank {
  banks    : Vec<Bytes>,
  selector : BankSelector,
}

impl MemoryBank {
  pub fn new(bank_count: usize, bank_size: usize, selector: BankSelector) -> MemoryBank {
    MemoryBank {
      banks: vec![Bytes(vec![0; bank_size.max(1)]); bank_count.max(1)],
      selector
    }
  }

  fn bank(&self) -> &Bytes {
    &self.banks[self.selector.current() % self.banks.len()]
  }

  fn bank_mut(&mut self) -> &mut Bytes {
    let index = self.selector.current() % self.banks.len();
    &mut self.banks[index]
  }
}

impl Device for MemoryBank {
  fn get_uint8(&self, address: Word) -> Byte { self.bank().get_uint8(address) }
  fn get_uint16(&self, address: Word) -> Word { self.bank().get_uint16(address) }
  fn set_uint8(&mut self, address: Word, value: Byte) { self.bank_mut().set_uint8(address, value) }
  fn set_uint16(&mut self, address: Word, value: Word) { self.bank_mut().set_uint16(address, value) }
}

/*!
  The address space. Memory is not one buffer but a stack of regions, each routing a contiguous
  range of the 64 KiB space to a `Device`. Regions may overlap; the most recently mapped region
  containing an address wins.

  A region with `remap` set hands the device an address relative to the start of the region.
  Without it the device sees the global address, which devices whose behavior depends on where
  they are mapped need.
*/

mod devices;

pub use devices::{BankSelector, MemoryBank, Ram, Rom};

use tracing::debug;

use crate::bytecode::{Byte, Word};
use crate::errors::MemoryError;

/// Size of the address space in bytes.
pub const ADDRESS_SPACE_SIZE: u32 = 0x10000;

/// Anything that can sit behind a region of the address space.
pub trait Device {
  fn get_uint8(&self, address: Word) -> Byte;
  fn get_uint16(&self, address: Word) -> Word;
  fn set_uint8(&mut self, address: Word, value: Byte);
  fn set_uint16(&mut self, address: Word, value: Word);
}

/// Identifies one mapping for `MemoryMapper::unmap`.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct RegionHandle(u64);

struct Region {
  handle : RegionHandle,
  device : Box<dyn Device>,
  start  : u32,
  /// Exclusive.
  end    : u32,
  remap  : bool,
}

impl Region {
  fn contains(&self, address: Word) -> bool {
    let address = address as u32;
    self.start <= address && address < self.end
  }

  fn translate(&self, address: Word) -> Word {
    match self.remap {
      true  => (address as u32 - self.start) as Word,
      false => address
    }
  }
}

/// Routes reads and writes to the device mapped at each address.
#[derive(Default)]
pub struct MemoryMapper {
  /// Most recently mapped first.
  regions     : Vec<Region>,
  next_handle : u64,
}

impl MemoryMapper {
  pub fn new() -> MemoryMapper {
    MemoryMapper::default()
  }

  /**
    Maps `device` over `[start, start + size - 1]`, shadowing any older region it overlaps. The
    range is clipped to the end of the address space. A zero `size` maps no address at all, but
    still returns a handle. Returns the handle that removes exactly this region.
  */
  pub fn map(&mut self, device: Box<dyn Device>, start: Word, size: u32, remap: bool)
    -> RegionHandle
  {
    let handle = RegionHandle(self.next_handle);
    self.next_handle += 1;

    let start = start as u32;
    let end   = start.saturating_add(size).min(ADDRESS_SPACE_SIZE);
    debug!(start, end, remap, "mapping region {:?}", handle);

    self.regions.insert(0, Region { handle, device, start, end, remap });
    handle
  }

  /// Removes the region created by `handle` and gives its device back. Removing a region twice
  /// returns `None` the second time.
  pub fn unmap(&mut self, handle: RegionHandle) -> Option<Box<dyn Device>> {
    let position = self.regions.iter().position(|region| region.handle == handle)?;
    debug!("unmapping region {:?}", handle);
    Some(self.regions.remove(position).device)
  }

  pub fn region_count(&self) -> usize {
    self.regions.len()
  }

  fn find_region(&self, address: Word) -> Result<&Region, MemoryError> {
    self.regions
        .iter()
        .find(|region| region.contains(address))
        .ok_or(MemoryError::NoRegionMapped(address))
  }

  fn find_region_mut(&mut self, address: Word) -> Result<&mut Region, MemoryError> {
    self.regions
        .iter_mut()
        .find(|region| region.contains(address))
        .ok_or(MemoryError::NoRegionMapped(address))
  }

  pub fn get_uint8(&self, address: Word) -> Result<Byte, MemoryError> {
    let region = self.find_region(address)?;
    Ok(region.device.get_uint8(region.translate(address)))
  }

  pub fn get_uint16(&self, address: Word) -> Result<Word, MemoryError> {
    let region = self.find_region(address)?;
    Ok(region.device.get_uint16(region.translate(address)))
  }

  pub fn set_uint8(&mut self, address: Word, value: Byte) -> Result<(), MemoryError> {
    let region = self.find_region_mut(address)?;
    let local  = region.translate(address);
    region.device.set_uint8(local, value);
    Ok(())
  }

  pub fn set_uint16(&mut self, address: Word, value: Word) -> Result<(), MemoryError> {
    let region = self.find_region_mut(address)?;
    let local  = region.translate(address);
    region.device.set_uint16(local, value);
    Ok(())
  }

  /// Writes `bytes` starting at `address`, one byte at a time through whichever devices are
  /// mapped. Wraps at the end of the address space.
  pub fn load(&mut self, address: Word, bytes: &[Byte]) -> Result<(), MemoryError> {
    for (offset, byte) in bytes.iter().enumerate() {
      self.set_uint8(address.wrapping_add(offset as Word), *byte)?;
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use pretty_assertions::assert_eq;

  use super::*;

  /// Records every address it is handed.
  struct Recorder {
    seen: Rc<RefCell<Vec<Word>>>,
    tag : Byte,
  }

  impl Device for Recorder {
    fn get_uint8(&self, address: Word) -> Byte {
      self.seen.borrow_mut().push(address);
      self.tag
    }
    fn get_uint16(&self, address: Word) -> Word {
      self.seen.borrow_mut().push(address);
      self.tag as Word
    }
    fn set_uint8(&mut self, address: Word, _value: Byte) {
      self.seen.borrow_mut().push(address);
    }
    fn set_uint16(&mut self, address: Word, _value: Word) {
      self.seen.borrow_mut().push(address);
    }
  }

  fn recorder(tag: Byte) -> (Box<dyn Device>, Rc<RefCell<Vec<Word>>>) {
    let seen = Rc::new(RefCell::new(vec![]));
    (Box::new(Recorder { seen: seen.clone(), tag }), seen)
  }

  #[test]
  fn unmapped_access_fails() {
    let mut memory = MemoryMapper::new();
    assert_eq!(memory.get_uint8(0x10), Err(MemoryError::NoRegionMapped(0x10)));
    assert_eq!(memory.set_uint16(0x10, 1), Err(MemoryError::NoRegionMapped(0x10)));

    memory.map(Box::new(Ram::new(0x100)), 0x0000, 0x100, true);
    assert!(memory.get_uint8(0x00FF).is_ok());
    assert_eq!(memory.get_uint8(0x0100), Err(MemoryError::NoRegionMapped(0x0100)));
  }

  #[test]
  fn newest_region_shadows_older() {
    let mut memory = MemoryMapper::new();
    let (low, _)  = recorder(1);
    let (high, _) = recorder(2);
    memory.map(low, 0x0000, 0x10000, true);
    let handle = memory.map(high, 0x3000, 0x100, true);

    assert_eq!(memory.get_uint8(0x2FFF), Ok(1));
    assert_eq!(memory.get_uint8(0x3000), Ok(2));
    assert_eq!(memory.get_uint8(0x30FF), Ok(2));
    assert_eq!(memory.get_uint8(0x3100), Ok(1));

    assert!(memory.unmap(handle).is_some());
    assert_eq!(memory.get_uint8(0x3000), Ok(1));
    assert!(memory.unmap(handle).is_none());
    assert_eq!(memory.region_count(), 1);
  }

  #[test]
  fn remap_translates_to_device_offsets() {
    let mut memory = MemoryMapper::new();
    let (remapped, remapped_seen) = recorder(0);
    let (global, global_seen)     = recorder(0);
    memory.map(remapped, 0x1000, 0x100, true);
    memory.map(global, 0x2000, 0x100, false);

    memory.get_uint8(0x1004).unwrap();
    memory.set_uint16(0x10F0, 7).unwrap();
    memory.get_uint16(0x2004).unwrap();
    memory.set_uint8(0x20F0, 7).unwrap();

    assert_eq!(*remapped_seen.borrow(), vec![0x0004, 0x00F0]);
    assert_eq!(*global_seen.borrow(), vec![0x2004, 0x20F0]);
  }

  #[test]
  fn unmapping_an_inner_region_leaves_the_rest() {
    let mut memory = MemoryMapper::new();
    let (a, _) = recorder(1);
    let (b, _) = recorder(2);
    let (c, _) = recorder(3);
    memory.map(a, 0x0000, 0x10000, true);
    let middle = memory.map(b, 0x0000, 0x10000, true);
    memory.map(c, 0x8000, 0x10, true);

    memory.unmap(middle);
    assert_eq!(memory.get_uint8(0x0000), Ok(1));
    assert_eq!(memory.get_uint8(0x8000), Ok(3));
  }

  #[test]
  fn zero_sized_region_maps_nothing() {
    let mut memory = MemoryMapper::new();
    let (whole, _)       = recorder(1);
    let (empty, touched) = recorder(2);
    memory.map(whole, 0x0000, 0x10000, true);
    let handle = memory.map(empty, 0x0010, 0, true);

    assert_eq!(memory.get_uint8(0x000F), Ok(1));
    assert_eq!(memory.get_uint8(0x0010), Ok(1));
    assert_eq!(memory.set_uint16(0x0010, 0xFFFF), Ok(()));
    assert!(touched.borrow().is_empty());

    assert_eq!(memory.region_count(), 2);
    assert!(memory.unmap(handle).is_some());
    assert_eq!(memory.region_count(), 1);
  }

  #[test]
  fn region_reaches_the_last_address() {
    let mut memory = MemoryMapper::new();
    let (tail, _) = recorder(4);
    memory.map(tail, 0xFF00, 0x1000, true);

    assert_eq!(memory.get_uint8(0xFFFF), Ok(4));
    assert_eq!(memory.get_uint8(0xFEFF), Err(MemoryError::NoRegionMapped(0xFEFF)));
  }

  #[test]
  fn load_writes_through_devices() {
    let mut memory = MemoryMapper::new();
    memory.map(Box::new(Ram::new(0x10000)), 0x0000, 0x10000, true);
    memory.load(0x0050, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    assert_eq!(memory.get_uint16(0x0050), Ok(0xDEAD));
    assert_eq!(memory.get_uint16(0x0052), Ok(0xBEEF));
    assert_eq!(memory.get_uint8(0x0053), Ok(0xEF));
  }
}

/*!
  The CPU engine.

  The CPU owns its register file and the memory mapper it fetches through. Each `step` fetches
  one opcode byte at `ip` and executes it, fetching operands in exactly the order and widths the
  assembler encodes them (see `OperandFormat`). An instruction always runs to completion before
  the next is fetched.

  The stack grows down from `STACK_TOP`. Alongside `sp` and `fp` the CPU keeps a running count
  of the bytes pushed in the current frame. A call saves that count in the frame it pushes and a
  return uses it to find the caller's frame pointer, so it is part of the calling convention:

  ```text
    fp+24 ...   arguments pushed by the caller
    fp+22       argument count, pushed by the caller
    fp+20       r1
    ...
    fp+6        r8
    fp+4        return ip
    fp+2        caller frame size + 2
    fp = sp     next free word of the callee's frame
  ```
  `RET` unwinds from `fp`: it restores the frame size, `ip`, and `r8` down to `r1`, then pops the
  argument count and that many arguments.

  Unassigned opcodes are skipped rather than treated as errors: execution continues with the next
  byte. The only error execution can raise is an access to an address no device is mapped at.
*/

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use prettytable::{format as TableFormat, Table};
use tracing::trace;

use crate::bytecode::{Byte, Opcode, Word};
use crate::errors::MemoryError;
use crate::memory::MemoryMapper;
use crate::register::{RegisterFile, ACC, FP, IP, R1, R8, SP};

/// Initial `sp` and `fp`: the last word of the address space.
pub const STACK_TOP: Word = 0xFFFE;

/// Instructions executed by `Cpu::run` between checks of its `StopToken`.
pub const RUN_SLICE: usize = 1024;

/// Number of stack words shown in the state table.
const STACK_WINDOW: usize = 8;

/// How a bounded or cancellable run ended.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum RunState {
  /// `HLT` was executed.
  Halted,
  /// The `StopToken` was triggered.
  Stopped,
  /// The step budget ran out before either of the above.
  Running,
}

/// Stops a `Cpu::run` from another thread. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
  flag: Arc<AtomicBool>
}

impl StopToken {
  pub fn new() -> StopToken {
    StopToken::default()
  }

  pub fn stop(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }
}

pub struct Cpu {
  registers        : RegisterFile,
  memory           : MemoryMapper,
  /// Bytes pushed since the current frame was entered.
  stack_frame_size : Word,
  halted           : bool,
}

impl Cpu {

  // region Construction and inspection

  /// A CPU fetching through `memory`, with `sp = fp = STACK_TOP` and every other register zero.
  pub fn new(memory: MemoryMapper) -> Cpu {
    let mut registers = RegisterFile::new();
    registers.set(SP, STACK_TOP);
    registers.set(FP, STACK_TOP);

    Cpu {
      registers,
      memory,
      stack_frame_size : 0,
      halted           : false,
    }
  }

  /// Panics if `name` is not a register.
  pub fn get_register(&self, name: &str) -> Word {
    self.registers.get_named(name)
  }

  /// Panics if `name` is not a register.
  pub fn set_register(&mut self, name: &str, value: Word) {
    self.registers.set_named(name, value);
  }

  pub fn registers(&self) -> &RegisterFile {
    &self.registers
  }

  pub fn memory(&self) -> &MemoryMapper {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut MemoryMapper {
    &mut self.memory
  }

  pub fn is_halted(&self) -> bool {
    self.halted
  }

  /// `count` bytes starting at `address`, wrapping at the end of the address space.
  pub fn view_memory_at(&self, address: Word, count: usize) -> Result<Vec<Byte>, MemoryError> {
    (0..count)
      .map(|offset| self.memory.get_uint8(address.wrapping_add(offset as Word)))
      .collect()
  }

  // endregion

  // region Fetch and stack

  /// Reads the byte at `ip` and advances `ip` past it.
  pub fn fetch(&mut self) -> Result<Byte, MemoryError> {
    let address = self.registers.get(IP);
    let value   = self.memory.get_uint8(address)?;
    self.registers.set(IP, address.wrapping_add(1));
    Ok(value)
  }

  /// Reads the big-endian word at `ip` and advances `ip` past it.
  pub fn fetch16(&mut self) -> Result<Word, MemoryError> {
    let address = self.registers.get(IP);
    let value   = self.memory.get_uint16(address)?;
    self.registers.set(IP, address.wrapping_add(2));
    Ok(value)
  }

  /// A register operand. Any byte names a register; it is reduced modulo the register count.
  fn fetch_register(&mut self) -> Result<u8, MemoryError> {
    self.fetch()
  }

  fn fetch_register_value(&mut self) -> Result<Word, MemoryError> {
    let index = self.fetch_register()?;
    Ok(self.registers.get(index))
  }

  fn push(&mut self, value: Word) -> Result<(), MemoryError> {
    let sp = self.registers.get(SP);
    self.memory.set_uint16(sp, value)?;
    self.registers.set(SP, sp.wrapping_sub(2));
    self.stack_frame_size = self.stack_frame_size.wrapping_add(2);
    Ok(())
  }

  fn pop(&mut self) -> Result<Word, MemoryError> {
    let sp = self.registers.get(SP).wrapping_add(2);
    self.registers.set(SP, sp);
    self.stack_frame_size = self.stack_frame_size.wrapping_sub(2);
    self.memory.get_uint16(sp)
  }

  /// Saves the caller's registers, return address, and frame size, and opens a new frame.
  fn push_state(&mut self) -> Result<(), MemoryError> {
    for index in R1..=R8 {
      self.push(self.registers.get(index))?;
    }
    self.push(self.registers.get(IP))?;
    self.push(self.stack_frame_size.wrapping_add(2))?;

    self.registers.set(FP, self.registers.get(SP));
    self.stack_frame_size = 0;
    Ok(())
  }

  /// Unwinds the frame at `fp`, including the caller's arguments.
  fn pop_state(&mut self) -> Result<(), MemoryError> {
    let frame_pointer = self.registers.get(FP);
    self.registers.set(SP, frame_pointer);

    self.stack_frame_size = self.pop()?;
    let frame_size        = self.stack_frame_size;

    let ip = self.pop()?;
    self.registers.set(IP, ip);
    for index in (R1..=R8).rev() {
      let value = self.pop()?;
      self.registers.set(index, value);
    }

    let argument_count = self.pop()?;
    for _ in 0..argument_count {
      self.pop()?;
    }

    self.registers.set(FP, frame_pointer.wrapping_add(frame_size));
    Ok(())
  }

  // endregion

  // region Execution

  /**
    Executes the instruction whose opcode byte has just been fetched. Returns `true` for `HLT`
    and `false` for everything else, including bytes that are not opcodes.
  */
  pub fn execute(&mut self, byte: Byte) -> Result<bool, MemoryError> {
    let opcode = match Opcode::try_from(byte) {
      Ok(opcode) => opcode,
      Err(_)     => {
        trace!("skipping unassigned opcode {:02X}", byte);
        return Ok(false);
      }
    };
    trace!(ip = self.registers.get(IP), "{}", opcode);

    match opcode {

      // 16 bit moves //

      Opcode::MovLitReg => {
        let value = self.fetch16()?;
        let r     = self.fetch_register()?;
        self.registers.set(r, value);
      }

      Opcode::MovRegReg => {
        let value = self.fetch_register_value()?;
        let r     = self.fetch_register()?;
        self.registers.set(r, value);
      }

      Opcode::MovRegMem => {
        let value   = self.fetch_register_value()?;
        let address = self.fetch16()?;
        self.memory.set_uint16(address, value)?;
      }

      Opcode::MovMemReg => {
        let address = self.fetch16()?;
        let r       = self.fetch_register()?;
        let value   = self.memory.get_uint16(address)?;
        self.registers.set(r, value);
      }

      Opcode::MovLitMem => {
        let value   = self.fetch16()?;
        let address = self.fetch16()?;
        self.memory.set_uint16(address, value)?;
      }

      Opcode::MovRegPtrReg => {
        let address = self.fetch_register_value()?;
        let r       = self.fetch_register()?;
        let value   = self.memory.get_uint16(address)?;
        self.registers.set(r, value);
      }

      Opcode::MovLitOffReg => {
        let offset  = self.fetch16()?;
        let base    = self.fetch_register_value()?;
        let r       = self.fetch_register()?;
        let value   = self.memory.get_uint16(offset.wrapping_add(base))?;
        self.registers.set(r, value);
      }

      Opcode::MovRegRegPtr => {
        let value   = self.fetch_register_value()?;
        let address = self.fetch_register_value()?;
        self.memory.set_uint16(address, value)?;
      }

      // 8 bit moves //

      Opcode::Mov8LitReg => {
        let value = self.fetch()?;
        let r     = self.fetch_register()?;
        self.registers.set(r, value as Word);
      }

      Opcode::Mov8LitMem => {
        let value   = self.fetch()?;
        let address = self.fetch16()?;
        self.memory.set_uint8(address, value)?;
      }

      Opcode::Mov8MemReg => {
        let address = self.fetch16()?;
        let r       = self.fetch_register()?;
        let value   = self.memory.get_uint8(address)?;
        self.registers.set(r, value as Word);
      }

      Opcode::Mov8RegPtrReg => {
        let address = self.fetch_register_value()?;
        let r       = self.fetch_register()?;
        let value   = self.memory.get_uint8(address)?;
        self.registers.set(r, value as Word);
      }

      Opcode::MovlRegMem => {
        let value   = self.fetch_register_value()?;
        let address = self.fetch16()?;
        self.memory.set_uint8(address, (value & 0xFF) as Byte)?;
      }

      Opcode::MovhRegMem => {
        let value   = self.fetch_register_value()?;
        let address = self.fetch16()?;
        self.memory.set_uint8(address, (value >> 8) as Byte)?;
      }

      // Arithmetic //

      Opcode::AddRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a.wrapping_add(b));
      }

      Opcode::AddLitReg => {
        let a = self.fetch16()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a.wrapping_add(b));
      }

      Opcode::SubLitReg => {
        let literal = self.fetch16()?;
        let value   = self.fetch_register_value()?;
        self.registers.set(ACC, literal.wrapping_sub(value));
      }

      Opcode::SubRegLit => {
        let value   = self.fetch_register_value()?;
        let literal = self.fetch16()?;
        self.registers.set(ACC, value.wrapping_sub(literal));
      }

      Opcode::SubRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a.wrapping_sub(b));
      }

      Opcode::MulLitReg => {
        let a = self.fetch16()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a.wrapping_mul(b));
      }

      Opcode::MulRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a.wrapping_mul(b));
      }

      // Shifts, in place //

      Opcode::LsfRegLit => {
        let r      = self.fetch_register()?;
        let amount = self.fetch()? as Word;
        self.shift_in_place(r, amount, Word::checked_shl);
      }

      Opcode::LsfRegReg => {
        let r      = self.fetch_register()?;
        let amount = self.fetch_register_value()?;
        self.shift_in_place(r, amount, Word::checked_shl);
      }

      Opcode::RsfRegLit => {
        let r      = self.fetch_register()?;
        let amount = self.fetch()? as Word;
        self.shift_in_place(r, amount, Word::checked_shr);
      }

      Opcode::RsfRegReg => {
        let r      = self.fetch_register()?;
        let amount = self.fetch_register_value()?;
        self.shift_in_place(r, amount, Word::checked_shr);
      }

      // Bitwise, result in `acc` //

      Opcode::AndRegLit => {
        let value   = self.fetch_register_value()?;
        let literal = self.fetch16()?;
        self.registers.set(ACC, value & literal);
      }

      Opcode::AndRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a & b);
      }

      Opcode::OrRegLit => {
        let value   = self.fetch_register_value()?;
        let literal = self.fetch16()?;
        self.registers.set(ACC, value | literal);
      }

      Opcode::OrRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a | b);
      }

      Opcode::XorRegLit => {
        let value   = self.fetch_register_value()?;
        let literal = self.fetch16()?;
        self.registers.set(ACC, value ^ literal);
      }

      Opcode::XorRegReg => {
        let a = self.fetch_register_value()?;
        let b = self.fetch_register_value()?;
        self.registers.set(ACC, a ^ b);
      }

      Opcode::Not => {
        let value = self.fetch_register_value()?;
        self.registers.set(ACC, !value);
      }

      // In place //

      Opcode::IncReg => {
        let r = self.fetch_register()?;
        self.registers.set(r, self.registers.get(r).wrapping_add(1));
      }

      Opcode::DecReg => {
        let r = self.fetch_register()?;
        self.registers.set(r, self.registers.get(r).wrapping_sub(1));
      }

      // Stack and subroutines //

      Opcode::PshLit => {
        let value = self.fetch16()?;
        self.push(value)?;
      }

      Opcode::PshReg => {
        let value = self.fetch_register_value()?;
        self.push(value)?;
      }

      Opcode::Pop => {
        let r     = self.fetch_register()?;
        let value = self.pop()?;
        self.registers.set(r, value);
      }

      Opcode::CalLit => {
        let target = self.fetch16()?;
        self.push_state()?;
        self.registers.set(IP, target);
      }

      Opcode::CalReg => {
        let target = self.fetch_register_value()?;
        self.push_state()?;
        self.registers.set(IP, target);
      }

      Opcode::Ret => {
        self.pop_state()?;
      }

      // Branches //

      Opcode::JmpAddr => {
        let target = self.fetch16()?;
        self.registers.set(IP, target);
      }

      Opcode::JeqReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l == a)?; }
      Opcode::JeqLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l == a)?; }
      Opcode::JneReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l != a)?; }
      Opcode::JneLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l != a)?; }
      Opcode::JltReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l <  a)?; }
      Opcode::JltLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l <  a)?; }
      Opcode::JgtReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l >  a)?; }
      Opcode::JgtLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l >  a)?; }
      Opcode::JleReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l <= a)?; }
      Opcode::JleLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l <= a)?; }
      Opcode::JgeReg => { let left = self.fetch_register_value()?; self.branch(left, |l, a| l >= a)?; }
      Opcode::JgeLit => { let left = self.fetch16()?;              self.branch(left, |l, a| l >= a)?; }

      Opcode::Hlt => {
        self.halted = true;
        return Ok(true);
      }

    } // end match on opcode

    Ok(false)
  }

  /// Shifts register `r` by `amount`. Shifting a word by 16 or more clears it.
  fn shift_in_place(&mut self, r: u8, amount: Word, shift: fn(Word, u32) -> Option<Word>) {
    let value = shift(self.registers.get(r), amount as u32).unwrap_or(0);
    self.registers.set(r, value);
  }

  /// Fetches the target address and jumps to it if `relation(left, acc)` holds.
  fn branch(&mut self, left: Word, relation: fn(Word, Word) -> bool) -> Result<(), MemoryError> {
    let target = self.fetch16()?;
    if relation(left, self.registers.get(ACC)) {
      self.registers.set(IP, target);
    }
    Ok(())
  }

  /// Fetches and executes one instruction. Returns `true` once the CPU has halted; after that,
  /// further calls change nothing.
  pub fn step(&mut self) -> Result<bool, MemoryError> {
    if self.halted {
      return Ok(true);
    }

    let opcode = self.fetch()?;
    let halted = self.execute(opcode)?;

    #[cfg(feature = "trace_execution")] println!("{}", self);

    Ok(halted)
  }

  /// Executes at most `max_steps` instructions.
  pub fn run_for(&mut self, max_steps: usize) -> Result<RunState, MemoryError> {
    for _ in 0..max_steps {
      if self.step()? {
        return Ok(RunState::Halted);
      }
    }
    Ok(RunState::Running)
  }

  /**
    Runs until `HLT` or until `stop` is triggered, executing `RUN_SLICE` instructions at a time
    and yielding the thread between slices. An instruction is never interrupted part way.

    This blocks the calling thread for the whole run. Only another thread holding a clone of
    `stop` can end a program that never halts. Callers that must not block should drive the
    machine themselves with `run_for`, one bounded slice at a time.
  */
  pub fn run(&mut self, stop: &StopToken) -> Result<RunState, MemoryError> {
    loop {
      if stop.is_stopped() {
        return Ok(RunState::Stopped);
      }
      match self.run_for(RUN_SLICE)? {
        RunState::Running => thread::yield_now(),
        finished          => return Ok(finished),
      }
    }
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Value"]);

    for (name, value) in self.registers.iter() {
      table.add_row(row![r->format!("{} =", name), format!("0x{:04x}", value)]);
    }
    table
  }

  /// The words from `sp` upward, `sp` itself marked.
  fn make_stack_table(&self) -> Table {
    let sp        = self.registers.get(SP);
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for i in 0..STACK_WINDOW {
      let address = sp.wrapping_add(2 * i as Word);
      if address < sp {
        break;
      }
      let contents = match self.memory.get_uint16(address) {
        Ok(value) => format!("0x{:04x}", value),
        Err(_)    => "--".to_string()
      };
      match address == sp {
        true  => table.add_row(row![r->format!("sp --> {:04x} =", address), contents]),
        false => table.add_row(row![r->format!("{:04x} =", address), contents]),
      };
    }
    table
  }

  // endregion
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Cpu {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let stack_table    = self.make_stack_table();

    let mut combined_table = table!([register_table, stack_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match self.halted {
      true  => "Halted.",
      false => "Running."
    };

    write!(f, "{}\tframe size: {}\n{}", state, self.stack_frame_size, combined_table)
  }
}


#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::assembler::process_module;
  use crate::memory::{Ram, ADDRESS_SPACE_SIZE};

  fn machine() -> Cpu {
    let mut memory = MemoryMapper::new();
    memory.map(Box::new(Ram::new(ADDRESS_SPACE_SIZE as usize)), 0, ADDRESS_SPACE_SIZE, true);
    Cpu::new(memory)
  }

  fn load(cpu: &mut Cpu, source: &str, address: Word) {
    let module = process_module(source, address).unwrap();
    cpu.memory_mut().load(address, &module.machine_code).unwrap();
  }

  fn run(source: &str, steps: usize) -> Cpu {
    let mut cpu = machine();
    load(&mut cpu, source, 0);
    cpu.run_for(steps).unwrap();
    cpu
  }

  #[test]
  fn initial_state() {
    let cpu = machine();
    assert_eq!(cpu.get_register("sp"), 0xFFFE);
    assert_eq!(cpu.get_register("fp"), 0xFFFE);
    assert_eq!(cpu.get_register("ip"), 0);
    assert_eq!(cpu.get_register("acc"), 0);
  }

  #[test]
  fn mov_lit_reg() {
    let mut cpu = machine();
    cpu.memory_mut().load(0, &[0x10, 0x12, 0x34, 0x02]).unwrap();
    assert_eq!(cpu.step(), Ok(false));
    assert_eq!(cpu.get_register("r1"), 0x1234);
    assert_eq!(cpu.get_register("ip"), 4);
  }

  #[test]
  fn call_and_return_restore_the_caller() {
    let mut cpu = machine();
    load(&mut cpu, "
      psh $3333
      psh $2222
      psh $1111
      mov $1234, r1
      mov $5678, r4
      psh $0000
      cal $3000
      psh $4444", 0);
    load(&mut cpu, "
      psh $0102
      psh $0304
      psh $0506
      mov $0708, r1
      mov $090A, r8
      ret", 0x3000);

    assert_eq!(cpu.run_for(14), Ok(RunState::Running));
    assert_eq!(cpu.get_register("ip"), 0x001a);
    assert_eq!(cpu.get_register("r1"), 0x1234);
    assert_eq!(cpu.get_register("r4"), 0x5678);
    assert_eq!(cpu.get_register("r8"), 0x0000);
    assert_eq!(cpu.get_register("sp"), 0xfff6);
    assert_eq!(cpu.get_register("fp"), 0xfffe);
    assert_eq!(cpu.memory().get_uint16(0xfff8), Ok(0x4444));
    assert_eq!(cpu.memory().get_uint16(0xfffa), Ok(0x1111));
  }

  #[test]
  fn return_discards_call_arguments() {
    let mut cpu = machine();
    load(&mut cpu, "psh $AAAA\npsh $BBBB\npsh $0002\ncal $0100\nhlt", 0);
    load(&mut cpu, "ret", 0x0100);
    assert_eq!(cpu.run_for(10), Ok(RunState::Halted));
    assert_eq!(cpu.get_register("sp"), 0xFFFE);
    assert_eq!(cpu.get_register("fp"), 0xFFFE);
  }

  #[test]
  fn push_then_pop() {
    let values: [Word; 4] = [0x0000, 0x0001, 0x7FFF, 0xFFFF];
    for value in values {
      let cpu = run(&format!("psh ${:04X}\npop r3", value), 2);
      assert_eq!(cpu.get_register("r3"), value);
      assert_eq!(cpu.get_register("sp"), STACK_TOP);
    }
  }

  #[test]
  fn halt_is_idempotent() {
    let mut cpu = run("mov $0001, r1\nhlt\ninc r1", 2);
    assert!(cpu.is_halted());
    let registers = cpu.registers().clone();
    let memory    = cpu.view_memory_at(0, 8).unwrap();

    assert_eq!(cpu.step(), Ok(true));
    assert_eq!(cpu.step(), Ok(true));
    assert_eq!(cpu.registers(), &registers);
    assert_eq!(cpu.view_memory_at(0, 8).unwrap(), memory);
  }

  #[test]
  fn arithmetic_writes_acc_and_shifts_work_in_place() {
    let cpu = run("mov $0003, r1\nmov $0005, r2\nadd r1, r2\nand r1, r2\nxor r1, r2", 5);
    assert_eq!(cpu.get_register("acc"), 0x0006);
    assert_eq!(cpu.get_register("r1"), 0x0003);
    assert_eq!(cpu.get_register("r2"), 0x0005);

    let cpu = run("mov $0003, r1\nlsf r1, $04", 2);
    assert_eq!(cpu.get_register("r1"), 0x0030);
    assert_eq!(cpu.get_register("acc"), 0);

    let cpu = run("mov $8000, r1\nrsf r1, $0F", 2);
    assert_eq!(cpu.get_register("r1"), 0x0001);

    let cpu = run("mov $FFFF, r1\nmov $0010, r2\nlsf r1, r2", 3);
    assert_eq!(cpu.get_register("r1"), 0);
  }

  #[test]
  fn subtraction_order() {
    let cpu = run("mov $0003, r1\nsub $0010, r1", 2);
    assert_eq!(cpu.get_register("acc"), 0x000D);
    let cpu = run("mov $0003, r1\nsub r1, $0010", 2);
    assert_eq!(cpu.get_register("acc"), 0xFFF3);
    let cpu = run("mov $0100, r1\nmul $0100, r1\nnot r1", 2);
    assert_eq!(cpu.get_register("acc"), 0x0000);
    let cpu = run("mov $00F0, r1\nnot r1", 2);
    assert_eq!(cpu.get_register("acc"), 0xFF0F);
  }

  #[test]
  fn narrow_and_indirect_moves() {
    let cpu = run("
      mov $ABCD, r1
      movh r1, &0040
      movl r1, &0041
      mov &0040, r2
      mov8 &0041, r3
      mov $0040, r4
      mov8 &r4, r5
      mov $0001, &r4, r6
      mov $0050, r7
      mov r2, &r7
      mov &r4, r8", 11);
    assert_eq!(cpu.get_register("r2"), 0xABCD);
    assert_eq!(cpu.get_register("r3"), 0x00CD);
    assert_eq!(cpu.get_register("r5"), 0x00AB);
    assert_eq!(cpu.get_register("r6"), 0xCD00);
    assert_eq!(cpu.memory().get_uint16(0x0050), Ok(0xABCD));
    assert_eq!(cpu.get_register("r8"), 0xABCD);
  }

  #[test]
  fn branches_compare_against_acc() {
    let source = "
      mov $0005, acc
      jgt $0006, &[!taken]
      mov $0001, r1
    taken:
      jlt $0006, &[!skipped]
      mov $0002, r2
    skipped:
      hlt";
    let cpu = run(source, 10);
    assert!(cpu.is_halted());
    assert_eq!(cpu.get_register("r1"), 0);
    assert_eq!(cpu.get_register("r2"), 2);
  }

  /// Loads `source` after `mov $0005, r1` and steps it until `HLT`.
  fn step_to_halt(source: &str) -> Cpu {
    let mut cpu = machine();
    load(&mut cpu, &format!("mov $0005, r1\n{}\nhlt", source), 0);
    for _ in 0..32 {
      if cpu.step().unwrap() {
        return cpu;
      }
    }
    panic!("no HLT within 32 steps:\n{}", source);
  }

  #[test]
  fn every_operand_form_executes() {
    const TAKEN: Word        = 0;
    const FELL_THROUGH: Word = 1;

    let branch = |acc: &str, jump: &str| {
      format!("mov ${}, acc\n{}, &[!taken]\nmov $0001, r2\ntaken:", acc, jump)
    };

    // `r1` holds 5 in every program.
    let cases: Vec<(String, &str, Word)> = vec![
      (branch("0005", "jeq r1"),    "r2", TAKEN),
      (branch("0006", "jeq r1"),    "r2", FELL_THROUGH),
      (branch("0005", "jeq $0005"), "r2", TAKEN),
      (branch("0005", "jeq $0004"), "r2", FELL_THROUGH),
      (branch("0005", "jne r1"),    "r2", FELL_THROUGH),
      (branch("0006", "jne r1"),    "r2", TAKEN),
      (branch("0004", "jlt r1"),    "r2", FELL_THROUGH),
      (branch("0004", "jgt r1"),    "r2", TAKEN),
      (branch("0005", "jle r1"),    "r2", TAKEN),
      (branch("0004", "jle r1"),    "r2", FELL_THROUGH),
      (branch("0006", "jle $0006"), "r2", TAKEN),
      (branch("0005", "jle $0006"), "r2", FELL_THROUGH),
      (branch("0005", "jge r1"),    "r2", TAKEN),
      (branch("0006", "jge r1"),    "r2", FELL_THROUGH),
      (branch("0005", "jge $0005"), "r2", TAKEN),
      (branch("0006", "jge $0005"), "r2", FELL_THROUGH),

      ("mov !target, r5\ncal r5\nmov $0001, r2\nhlt\ntarget:\nmov $0007, r3".into(), "r3", 0x0007),
      ("psh r1\npop r2".into(),                   "r2",  0x0005),
      ("or r1, $0030".into(),                     "acc", 0x0035),
      ("mov $0030, r2\nor r1, r2".into(),         "acc", 0x0035),
      ("mov $0007, r2\nsub r1, r2".into(),        "acc", 0xFFFE),
      ("mov $0003, r2\nmul r1, r2".into(),        "acc", 0x000F),
      ("mov $00F0, r2\nrsf r2, r1".into(),        "r2",  0x0007),
      ("and r1, $0006".into(),                    "acc", 0x0004),
      ("xor r1, $000F".into(),                    "acc", 0x000A),
      ("mov $FFFF, r2\nmov8 $AB, r2".into(),      "r2",  0x00AB),
      ("mov8 $AB, &0051\nmov &0050, r2".into(),   "r2",  0x00AB),
    ];

    for (source, destination, expected) in &cases {
      let cpu = step_to_halt(source);
      assert_eq!(cpu.get_register(destination), *expected, "{}", source);
      assert_eq!(cpu.get_register("r1"), 0x0005, "{}", source);
    }
  }

  #[test]
  fn countdown_loop() {
    let source = "
      mov $0A, &0050
    loop:
      mov &0050, acc
      dec acc
      mov acc, &0050
      inc r2
      inc r2
      inc r2
      jne $00, &[!loop]
      hlt";
    let mut cpu = machine();
    load(&mut cpu, source, 0);
    assert_eq!(cpu.run(&StopToken::new()), Ok(RunState::Halted));
    assert_eq!(cpu.get_register("r2"), 30);
    assert_eq!(cpu.get_register("acc"), 0);
    assert_eq!(cpu.memory().get_uint16(0x0050), Ok(0));
  }

  #[test]
  fn unassigned_opcodes_are_skipped() {
    let mut cpu = machine();
    cpu.memory_mut().load(0, &[0x00, 0x27, 0xFF]).unwrap();
    assert_eq!(cpu.step(), Ok(false));
    assert_eq!(cpu.step(), Ok(false));
    assert_eq!(cpu.get_register("ip"), 2);
    assert_eq!(cpu.step(), Ok(true));
  }

  #[test]
  fn unmapped_access_is_an_error() {
    let mut memory = MemoryMapper::new();
    memory.map(Box::new(Ram::new(0x100)), 0, 0x100, true);
    let mut cpu = Cpu::new(memory);
    load(&mut cpu, "psh $0001", 0);
    assert_eq!(cpu.step(), Err(MemoryError::NoRegionMapped(0xFFFE)));
  }

  #[test]
  fn stop_token_ends_a_run() {
    let mut cpu = machine();
    load(&mut cpu, "spin:\njmp &[!spin]", 0);

    let stopped = StopToken::new();
    stopped.stop();
    assert_eq!(cpu.run(&stopped), Ok(RunState::Stopped));

    let token  = StopToken::new();
    let remote = token.clone();
    let handle = thread::spawn(move || {
      thread::sleep(std::time::Duration::from_millis(20));
      remote.stop();
    });
    assert_eq!(cpu.run(&token), Ok(RunState::Stopped));
    handle.join().unwrap();
    assert!(!cpu.is_halted());
  }

  #[test]
  fn run_for_hands_back_control_on_a_spinning_program() {
    let mut cpu = machine();
    load(&mut cpu, "spin:\njmp &[!spin]", 0);
    for _ in 0..3 {
      assert_eq!(cpu.run_for(RUN_SLICE), Ok(RunState::Running));
      assert_eq!(cpu.get_register("ip"), 0);
    }
    assert!(!cpu.is_halted());
  }

  #[test]
  fn state_table_lists_registers_and_stack() {
    let cpu  = run("psh $BEEF", 1);
    let text = format!("{}", cpu);
    assert!(text.contains("acc ="));
    assert!(text.contains("0xbeef"));
    assert!(text.contains("sp --> fffc ="));
  }

  #[test]
  #[should_panic(expected = "no such register")]
  fn unknown_register_name_panics() {
    machine().set_register("r9", 1);
  }
}

/*!
  A 16 bit virtual computer.

  The pieces, in the order a program flows through them:

  ```text
  source -> [`assembler::process_module`] -> `Module` ->⋯

  ⋯-> [`memory::MemoryMapper::load`] -> [`cpu::Cpu::run`] -> machine state
  ```
  [`bytecode`] defines the instruction set the assembler and the CPU share, [`register`] the
  register file, and [`memory`] the devices the address space is made of.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod assembler;
pub mod bytecode;
pub mod cpu;
pub mod errors;
pub mod memory;
pub mod register;
pub mod symboltable;

pub use assembler::{process_module, Module};
pub use cpu::{Cpu, RunState, StopToken};
pub use errors::{AssemblyError, MemoryError};
pub use memory::{Device, MemoryMapper};

/*!
  The instruction set of the machine.

  The machine is 16 bit and big-endian. Every instruction starts with a one byte opcode followed
  by a fixed number of operand bytes determined by the instruction's `OperandFormat`:

    Opcode:    8 bits
    Register:  8 bits (slot index into the register file)
    Literal:  16 bits, or 8 bits for the narrow formats
    Address:  16 bits

  Instruction size is a property of the opcode alone. The assembler lays out code using
  `Descriptor::size` and the CPU consumes exactly that many bytes when it executes the opcode, so
  the two must be changed together.
*/

mod binary;
mod instruction;
mod registry;

pub use binary::{bytes_to_word, emit_byte, emit_word, render_machine_code, word_to_bytes,
                 Byte, Radix, Word};
pub use instruction::{Descriptor, Opcode, OperandFormat, OperandKind};
pub use registry::{descriptors, forms_of, lookup_by_mnemonic, lookup_by_opcode};

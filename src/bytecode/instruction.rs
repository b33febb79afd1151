use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/**
  Addressing-mode shapes. A format fixes the number, order, and width of the operand bytes that
  follow the opcode byte, and therefore the size of every instruction that uses it. The encoder
  in `assembler::compile` and the decoder in `cpu` both walk operands in the order given in the
  comment on each variant.
*/
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandFormat {
  /// [lit:16][reg:8]
  LitReg,
  /// [lit:8][reg:8]
  LitReg8,
  /// [reg:8][lit:16]
  RegLit,
  /// [reg:8][lit:8]
  RegLit8,
  /// [reg:8][reg:8]
  RegReg,
  /// [reg:8][address:16]
  RegMem,
  /// [address:16][reg:8]
  MemReg,
  /// [lit:16][address:16]
  LitMem,
  /// [lit:8][address:16]
  LitMem8,
  /// [pointer reg:8][reg:8]
  RegPtrReg,
  /// [reg:8][pointer reg:8]
  RegRegPtr,
  /// [lit:16][pointer reg:8][reg:8]
  LitOffReg,
  /// [reg:8]
  SingleReg,
  /// [lit:16]
  SingleLit,
  /// [address:16]
  SingleAddr,
  /// No operands.
  NoArgs,
}

/// What a single operand position holds, and how it is written in source and in machine code.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandKind {
  /// A 16 bit value: `$HEX`, `!name`, `[expr]`, or `<S> sym.member`.
  Literal,
  /// As `Literal`, but encoded in one byte.
  Literal8,
  /// A 16 bit address: `&HEX`, `&!name`, `&[expr]`, or `&<S> sym.member`.
  Address,
  /// A register name, encoded as its slot index.
  Register,
  /// `&reg`, a register holding an address.
  Pointer,
}

impl OperandFormat {
  /// Operand kinds in source order, which is also encoding order.
  pub fn operands(&self) -> &'static [OperandKind] {
    use OperandKind::*;
    match self {
      OperandFormat::LitReg     => &[Literal, Register],
      OperandFormat::LitReg8    => &[Literal8, Register],
      OperandFormat::RegLit     => &[Register, Literal],
      OperandFormat::RegLit8    => &[Register, Literal8],
      OperandFormat::RegReg     => &[Register, Register],
      OperandFormat::RegMem     => &[Register, Address],
      OperandFormat::MemReg     => &[Address, Register],
      OperandFormat::LitMem     => &[Literal, Address],
      OperandFormat::LitMem8    => &[Literal8, Address],
      OperandFormat::RegPtrReg  => &[Pointer, Register],
      OperandFormat::RegRegPtr  => &[Register, Pointer],
      OperandFormat::LitOffReg  => &[Literal, Pointer, Register],
      OperandFormat::SingleReg  => &[Register],
      OperandFormat::SingleLit  => &[Literal],
      OperandFormat::SingleAddr => &[Address],
      OperandFormat::NoArgs     => &[],
    }
  }

  /// Size in bytes of an instruction of this format, opcode included.
  pub fn size(&self) -> u8 {
    match self {
      OperandFormat::LitReg     => 4,
      OperandFormat::LitReg8    => 3,
      OperandFormat::RegLit     => 4,
      OperandFormat::RegLit8    => 3,
      OperandFormat::RegReg     => 3,
      OperandFormat::RegMem     => 4,
      OperandFormat::MemReg     => 4,
      OperandFormat::LitMem     => 5,
      OperandFormat::LitMem8    => 4,
      OperandFormat::RegPtrReg  => 3,
      OperandFormat::RegRegPtr  => 3,
      OperandFormat::LitOffReg  => 5,
      OperandFormat::SingleReg  => 2,
      OperandFormat::SingleLit  => 3,
      OperandFormat::SingleAddr => 3,
      OperandFormat::NoArgs     => 1,
    }
  }

  /// The number of operands written in source for this format.
  pub fn arity(&self) -> usize {
    self.operands().len()
  }
}

/**
  Opcodes of the machine.

  The discriminant of each variant is the byte that identifies the instruction in machine code,
  and the `strum` serialization is its instruction name, e.g. `MOV_LIT_REG`. Several
  instructions share a mnemonic (`mov`, `jeq`, ...); the assembler picks among them by operand
  shape. Unassigned byte values decode to nothing and execute as no-ops.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Opcode {
  // 16 bit moves //
  MovLitReg    = 0x10,
  MovRegReg    = 0x11,
  MovRegMem    = 0x12,
  MovMemReg    = 0x13,
  MovLitMem    = 0x14,
  MovRegPtrReg = 0x15,
  MovLitOffReg = 0x16,
  MovRegRegPtr = 0x17,

  // 8 bit moves //
  #[strum(serialize = "MOV8_LIT_REG")]
  Mov8LitReg    = 0x18,
  #[strum(serialize = "MOV8_LIT_MEM")]
  Mov8LitMem    = 0x19,
  #[strum(serialize = "MOV8_MEM_REG")]
  Mov8MemReg    = 0x1A,
  #[strum(serialize = "MOV8_REG_PTR_REG")]
  Mov8RegPtrReg = 0x1B,
  MovlRegMem    = 0x1C,
  MovhRegMem    = 0x1D,

  // Arithmetic, result in `acc` //
  AddRegReg = 0x20,
  AddLitReg = 0x21,
  SubLitReg = 0x22,
  SubRegLit = 0x23,
  SubRegReg = 0x24,
  MulLitReg = 0x25,
  MulRegReg = 0x26,

  // Shifts work in place, bitwise results in `acc` //
  LsfRegLit = 0x28,
  LsfRegReg = 0x29,
  RsfRegLit = 0x2A,
  RsfRegReg = 0x2B,
  AndRegLit = 0x2C,
  AndRegReg = 0x2D,
  OrRegLit  = 0x2E,
  OrRegReg  = 0x2F,
  XorRegLit = 0x30,
  XorRegReg = 0x31,
  Not       = 0x32,

  // In place //
  IncReg = 0x35,
  DecReg = 0x36,

  // Stack and subroutines //
  PshLit = 0x37,
  PshReg = 0x38,
  Pop    = 0x39,
  CalLit = 0x3A,
  CalReg = 0x3B,
  Ret    = 0x3C,

  // Branches compare against `acc` //
  JmpAddr = 0x3D,
  JeqReg  = 0x3E,
  JeqLit  = 0x3F,
  JneReg  = 0x40,
  JneLit  = 0x41,
  JltReg  = 0x42,
  JltLit  = 0x43,
  JgtReg  = 0x44,
  JgtLit  = 0x45,
  JleReg  = 0x46,
  JleLit  = 0x47,
  JgeReg  = 0x48,
  JgeLit  = 0x49,

  Hlt = 0xFF,
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// The instruction name, e.g. `MOV_LIT_REG`.
  pub fn name(&self) -> &'static str {
    self.into()
  }

  /// The source-level mnemonic shared by every form of the instruction.
  pub fn mnemonic(&self) -> &'static str {
    use Opcode::*;
    match self {
      | MovLitReg | MovRegReg | MovRegMem | MovMemReg
      | MovLitMem | MovRegPtrReg | MovLitOffReg | MovRegRegPtr => "mov",

      Mov8LitReg | Mov8LitMem | Mov8MemReg | Mov8RegPtrReg => "mov8",
      MovlRegMem => "movl",
      MovhRegMem => "movh",

      AddRegReg | AddLitReg             => "add",
      SubLitReg | SubRegLit | SubRegReg => "sub",
      MulLitReg | MulRegReg             => "mul",

      LsfRegLit | LsfRegReg => "lsf",
      RsfRegLit | RsfRegReg => "rsf",
      AndRegLit | AndRegReg => "and",
      OrRegLit  | OrRegReg  => "or",
      XorRegLit | XorRegReg => "xor",
      Not                   => "not",

      IncReg => "inc",
      DecReg => "dec",

      PshLit | PshReg => "psh",
      Pop             => "pop",
      CalLit | CalReg => "cal",
      Ret             => "ret",

      JmpAddr         => "jmp",
      JeqReg | JeqLit => "jeq",
      JneReg | JneLit => "jne",
      JltReg | JltLit => "jlt",
      JgtReg | JgtLit => "jgt",
      JleReg | JleLit => "jle",
      JgeReg | JgeLit => "jge",

      Hlt => "hlt",
    }
  }

  pub fn format(&self) -> OperandFormat {
    use Opcode::*;
    use OperandFormat as F;
    match self {
      MovLitReg    => F::LitReg,
      MovRegReg    => F::RegReg,
      MovRegMem    => F::RegMem,
      MovMemReg    => F::MemReg,
      MovLitMem    => F::LitMem,
      MovRegPtrReg => F::RegPtrReg,
      MovLitOffReg => F::LitOffReg,
      MovRegRegPtr => F::RegRegPtr,

      Mov8LitReg    => F::LitReg8,
      Mov8LitMem    => F::LitMem8,
      Mov8MemReg    => F::MemReg,
      Mov8RegPtrReg => F::RegPtrReg,
      MovlRegMem    => F::RegMem,
      MovhRegMem    => F::RegMem,

      | AddRegReg | SubRegReg | MulRegReg
      | LsfRegReg | RsfRegReg | AndRegReg
      | OrRegReg  | XorRegReg => F::RegReg,

      AddLitReg | SubLitReg | MulLitReg => F::LitReg,

      SubRegLit | AndRegLit | OrRegLit | XorRegLit => F::RegLit,

      LsfRegLit | RsfRegLit => F::RegLit8,

      Not | IncReg | DecReg | PshReg | Pop | CalReg => F::SingleReg,

      PshLit | CalLit => F::SingleLit,

      JmpAddr => F::SingleAddr,

      JeqReg | JneReg | JltReg | JgtReg | JleReg | JgeReg => F::RegMem,
      JeqLit | JneLit | JltLit | JgtLit | JleLit | JgeLit => F::LitMem,

      Ret | Hlt => F::NoArgs,
    }
  }

  pub fn size(&self) -> u8 {
    self.format().size()
  }
}

/**
  One row of the instruction set: everything the assembler and the CPU must agree on about an
  opcode. `size` is what the assembler advances its cursor by in pass 1 and exactly what the CPU
  consumes when it decodes the opcode.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Descriptor {
  pub opcode   : Opcode,
  pub name     : &'static str,
  pub mnemonic : &'static str,
  pub format   : OperandFormat,
  pub size     : u8,
}

impl Descriptor {
  pub fn of(opcode: Opcode) -> Descriptor {
    Descriptor {
      opcode,
      name     : opcode.name(),
      mnemonic : opcode.mnemonic(),
      format   : opcode.format(),
      size     : opcode.size(),
    }
  }
}

impl Display for Descriptor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:02X} {:<16} {:<5} {} ({} bytes)",
           self.opcode.code(), self.name, self.mnemonic, self.format, self.size)
  }
}

//! The instruction-set vocabulary shared by the assembler and the simulator:
//! registers, mnemonics, the opcode table, and 32-bit instruction words.

use std::fmt::Display;

use thiserror::Error;

/// Threads per warp. Lane masks are one bit per thread in a `u32`.
pub const WARP_SIZE: usize = 32;

/// Register-file size for both the vector and the scalar bank.
pub const NUM_REGISTERS: i32 = 32;

/// Highest vector register number that is launch-constant and read-only
/// (`x0` zero, `x1` thread id, `x2` block id, `x3` block size).
pub const LAST_RESERVED_REGISTER: i32 = 3;

/// An error for the ISA vocabulary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IsaError {
    #[error("invalid opcode {0:#x}")]
    InvalidOpcode(u32),
}

/// Which register bank an operand addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    /// One value per thread in the warp.
    Vector,
    /// One value shared by the whole warp.
    Scalar,
    /// The program counter. Read-only from user instructions.
    Pc,
}

/// A register operand: bank plus number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterData {
    pub reg_type: RegisterType,
    /// `0..32` for Vector/Scalar; always 0 for Pc.
    pub number: i32,
}

impl RegisterData {
    pub const fn vector(number: i32) -> Self {
        Self {
            reg_type: RegisterType::Vector,
            number,
        }
    }

    pub const fn scalar(number: i32) -> Self {
        Self {
            reg_type: RegisterType::Scalar,
            number,
        }
    }

    pub const fn pc() -> Self {
        Self {
            reg_type: RegisterType::Pc,
            number: 0,
        }
    }

    /// Whether this operand satisfies a slot that requires a scalar
    /// (`true`) or vector (`false`) register. `pc` satisfies neither.
    pub const fn matches_kind(&self, requires_scalar: bool) -> bool {
        match self.reg_type {
            RegisterType::Vector => !requires_scalar,
            RegisterType::Scalar => requires_scalar,
            RegisterType::Pc => false,
        }
    }
}

impl Display for RegisterData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reg_type {
            RegisterType::Vector => write!(f, "x{}", self.number),
            RegisterType::Scalar => write!(f, "s{}", self.number),
            RegisterType::Pc => write!(f, "pc"),
        }
    }
}

/// The base operations of the instruction set, one opcode each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MnemonicName {
    /// Stops the warp.
    Halt = 0,

    /* I-type arithmetic */
    Addi = 1,
    Slti = 2,
    Xori = 3,
    Ori = 4,
    Andi = 5,
    Slli = 6,
    Srli = 7,
    Srai = 8,
    /// Cross-width: scalar rd collects the per-thread `rs1 < imm` bits.
    SxSlti = 9,

    /* R-type */
    Add = 10,
    Sub = 11,
    Sll = 12,
    Slt = 13,
    Xor = 14,
    Srl = 15,
    Sra = 16,
    Or = 17,
    And = 18,
    /// Cross-width: scalar rd collects the per-thread `rs1 < rs2` bits.
    SxSlt = 19,

    /* Loads: rd <- mem[rs1 + imm12] */
    Lb = 20,
    Lh = 21,
    Lw = 22,

    /* Stores: mem[rs2 + imm12] <- rs1 */
    Sb = 23,
    Sh = 24,
    Sw = 25,
}

impl MnemonicName {
    pub const fn opcode(self) -> u32 {
        self as u32
    }

    pub const fn is_itype_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Addi
                | Self::Slti
                | Self::Xori
                | Self::Ori
                | Self::Andi
                | Self::Slli
                | Self::Srli
                | Self::Srai
                | Self::SxSlti
        )
    }

    pub const fn is_rtype(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Sll
                | Self::Slt
                | Self::Xor
                | Self::Srl
                | Self::Sra
                | Self::Or
                | Self::And
                | Self::SxSlt
        )
    }

    pub const fn is_load(self) -> bool {
        matches!(self, Self::Lb | Self::Lh | Self::Lw)
    }

    pub const fn is_store(self) -> bool {
        matches!(self, Self::Sb | Self::Sh | Self::Sw)
    }

    pub const fn is_cross_width(self) -> bool {
        matches!(self, Self::SxSlt | Self::SxSlti)
    }

    /// `halt` and the cross-width pair exist in one form only.
    pub const fn has_scalar_form(self) -> bool {
        !matches!(self, Self::Halt | Self::SxSlt | Self::SxSlti)
    }

    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "halt" => Self::Halt,
            "addi" => Self::Addi,
            "slti" => Self::Slti,
            "xori" => Self::Xori,
            "ori" => Self::Ori,
            "andi" => Self::Andi,
            "slli" => Self::Slli,
            "srli" => Self::Srli,
            "srai" => Self::Srai,
            "sx_slti" => Self::SxSlti,
            "add" => Self::Add,
            "sub" => Self::Sub,
            "sll" => Self::Sll,
            "slt" => Self::Slt,
            "xor" => Self::Xor,
            "srl" => Self::Srl,
            "sra" => Self::Sra,
            "or" => Self::Or,
            "and" => Self::And,
            "sx_slt" => Self::SxSlt,
            "lb" => Self::Lb,
            "lh" => Self::Lh,
            "lw" => Self::Lw,
            "sb" => Self::Sb,
            "sh" => Self::Sh,
            "sw" => Self::Sw,
            _ => return None,
        })
    }
}

impl TryFrom<u32> for MnemonicName {
    type Error = IsaError;

    fn try_from(value: u32) -> Result<Self, IsaError> {
        match value {
            v if v == Self::Halt as u32 => Ok(Self::Halt),
            v if v == Self::Addi as u32 => Ok(Self::Addi),
            v if v == Self::Slti as u32 => Ok(Self::Slti),
            v if v == Self::Xori as u32 => Ok(Self::Xori),
            v if v == Self::Ori as u32 => Ok(Self::Ori),
            v if v == Self::Andi as u32 => Ok(Self::Andi),
            v if v == Self::Slli as u32 => Ok(Self::Slli),
            v if v == Self::Srli as u32 => Ok(Self::Srli),
            v if v == Self::Srai as u32 => Ok(Self::Srai),
            v if v == Self::SxSlti as u32 => Ok(Self::SxSlti),
            v if v == Self::Add as u32 => Ok(Self::Add),
            v if v == Self::Sub as u32 => Ok(Self::Sub),
            v if v == Self::Sll as u32 => Ok(Self::Sll),
            v if v == Self::Slt as u32 => Ok(Self::Slt),
            v if v == Self::Xor as u32 => Ok(Self::Xor),
            v if v == Self::Srl as u32 => Ok(Self::Srl),
            v if v == Self::Sra as u32 => Ok(Self::Sra),
            v if v == Self::Or as u32 => Ok(Self::Or),
            v if v == Self::And as u32 => Ok(Self::And),
            v if v == Self::SxSlt as u32 => Ok(Self::SxSlt),
            v if v == Self::Lb as u32 => Ok(Self::Lb),
            v if v == Self::Lh as u32 => Ok(Self::Lh),
            v if v == Self::Lw as u32 => Ok(Self::Lw),
            v if v == Self::Sb as u32 => Ok(Self::Sb),
            v if v == Self::Sh as u32 => Ok(Self::Sh),
            v if v == Self::Sw as u32 => Ok(Self::Sw),
            other => Err(IsaError::InvalidOpcode(other)),
        }
    }
}

impl Display for MnemonicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SxSlt => write!(f, "sx_slt"),
            Self::SxSlti => write!(f, "sx_slti"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// An assembly-level mnemonic: a base operation plus whether the scalar
/// form was written (`s_` prefix, e.g. `s_addi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mnemonic {
    pub name: MnemonicName,
    pub scalar: bool,
}

impl Mnemonic {
    pub const fn vector(name: MnemonicName) -> Self {
        Self {
            name,
            scalar: false,
        }
    }

    pub const fn scalar(name: MnemonicName) -> Self {
        Self { name, scalar: true }
    }

    pub const fn is_scalar(&self) -> bool {
        self.scalar
    }

    /// Looks up a (case-insensitive) word in the mnemonic table.
    pub fn from_word(word: &str) -> Option<Self> {
        let lower = word.to_ascii_lowercase();
        if let Some(name) = MnemonicName::from_word(&lower) {
            return Some(Self::vector(name));
        }
        if let Some(base) = lower.strip_prefix("s_") {
            if let Some(name) = MnemonicName::from_word(base) {
                if name.has_scalar_form() {
                    return Some(Self::scalar(name));
                }
            }
        }
        None
    }
}

impl Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scalar {
            write!(f, "s_{}", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/* Instruction-word field layout. Bits [5:0] opcode, bit 6 scalar/mask,
 * rd [11:7], rs1 [19:15], rs2 [24:20], I-imm [31:20],
 * S-imm [31:25] | [11:7]. */
const OPCODE_MASK: u32 = 0x3f;
const SCALAR_BIT: u32 = 6;
const RD_SHIFT: u32 = 7;
const RS1_SHIFT: u32 = 15;
const RS2_SHIFT: u32 = 20;
const REG_MASK: u32 = 0x1f;
const IMM_I_SHIFT: u32 = 20;
const IMM_S_HI_SHIFT: u32 = 25;
const IMM_S_LO_SHIFT: u32 = 7;

/// Smallest value representable in a 12-bit immediate field.
pub const IMM12_MIN: i32 = -2048;
/// Largest value representable in a 12-bit immediate field.
pub const IMM12_MAX: i32 = 2047;

/// One encoded 32-bit instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionWord(pub u32);

impl InstructionWord {
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn halt() -> Self {
        Self(MnemonicName::Halt.opcode())
    }

    pub const fn itype(name: MnemonicName, scalar: bool, rd: u32, rs1: u32, imm12: i32) -> Self {
        let mut bits = name.opcode();
        if scalar {
            bits |= 1 << SCALAR_BIT;
        }
        bits |= (rd & REG_MASK) << RD_SHIFT;
        bits |= (rs1 & REG_MASK) << RS1_SHIFT;
        bits |= ((imm12 as u32) & 0xfff) << IMM_I_SHIFT;
        Self(bits)
    }

    pub const fn rtype(name: MnemonicName, scalar: bool, rd: u32, rs1: u32, rs2: u32) -> Self {
        let mut bits = name.opcode();
        if scalar {
            bits |= 1 << SCALAR_BIT;
        }
        bits |= (rd & REG_MASK) << RD_SHIFT;
        bits |= (rs1 & REG_MASK) << RS1_SHIFT;
        bits |= (rs2 & REG_MASK) << RS2_SHIFT;
        Self(bits)
    }

    pub const fn stype(name: MnemonicName, scalar: bool, rs1: u32, rs2: u32, imm12: i32) -> Self {
        let mut bits = name.opcode();
        if scalar {
            bits |= 1 << SCALAR_BIT;
        }
        bits |= (rs1 & REG_MASK) << RS1_SHIFT;
        bits |= (rs2 & REG_MASK) << RS2_SHIFT;
        let imm = (imm12 as u32) & 0xfff;
        bits |= (imm >> 5) << IMM_S_HI_SHIFT;
        bits |= (imm & 0x1f) << IMM_S_LO_SHIFT;
        Self(bits)
    }

    /// Sets the scalar/mask bit on an already-encoded word.
    pub const fn with_scalar_mask(self) -> Self {
        Self(self.0 | 1 << SCALAR_BIT)
    }

    pub const fn opcode(self) -> u32 {
        self.0 & OPCODE_MASK
    }

    pub fn name(self) -> Result<MnemonicName, IsaError> {
        MnemonicName::try_from(self.opcode())
    }

    pub const fn scalar_flag(self) -> bool {
        (self.0 >> SCALAR_BIT) & 1 != 0
    }

    pub const fn rd(self) -> u32 {
        (self.0 >> RD_SHIFT) & REG_MASK
    }

    pub const fn rs1(self) -> u32 {
        (self.0 >> RS1_SHIFT) & REG_MASK
    }

    pub const fn rs2(self) -> u32 {
        (self.0 >> RS2_SHIFT) & REG_MASK
    }

    /// The sign-extended I-type immediate.
    pub const fn imm_itype(self) -> i32 {
        (self.0 as i32) >> IMM_I_SHIFT
    }

    /// The sign-extended S-type immediate.
    pub const fn imm_stype(self) -> i32 {
        let hi = (self.0 as i32) >> IMM_S_HI_SHIFT;
        let lo = (self.0 >> IMM_S_LO_SHIFT) & REG_MASK;
        (hi << 5) | lo as i32
    }
}

/* Per-mnemonic builders, handy in device-level tests. */

pub const fn addi(rd: u32, rs1: u32, imm12: i32) -> InstructionWord {
    InstructionWord::itype(MnemonicName::Addi, false, rd, rs1, imm12)
}

pub const fn add(rd: u32, rs1: u32, rs2: u32) -> InstructionWord {
    InstructionWord::rtype(MnemonicName::Add, false, rd, rs1, rs2)
}

pub const fn lw(rd: u32, rs1: u32, imm12: i32) -> InstructionWord {
    InstructionWord::itype(MnemonicName::Lw, false, rd, rs1, imm12)
}

pub const fn sw(rs2: u32, rs1: u32, imm12: i32) -> InstructionWord {
    InstructionWord::stype(MnemonicName::Sw, false, rs1, rs2, imm12)
}

pub const fn sx_slti(rd: u32, rs1: u32, imm12: i32) -> InstructionWord {
    InstructionWord::itype(MnemonicName::SxSlti, false, rd, rs1, imm12)
}

pub const fn halt() -> InstructionWord {
    InstructionWord::halt()
}

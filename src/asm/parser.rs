//! The line parser: token sequence in, typed [`Line`] out.

use std::fmt::Display;

use crate::isa::{Mnemonic, MnemonicName, RegisterData, RegisterType, LAST_RESERVED_REGISTER};

use super::{AsmError, Token, TokenKind};

/// An immediate operand slot: either a literal value or a reference to a
/// label, resolved PC-relative by the encoder. Keeps its column so the
/// encoder can point range and resolution errors at the right place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmOperand {
    pub kind: ImmKind,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImmKind {
    Value(i32),
    LabelRef(String),
}

impl Display for ImmOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ImmKind::Value(value) => write!(f, "{value}"),
            ImmKind::LabelRef(name) => write!(f, "{name}"),
        }
    }
}

/// Operand shapes, one per instruction class.
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    /// `halt` takes none.
    None,
    /// Arithmetic immediates and loads: `rd, rs1, imm` / `rd, imm(rs1)`.
    Itype {
        rd: RegisterData,
        rs1: RegisterData,
        imm12: ImmOperand,
    },
    Rtype {
        rd: RegisterData,
        rs1: RegisterData,
        rs2: RegisterData,
    },
    /// Stores: `rs2, imm(rs1)`. The first register written in source is
    /// the address base `rs2`, the parenthesized one the value `rs1`.
    Stype {
        rs1: RegisterData,
        rs2: RegisterData,
        imm12: ImmOperand,
    },
}

/// One parsed instruction, optionally carrying the label defined on its
/// line.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub label: Option<String>,
    pub mnemonic: Mnemonic,
    pub operands: Operands,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.mnemonic)?;
        match &self.operands {
            Operands::None => Ok(()),
            Operands::Itype { rd, rs1, imm12 } => {
                if self.mnemonic.name.is_load() {
                    write!(f, " {rd}, {imm12}({rs1})")
                } else {
                    write!(f, " {rd}, {rs1}, {imm12}")
                }
            }
            Operands::Rtype { rd, rs1, rs2 } => write!(f, " {rd}, {rs1}, {rs2}"),
            Operands::Stype { rs1, rs2, imm12 } => write!(f, " {rs2}, {imm12}({rs1})"),
        }
    }
}

/// One parsed source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    JustLabel { label: String },
    Blocks { number: u32 },
    Warps { number: u32 },
    Instruction(Instruction),
}

impl Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JustLabel { label } => write!(f, "{label}:"),
            Self::Blocks { number } => write!(f, ".blocks {number}"),
            Self::Warps { number } => write!(f, ".warps {number}"),
            Self::Instruction(instruction) => write!(f, "{instruction}"),
        }
    }
}

/// Token-cursor parser for one line. Structural surprises (wrong or
/// missing token) end the line; semantic checks keep going so every
/// offending register is reported.
struct Parser<'t> {
    tokens: &'t [Token],
    errors: Vec<AsmError>,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.first()
    }

    fn chop(&mut self) -> Option<&'t Token> {
        let token = self.tokens.first()?;
        self.tokens = &self.tokens[1..];
        Some(token)
    }

    fn unexpected(&mut self, expected: &str, found: &Token) {
        self.errors.push(AsmError::UnexpectedToken {
            column: found.column,
            expected: expected.to_owned(),
            found: found.kind.to_string(),
        });
    }

    fn eos(&mut self, expected: &str) {
        self.errors.push(AsmError::UnexpectedEos {
            expected: expected.to_owned(),
        });
    }

    fn expect_register(&mut self) -> Option<(RegisterData, u32)> {
        match self.chop() {
            Some(Token {
                kind: TokenKind::Register(register),
                column,
            }) => Some((*register, *column)),
            Some(other) => {
                self.unexpected("a register", other);
                None
            }
            None => {
                self.eos("a register");
                None
            }
        }
    }

    fn expect_punct(&mut self, kind: TokenKind, expected: &str) -> Option<()> {
        match self.chop() {
            Some(token) if token.kind == kind => Some(()),
            Some(other) => {
                self.unexpected(expected, other);
                None
            }
            None => {
                self.eos(expected);
                None
            }
        }
    }

    /// An immediate slot: a literal or a label reference.
    fn expect_imm(&mut self) -> Option<ImmOperand> {
        match self.chop() {
            Some(Token {
                kind: TokenKind::Immediate(value),
                column,
            }) => Some(ImmOperand {
                kind: ImmKind::Value(*value),
                column: *column,
            }),
            Some(Token {
                kind: TokenKind::LabelRef(name),
                column,
            }) => Some(ImmOperand {
                kind: ImmKind::LabelRef(name.clone()),
                column: *column,
            }),
            Some(other) => {
                self.unexpected("an immediate", other);
                None
            }
            None => {
                self.eos("an immediate");
                None
            }
        }
    }

    /// A literal number (label references not allowed), for directives.
    fn expect_number(&mut self) -> Option<(i32, u32)> {
        match self.chop() {
            Some(Token {
                kind: TokenKind::Immediate(value),
                column,
            }) => Some((*value, *column)),
            Some(other) => {
                self.unexpected("a number", other);
                None
            }
            None => {
                self.eos("a number");
                None
            }
        }
    }

    fn check_register_kind(
        &mut self,
        register: RegisterData,
        column: u32,
        requires_scalar: bool,
    ) -> bool {
        if register.matches_kind(requires_scalar) {
            return true;
        }
        self.errors.push(AsmError::RegisterType {
            column,
            register: register.to_string(),
            expected: if requires_scalar { "scalar" } else { "vector" },
        });
        false
    }

    /// Vector registers 0..=3 hold the launch constants (zero, thread
    /// id, block id, block size) and cannot be written.
    fn check_writable(&mut self, rd: RegisterData, column: u32) -> bool {
        if rd.reg_type == RegisterType::Vector && rd.number <= LAST_RESERVED_REGISTER {
            self.errors.push(AsmError::ReadOnlyRegister {
                column,
                register: rd.to_string(),
            });
            return false;
        }
        true
    }

    // <mnemonic> <rd>, <rs1>, <imm12>
    fn parse_itype_arithmetic(&mut self, mnemonic: Mnemonic) -> Option<Instruction> {
        let (rd, rd_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let (rs1, rs1_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let imm12 = self.expect_imm()?;

        // Cross-width compares collect per-thread results into a scalar.
        let mut ok = true;
        if mnemonic.name == MnemonicName::SxSlti {
            ok &= self.check_register_kind(rd, rd_col, true);
            ok &= self.check_register_kind(rs1, rs1_col, false);
        } else {
            ok &= self.check_register_kind(rd, rd_col, mnemonic.is_scalar());
            ok &= self.check_register_kind(rs1, rs1_col, mnemonic.is_scalar());
        }
        ok &= self.check_writable(rd, rd_col);
        if !ok {
            return None;
        }

        Some(Instruction {
            label: None,
            mnemonic,
            operands: Operands::Itype { rd, rs1, imm12 },
        })
    }

    // <mnemonic> <rd>, <rs1>, <rs2>
    fn parse_rtype(&mut self, mnemonic: Mnemonic) -> Option<Instruction> {
        let (rd, rd_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let (rs1, rs1_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let (rs2, rs2_col) = self.expect_register()?;

        let mut ok = true;
        if mnemonic.name == MnemonicName::SxSlt {
            ok &= self.check_register_kind(rd, rd_col, true);
            ok &= self.check_register_kind(rs1, rs1_col, false);
            ok &= self.check_register_kind(rs2, rs2_col, false);
        } else {
            ok &= self.check_register_kind(rd, rd_col, mnemonic.is_scalar());
            ok &= self.check_register_kind(rs1, rs1_col, mnemonic.is_scalar());
            ok &= self.check_register_kind(rs2, rs2_col, mnemonic.is_scalar());
        }
        ok &= self.check_writable(rd, rd_col);
        if !ok {
            return None;
        }

        Some(Instruction {
            label: None,
            mnemonic,
            operands: Operands::Rtype { rd, rs1, rs2 },
        })
    }

    // <mnemonic> <rd>, <imm12>(<rs1>)
    fn parse_load(&mut self, mnemonic: Mnemonic) -> Option<Instruction> {
        let (rd, rd_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let imm12 = self.expect_imm()?;
        self.expect_punct(TokenKind::LParen, "'('")?;
        let (rs1, rs1_col) = self.expect_register()?;
        self.expect_punct(TokenKind::RParen, "')'")?;

        let mut ok = true;
        ok &= self.check_register_kind(rd, rd_col, mnemonic.is_scalar());
        ok &= self.check_register_kind(rs1, rs1_col, mnemonic.is_scalar());
        ok &= self.check_writable(rd, rd_col);
        if !ok {
            return None;
        }

        Some(Instruction {
            label: None,
            mnemonic,
            operands: Operands::Itype { rd, rs1, imm12 },
        })
    }

    // <mnemonic> <rs2>, <imm12>(<rs1>)
    fn parse_store(&mut self, mnemonic: Mnemonic) -> Option<Instruction> {
        let (rs2, rs2_col) = self.expect_register()?;
        self.expect_punct(TokenKind::Comma, "','")?;
        let imm12 = self.expect_imm()?;
        self.expect_punct(TokenKind::LParen, "'('")?;
        let (rs1, rs1_col) = self.expect_register()?;
        self.expect_punct(TokenKind::RParen, "')'")?;

        let mut ok = true;
        ok &= self.check_register_kind(rs1, rs1_col, mnemonic.is_scalar());
        ok &= self.check_register_kind(rs2, rs2_col, mnemonic.is_scalar());
        if !ok {
            return None;
        }

        Some(Instruction {
            label: None,
            mnemonic,
            operands: Operands::Stype { rs1, rs2, imm12 },
        })
    }

    fn parse_instruction(&mut self, mnemonic: Mnemonic) -> Option<Instruction> {
        self.chop();
        if mnemonic.name == MnemonicName::Halt {
            return Some(Instruction {
                label: None,
                mnemonic,
                operands: Operands::None,
            });
        }
        if mnemonic.name.is_itype_arithmetic() {
            return self.parse_itype_arithmetic(mnemonic);
        }
        if mnemonic.name.is_rtype() {
            return self.parse_rtype(mnemonic);
        }
        if mnemonic.name.is_load() {
            return self.parse_load(mnemonic);
        }
        self.parse_store(mnemonic)
    }

    fn parse_directive(&mut self) -> Option<Line> {
        let directive = match self.chop()?.kind {
            TokenKind::BlocksDirective => "blocks",
            _ => "warps",
        };
        let (value, column) = self.expect_number()?;
        if value < 1 {
            self.errors.push(AsmError::DirectiveValue {
                column,
                directive,
                value,
            });
            return None;
        }
        if let Some(trailing) = self.peek() {
            self.unexpected("end of line", trailing);
            return None;
        }
        Some(if directive == "blocks" {
            Line::Blocks {
                number: value as u32,
            }
        } else {
            Line::Warps {
                number: value as u32,
            }
        })
    }

    fn parse_line(&mut self) -> Option<Line> {
        let Some(first) = self.peek() else {
            self.eos("a mnemonic or directive");
            return None;
        };

        if matches!(
            first.kind,
            TokenKind::BlocksDirective | TokenKind::WarpsDirective
        ) {
            return self.parse_directive();
        }

        let mut label = None;
        let mut current = first;
        if let TokenKind::LabelDef(name) = &current.kind {
            label = Some(name.clone());
            self.chop();
            match self.peek() {
                None => {
                    return Some(Line::JustLabel {
                        label: name.clone(),
                    })
                }
                Some(next) => current = next,
            }
        }

        match &current.kind {
            TokenKind::Mnemonic(mnemonic) => {
                let mut instruction = self.parse_instruction(*mnemonic)?;
                instruction.label = label;
                if let Some(trailing) = self.peek() {
                    self.unexpected("end of line", trailing);
                    return None;
                }
                Some(Line::Instruction(instruction))
            }
            TokenKind::LabelRef(name) => {
                self.errors.push(AsmError::UnknownMnemonic {
                    column: current.column,
                    name: name.clone(),
                });
                None
            }
            _ => {
                self.unexpected("a mnemonic or directive", current);
                None
            }
        }
    }
}

/// Parses the tokens of one line into a [`Line`], or the full list of
/// diagnostics for it.
pub fn parse_line(tokens: &[Token]) -> Result<Line, Vec<AsmError>> {
    let mut parser = Parser {
        tokens,
        errors: Vec::new(),
    };
    match parser.parse_line() {
        Some(line) if parser.errors.is_empty() => Ok(line),
        _ => Err(parser.errors),
    }
}

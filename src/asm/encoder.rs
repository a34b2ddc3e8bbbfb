//! Lowering parsed lines into the flat instruction-word stream plus the
//! kernel configuration derived from directives.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::isa::{InstructionWord, IMM12_MAX, IMM12_MIN};

use super::{
    lexer::tokenize,
    parser::{parse_line, ImmKind, ImmOperand, Instruction, Line, Operands},
    AsmError,
};

/// Launch parameters handed to the device at reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub num_blocks: u32,
    pub num_warps_per_block: u32,
    pub base_instructions_addr: u32,
    pub base_data_addr: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            num_blocks: 1,
            num_warps_per_block: 1,
            base_instructions_addr: 0,
            base_data_addr: 0,
        }
    }
}

/// An assembled program: one word per instruction, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<InstructionWord>,
    pub config: KernelConfig,
}

/// A diagnostic tied to its 1-based source line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {error}", column = .error.column())]
pub struct SourceError {
    pub line: u32,
    pub error: AsmError,
}

/// Assembles a full source text. All diagnostics of the run are
/// returned together; per line, encoding stops at the first problem.
pub fn assemble(source: &str) -> Result<Program, Vec<SourceError>> {
    let mut errors = Vec::new();
    let mut lines = Vec::new();

    for (index, text) in source.lines().enumerate() {
        let line_no = index as u32 + 1;
        let (tokens, lex_errors) = tokenize(text);
        if !lex_errors.is_empty() {
            errors.extend(
                lex_errors
                    .into_iter()
                    .map(|error| SourceError { line: line_no, error }),
            );
            continue;
        }
        if tokens.is_empty() {
            continue;
        }
        match parse_line(&tokens) {
            Ok(line) => lines.push((line_no, line)),
            Err(parse_errors) => errors.extend(
                parse_errors
                    .into_iter()
                    .map(|error| SourceError { line: line_no, error }),
            ),
        }
    }

    // First pass: a PC per instruction, labels recorded at theirs.
    let mut labels: FxHashMap<&str, u32> = FxHashMap::default();
    let mut pc = 0u32;
    for (line_no, line) in &lines {
        let label = match line {
            Line::JustLabel { label } => Some(label),
            Line::Instruction(Instruction {
                label: Some(label), ..
            }) => Some(label),
            _ => None,
        };
        if let Some(label) = label {
            if labels.insert(label.as_str(), pc).is_some() {
                errors.push(SourceError {
                    line: *line_no,
                    error: AsmError::DuplicateLabel {
                        column: 0,
                        name: label.clone(),
                    },
                });
            }
        }
        if matches!(line, Line::Instruction(_)) {
            pc += 1;
        }
    }

    // Second pass: directives into the config, instructions into words.
    let mut config = KernelConfig::default();
    let mut blocks_seen = false;
    let mut warps_seen = false;
    let mut instructions = Vec::with_capacity(pc as usize);
    let mut pc = 0u32;
    for (line_no, line) in &lines {
        match line {
            Line::JustLabel { .. } => {}
            Line::Blocks { number } => {
                if let Err(error) = note_directive("blocks", &mut blocks_seen, pc) {
                    errors.push(SourceError {
                        line: *line_no,
                        error,
                    });
                } else {
                    config.num_blocks = *number;
                }
            }
            Line::Warps { number } => {
                if let Err(error) = note_directive("warps", &mut warps_seen, pc) {
                    errors.push(SourceError {
                        line: *line_no,
                        error,
                    });
                } else {
                    config.num_warps_per_block = *number;
                }
            }
            Line::Instruction(instruction) => {
                match encode_instruction(instruction, pc, &labels) {
                    Ok(word) => instructions.push(word),
                    Err(error) => errors.push(SourceError {
                        line: *line_no,
                        error,
                    }),
                }
                pc += 1;
            }
        }
    }

    if errors.is_empty() {
        Ok(Program {
            instructions,
            config,
        })
    } else {
        errors.sort_by_key(|e| (e.line, e.error.column()));
        Err(errors)
    }
}

fn note_directive(
    directive: &'static str,
    seen: &mut bool,
    instructions_before: u32,
) -> Result<(), AsmError> {
    if instructions_before > 0 {
        return Err(AsmError::LateDirective { directive });
    }
    if *seen {
        return Err(AsmError::DuplicateDirective { directive });
    }
    *seen = true;
    Ok(())
}

fn encode_instruction(
    instruction: &Instruction,
    pc: u32,
    labels: &FxHashMap<&str, u32>,
) -> Result<InstructionWord, AsmError> {
    let name = instruction.mnemonic.name;
    let scalar = instruction.mnemonic.is_scalar();
    match &instruction.operands {
        Operands::None => Ok(InstructionWord::halt()),
        Operands::Itype { rd, rs1, imm12 } => {
            let imm = resolve_imm(imm12, pc, labels)?;
            Ok(InstructionWord::itype(
                name,
                scalar,
                rd.number as u32,
                rs1.number as u32,
                imm,
            ))
        }
        Operands::Rtype { rd, rs1, rs2 } => Ok(InstructionWord::rtype(
            name,
            scalar,
            rd.number as u32,
            rs1.number as u32,
            rs2.number as u32,
        )),
        Operands::Stype { rs1, rs2, imm12 } => {
            let imm = resolve_imm(imm12, pc, labels)?;
            Ok(InstructionWord::stype(
                name,
                scalar,
                rs1.number as u32,
                rs2.number as u32,
                imm,
            ))
        }
    }
}

/// Label references resolve PC-relative: the distance from the current
/// instruction to the target.
fn resolve_imm(
    imm12: &ImmOperand,
    pc: u32,
    labels: &FxHashMap<&str, u32>,
) -> Result<i32, AsmError> {
    let value = match &imm12.kind {
        ImmKind::Value(value) => *value,
        ImmKind::LabelRef(name) => {
            let target = labels
                .get(name.as_str())
                .ok_or_else(|| AsmError::UndefinedReference {
                    column: imm12.column,
                    name: name.clone(),
                })?;
            *target as i32 - pc as i32
        }
    };
    if !(IMM12_MIN..=IMM12_MAX).contains(&value) {
        return Err(AsmError::ImmOutOfRange {
            column: imm12.column,
            value,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::isa;

    use super::*;

    #[test]
    fn encodes_the_basic_program() {
        let program = assemble("addi x5, x1, 0\nsw x5, 0(x1)\nhalt\n").unwrap();
        assert_eq!(
            program.instructions,
            vec![isa::addi(5, 1, 0), isa::sw(5, 1, 0), isa::halt()]
        );
        assert_eq!(program.config, KernelConfig::default());
    }

    #[test]
    fn encoding_is_deterministic() {
        let source = ".blocks 2\n.warps 3\nlw x6, 2(x4)\nsx_slti s1, x6, 5\nhalt\n";
        assert_eq!(assemble(source), assemble(source));
    }

    #[test]
    fn scalar_forms_set_the_scalar_bit() {
        let program = assemble("s_addi s5, s4, 1\nhalt\n").unwrap();
        assert!(program.instructions[0].scalar_flag());
        assert_eq!(
            program.instructions[0].opcode(),
            isa::addi(5, 4, 1).opcode()
        );
    }

    #[test]
    fn directives_feed_the_kernel_config() {
        let program = assemble(".blocks 2\n.warps 4\nhalt\n").unwrap();
        assert_eq!(program.config.num_blocks, 2);
        assert_eq!(program.config.num_warps_per_block, 4);
        assert_eq!(program.config.base_instructions_addr, 0);
        assert_eq!(program.config.base_data_addr, 0);
    }

    #[test]
    fn directives_after_code_are_rejected() {
        let errors = assemble("halt\n.blocks 2\n").unwrap_err();
        assert_eq!(
            errors,
            vec![SourceError {
                line: 2,
                error: AsmError::LateDirective {
                    directive: "blocks"
                },
            }]
        );
    }

    #[test]
    fn repeated_directives_are_rejected() {
        let errors = assemble(".warps 2\n.warps 2\nhalt\n").unwrap_err();
        assert_eq!(
            errors,
            vec![SourceError {
                line: 2,
                error: AsmError::DuplicateDirective { directive: "warps" },
            }]
        );
    }

    #[test]
    fn label_references_resolve_pc_relative() {
        let program = assemble("start:\naddi x5, x4, end\nhalt\nend: halt\n").unwrap();
        // `end` sits two instructions past the addi.
        assert_eq!(program.instructions[0].imm_itype(), 2);

        let program = assemble("top: halt\naddi x5, x4, top\n").unwrap();
        assert_eq!(program.instructions[1].imm_itype(), -1);
    }

    #[test]
    fn bare_and_attached_labels_share_one_namespace() {
        let errors = assemble("here:\nhere: halt\n").unwrap_err();
        assert_eq!(
            errors,
            vec![SourceError {
                line: 2,
                error: AsmError::DuplicateLabel {
                    column: 0,
                    name: "here".to_owned(),
                },
            }]
        );
    }

    #[test]
    fn undefined_references_are_fatal() {
        let errors = assemble("addi x5, x4, nowhere\nhalt\n").unwrap_err();
        assert!(matches!(
            errors[0].error,
            AsmError::UndefinedReference { .. }
        ));
    }

    #[test]
    fn immediate_range_is_enforced() {
        assert!(assemble("addi x5, x4, 2047\nhalt\n").is_ok());
        assert!(assemble("addi x5, x4, -2048\nhalt\n").is_ok());
        for source in ["addi x5, x4, 2048\nhalt\n", "sw x5, -2049(x6)\nhalt\n"] {
            let errors = assemble(source).unwrap_err();
            assert!(
                matches!(errors[0].error, AsmError::ImmOutOfRange { .. }),
                "{source}: {errors:?}"
            );
        }
    }

    #[test]
    fn diagnostics_from_every_line_surface_together() {
        let errors = assemble("addi s5, x1, 0\nbogus x5\nsw x5, 0(x1)\n.blocks 0\n").unwrap_err();
        let lines: Vec<u32> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 4]);
        assert_eq!(errors[0].to_string(), "1:6: register 's5' should be vector");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let program = assemble("; vector copy\n\n  halt ; done\n").unwrap();
        assert_eq!(program.instructions, vec![isa::halt()]);
    }
}

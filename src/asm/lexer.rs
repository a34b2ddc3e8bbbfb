use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{multispace0, satisfy},
    combinator::{not, value},
    sequence::terminated,
    IResult, InputTake,
};

use crate::isa::{Mnemonic, RegisterData, NUM_REGISTERS};

use super::{number::parse_number, AsmError, Span, Token, TokenKind};

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex_word(inp: Span) -> IResult<Span, Span> {
    take_while1(is_word_char)(inp)
}

fn lex_directive(inp: Span) -> IResult<Span, TokenKind> {
    terminated(
        alt((
            value(TokenKind::BlocksDirective, tag_no_case(".blocks")),
            value(TokenKind::WarpsDirective, tag_no_case(".warps")),
        )),
        not(satisfy(is_word_char)),
    )(inp)
}

/// Classifies a bare word: register syntax first (`x<n>`, `s<n>`, `pc`),
/// then the mnemonic table, and anything left is a label reference.
fn classify_word(word: &str, column: u32) -> Result<TokenKind, AsmError> {
    let lower = word.to_ascii_lowercase();
    if lower == "pc" {
        return Ok(TokenKind::Register(RegisterData::pc()));
    }

    let mut chars = lower.chars();
    let prefix = chars.next();
    let digits = chars.as_str();
    if matches!(prefix, Some('x') | Some('s'))
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
    {
        let number: i32 = digits.parse().map_err(|_| AsmError::InvalidRegister {
            column,
            name: word.to_owned(),
        })?;
        if !(0..NUM_REGISTERS).contains(&number) {
            return Err(AsmError::RegisterRange { column, number });
        }
        let register = if prefix == Some('x') {
            RegisterData::vector(number)
        } else {
            RegisterData::scalar(number)
        };
        return Ok(TokenKind::Register(register));
    }

    if let Some(mnemonic) = Mnemonic::from_word(word) {
        return Ok(TokenKind::Mnemonic(mnemonic));
    }

    Ok(TokenKind::LabelRef(word.to_owned()))
}

/// Splits one source line into positioned tokens. Lexing continues past
/// a bad token (skipping to the next separator), so several errors can
/// be reported for one line.
pub fn tokenize(line: &str) -> (Vec<Token>, Vec<AsmError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut rest = Span::new(line);

    loop {
        if let Ok((r, _)) = multispace0::<_, nom::error::Error<Span>>(rest) {
            rest = r;
        }
        let Some(c) = rest.fragment().chars().next() else {
            break;
        };
        if c == ';' {
            break;
        }
        let column = rest.get_utf8_column() as u32;

        match c {
            ',' => {
                tokens.push(Token {
                    kind: TokenKind::Comma,
                    column,
                });
                rest = rest.take_split(1).0;
            }
            '(' => {
                tokens.push(Token {
                    kind: TokenKind::LParen,
                    column,
                });
                rest = rest.take_split(1).0;
            }
            ')' => {
                tokens.push(Token {
                    kind: TokenKind::RParen,
                    column,
                });
                rest = rest.take_split(1).0;
            }
            '.' => match lex_directive(rest) {
                Ok((r, kind)) => {
                    tokens.push(Token { kind, column });
                    rest = r;
                }
                Err(_) => {
                    let after = rest.take_split(1).0;
                    let (r, name) = match lex_word(after) {
                        Ok((r, name)) => (r, name.fragment().to_string()),
                        Err(_) => (after, String::new()),
                    };
                    errors.push(AsmError::UnknownDirective { column, name });
                    rest = r;
                }
            },
            c if c == '-' || c.is_ascii_digit() => {
                let mut fragment = *rest.fragment();
                let before = fragment.len();
                let result = parse_number(&mut fragment);
                let consumed = before - fragment.len();
                rest = rest.take_split(consumed).0;
                match result {
                    Ok(v) => tokens.push(Token {
                        kind: TokenKind::Immediate(v),
                        column,
                    }),
                    Err(source) => {
                        errors.push(AsmError::Number { column, source });
                        rest = skip_to_separator(rest);
                    }
                }
            }
            c if is_word_start(c) => {
                let Ok((r, word)) = lex_word(rest) else {
                    // Unreachable: the dispatch guard saw a word char.
                    rest = rest.take_split(c.len_utf8()).0;
                    continue;
                };
                if r.fragment().starts_with(':') {
                    tokens.push(Token {
                        kind: TokenKind::LabelDef(word.fragment().to_string()),
                        column,
                    });
                    rest = r.take_split(1).0;
                } else {
                    match classify_word(word.fragment(), column) {
                        Ok(kind) => tokens.push(Token { kind, column }),
                        Err(err) => errors.push(err),
                    }
                    rest = r;
                }
            }
            other => {
                errors.push(AsmError::StrayChar {
                    column,
                    found: other,
                });
                rest = rest.take_split(other.len_utf8()).0;
            }
        }
    }

    (tokens, errors)
}

fn skip_to_separator(inp: Span) -> Span {
    let stop = inp
        .fragment()
        .find(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | ';'))
        .unwrap_or(inp.fragment().len());
    inp.take_split(stop).0
}

#[cfg(test)]
mod tests {
    use crate::isa::MnemonicName;

    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(line);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_an_instruction_line() {
        assert_eq!(
            kinds("addi x5, x1, 0"),
            vec![
                TokenKind::Mnemonic(Mnemonic::vector(MnemonicName::Addi)),
                TokenKind::Register(RegisterData::vector(5)),
                TokenKind::Comma,
                TokenKind::Register(RegisterData::vector(1)),
                TokenKind::Comma,
                TokenKind::Immediate(0),
            ]
        );
    }

    #[test]
    fn lexes_a_load_line() {
        assert_eq!(
            kinds("lw x6, -4(x1)"),
            vec![
                TokenKind::Mnemonic(Mnemonic::vector(MnemonicName::Lw)),
                TokenKind::Register(RegisterData::vector(6)),
                TokenKind::Comma,
                TokenKind::Immediate(-4),
                TokenKind::LParen,
                TokenKind::Register(RegisterData::vector(1)),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn columns_are_one_based() {
        let (tokens, _) = tokenize("  sw x5, 0(x1)");
        let columns: Vec<u32> = tokens.iter().map(|t| t.column).collect();
        assert_eq!(columns, vec![3, 6, 8, 10, 11, 12, 14]);
    }

    #[test]
    fn labels_directives_and_comments() {
        assert_eq!(
            kinds("loop: ; trailing comment"),
            vec![TokenKind::LabelDef("loop".to_owned())]
        );
        assert_eq!(kinds(".blocks 2"), vec![TokenKind::BlocksDirective, TokenKind::Immediate(2)]);
        assert_eq!(kinds(".WARPS 4"), vec![TokenKind::WarpsDirective, TokenKind::Immediate(4)]);
        assert_eq!(kinds("; whole line comment"), vec![]);
        assert_eq!(
            kinds("addi x5, x1, loop"),
            vec![
                TokenKind::Mnemonic(Mnemonic::vector(MnemonicName::Addi)),
                TokenKind::Register(RegisterData::vector(5)),
                TokenKind::Comma,
                TokenKind::Register(RegisterData::vector(1)),
                TokenKind::Comma,
                TokenKind::LabelRef("loop".to_owned()),
            ]
        );
    }

    #[test]
    fn case_insensitive_mnemonics_and_registers() {
        assert_eq!(
            kinds("ADDI X5, S_LW"),
            vec![
                TokenKind::Mnemonic(Mnemonic::vector(MnemonicName::Addi)),
                TokenKind::Register(RegisterData::vector(5)),
                TokenKind::Comma,
                TokenKind::Mnemonic(Mnemonic::scalar(MnemonicName::Lw)),
            ]
        );
        assert_eq!(kinds("PC"), vec![TokenKind::Register(RegisterData::pc())]);
    }

    #[test]
    fn register_number_out_of_range() {
        let (tokens, errors) = tokenize("addi x32, x1, 0");
        assert_eq!(tokens.len(), 5);
        assert_eq!(
            errors,
            vec![AsmError::RegisterRange {
                column: 6,
                number: 32
            }]
        );
    }

    #[test]
    fn collects_several_errors_per_line() {
        let (_, errors) = tokenize("addi x99, !, 0b12");
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], AsmError::RegisterRange { .. }));
        assert!(matches!(errors[1], AsmError::StrayChar { found: '!', .. }));
        assert!(matches!(errors[2], AsmError::Number { .. }));
    }

    #[test]
    fn unknown_directive() {
        let (tokens, errors) = tokenize(".threads 4");
        assert_eq!(tokens, vec![Token { kind: TokenKind::Immediate(4), column: 10 }]);
        assert_eq!(
            errors,
            vec![AsmError::UnknownDirective {
                column: 1,
                name: "threads".to_owned()
            }]
        );
    }
}

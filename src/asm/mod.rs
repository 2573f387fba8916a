//! Two-pass (well, three internally: first pass for addresses/symbols,
//! second pass for branch/jump offset resolution, third pass for bit
//! packing) RISC-V text assembler, built on a `pest` grammar for
//! tokenizing lines into mnemonics and operands.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use pest::Parser;
use pest_derive::Parser;
use regex::Regex;

use crate::disasm::NOP_WORD;
use crate::isa::{self, Format, Reg};
use crate::object::{Object, ObjectExt, SourceInfo, SymbolMap};

#[derive(Parser)]
#[grammar = "src/asm/grammar.pest"]
pub struct RvAsmParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleErrorKind {
    UnknownMnemonic,
    BadRegister,
    DuplicateLabel,
    BadOperandCount,
    BadImmediate,
    SyntaxError,
}

#[derive(Debug, Clone)]
pub struct AssembleError {
    pub kind: AssembleErrorKind,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {:?}: {}", self.line, self.kind, self.message)
    }
}

impl std::error::Error for AssembleError {}

fn err(kind: AssembleErrorKind, line: usize, message: impl Into<String>) -> AssembleError {
    AssembleError {
        kind,
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssembleOption {
    verbose: bool,
}

impl AssembleOption {
    pub fn set_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Reg(Reg),
    Imm(i64),
    Label(String),
}

#[derive(Debug, Clone)]
struct ParsedLine {
    line_no: usize,
    text: String,
    label: Option<String>,
    mnemonic: Option<String>,
    operands: Vec<Operand>,
    addr: Option<u32>,
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strips `#` comments, lowercases, collapses whitespace, replaces `,()`
/// with spaces, and splits a label off the front of a line so it becomes its
/// own logical line — "Preprocess".
fn preprocess(src: &str) -> String {
    let mut out = String::new();
    for raw_line in src.lines() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.to_lowercase();
        let line: String = line
            .chars()
            .map(|c| if c == ',' || c == '(' || c == ')' { ' ' } else { c })
            .collect();
        let line = whitespace_re().replace_all(line.trim(), " ").to_string();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.splitn(2, ' ');
        let first = tokens.next().unwrap();
        if let Some(label) = first.strip_suffix(':') {
            out.push_str(label);
            out.push_str(":\n");
            if let Some(rest) = tokens.next() {
                if !rest.is_empty() {
                    out.push_str(rest);
                    out.push('\n');
                }
            }
        } else {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

fn parse_number(s: &str) -> Option<i64> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v: i64 = if let Some(hex) = s.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        s.parse().ok()?
    };
    Some(if neg { -v } else { v })
}

fn line_col(pair: &pest::iterators::Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn parse_operand(pair: pest::iterators::Pair<Rule>, line_no: usize) -> Result<Operand, AssembleError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::reg => {
            let s = inner.as_str();
            Reg::parse(s)
                .map(Operand::Reg)
                .ok_or_else(|| err(AssembleErrorKind::BadRegister, line_no, format!("unknown register `{s}`")))
        }
        Rule::number => {
            let s = inner.as_str();
            parse_number(s)
                .map(Operand::Imm)
                .ok_or_else(|| err(AssembleErrorKind::BadImmediate, line_no, format!("bad immediate `{s}`")))
        }
        Rule::ident => Ok(Operand::Label(inner.as_str().to_string())),
        _ => unreachable!(),
    }
}

/// First pass: walk logical lines assigning addresses and binding labels.
fn first_pass(pairs: pest::iterators::Pairs<'_, Rule>) -> Result<(Vec<ParsedLine>, SymbolMap), AssembleError> {
    let mut lines = Vec::new();
    let mut symbols: SymbolMap = BTreeMap::new();
    let mut cur_addr: u32 = 0;

    for line_pair in pairs {
        if line_pair.as_rule() != Rule::line {
            continue;
        }
        let line_no = line_col(&line_pair);
        let text = line_pair.as_str().trim().to_string();
        let inner = line_pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::label => {
                let ident_pair = inner.into_inner().next().unwrap();
                let name = ident_pair.as_str().to_string();
                if symbols.contains_key(&name) {
                    return Err(err(
                        AssembleErrorKind::DuplicateLabel,
                        line_no,
                        format!("label `{name}` already defined"),
                    ));
                }
                symbols.insert(name.clone(), cur_addr);
                lines.push(ParsedLine {
                    line_no,
                    text,
                    label: Some(name),
                    mnemonic: None,
                    operands: vec![],
                    addr: None,
                });
            }
            Rule::inst => {
                let mut it = inner.into_inner();
                let mnemonic = it.next().unwrap().as_str().to_string();
                let mut operands = Vec::new();
                for op_pair in it {
                    operands.push(parse_operand(op_pair, line_no)?);
                }
                let addr = cur_addr;
                cur_addr += 4;
                lines.push(ParsedLine {
                    line_no,
                    text,
                    label: None,
                    mnemonic: Some(mnemonic),
                    operands,
                    addr: Some(addr),
                });
            }
            _ => unreachable!(),
        }
    }
    Ok((lines, symbols))
}

/// Second pass: replace the trailing label operand of branches and `jal`
/// with the signed PC-relative byte offset.
fn second_pass(lines: &mut [ParsedLine], symbols: &SymbolMap) -> Result<(), AssembleError> {
    for line in lines.iter_mut() {
        let Some(mnemonic) = line.mnemonic.clone() else {
            continue;
        };
        if mnemonic == "nop" {
            continue;
        }
        let info = isa::lookup_mnemonic(&mnemonic).ok_or_else(|| {
            err(
                AssembleErrorKind::UnknownMnemonic,
                line.line_no,
                format!("unknown mnemonic `{mnemonic}`"),
            )
        })?;
        let is_jal_offset = info.format == Format::J && mnemonic == "jal";
        if info.format != Format::B && !is_jal_offset {
            continue;
        }
        let pc = line.addr.unwrap();
        if let Some(last) = line.operands.last_mut() {
            if let Operand::Label(name) = last {
                let target = *symbols.get(name).ok_or_else(|| {
                    err(
                        AssembleErrorKind::SyntaxError,
                        line.line_no,
                        format!("undefined label `{name}`"),
                    )
                })?;
                *last = Operand::Imm(target as i64 - pc as i64);
            }
        }
    }
    Ok(())
}

fn expect_reg(op: &Operand, line_no: usize) -> Result<u32, AssembleError> {
    match op {
        Operand::Reg(r) => Ok(r.0 as u32),
        _ => Err(err(AssembleErrorKind::BadRegister, line_no, "expected a register")),
    }
}

fn expect_imm(op: &Operand, line_no: usize) -> Result<i64, AssembleError> {
    match op {
        Operand::Imm(v) => Ok(*v),
        Operand::Label(name) => Err(err(
            AssembleErrorKind::SyntaxError,
            line_no,
            format!("unresolved label `{name}` in immediate position"),
        )),
        _ => Err(err(AssembleErrorKind::BadImmediate, line_no, "expected an immediate")),
    }
}

fn operand_count(line: &ParsedLine, n: usize) -> Result<(), AssembleError> {
    if line.operands.len() != n {
        return Err(err(
            AssembleErrorKind::BadOperandCount,
            line.line_no,
            format!("expected {n} operands, found {}", line.operands.len()),
        ));
    }
    Ok(())
}

fn pack_r(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn pack_i(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm: i64) -> u32 {
    let imm = (imm as u32) & 0xFFF;
    (imm << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn pack_i_shift(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, shamt: u32) -> u32 {
    (funct7 << 25) | ((shamt & 0x1f) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn pack_s(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i64) -> u32 {
    let imm = (imm as u32) & 0xFFF;
    let imm11_5 = (imm >> 5) & 0x7f;
    let imm4_0 = imm & 0x1f;
    (imm11_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (imm4_0 << 7) | opcode
}

fn pack_b(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i64) -> u32 {
    let imm = (imm as u32) & 0x1FFF;
    let imm12 = (imm >> 12) & 1;
    let imm11 = (imm >> 11) & 1;
    let imm10_5 = (imm >> 5) & 0x3f;
    let imm4_1 = (imm >> 1) & 0xf;
    (imm12 << 31) | (imm10_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (imm4_1 << 8) | (imm11 << 7) | opcode
}

fn pack_u(opcode: u32, rd: u32, imm: i64) -> u32 {
    ((imm as u32) & 0xFFFFF) << 12 | (rd << 7) | opcode
}

fn pack_j(opcode: u32, rd: u32, imm: i64) -> u32 {
    let imm = (imm as u32) & 0x1FFFFF;
    let imm20 = (imm >> 20) & 1;
    let imm19_12 = (imm >> 12) & 0xFF;
    let imm11 = (imm >> 11) & 1;
    let imm10_1 = (imm >> 1) & 0x3FF;
    (imm20 << 31) | (imm10_1 << 21) | (imm11 << 20) | (imm19_12 << 12) | (rd << 7) | opcode
}

/// Whether the load/jalr operand list is written `rd, rs1, imm` or
/// `rd, imm(rs1)` ("Two syntaxes accepted").
fn split_base_imm(a: &Operand, b: &Operand, line_no: usize) -> Result<(u32, i64), AssembleError> {
    match (a, b) {
        (Operand::Reg(r), Operand::Imm(i)) => Ok((r.0 as u32, *i)),
        (Operand::Imm(i), Operand::Reg(r)) => Ok((r.0 as u32, *i)),
        _ => Err(err(
            AssembleErrorKind::SyntaxError,
            line_no,
            "expected a register and an immediate",
        )),
    }
}

fn assemble_line(line: &ParsedLine) -> Result<u32, AssembleError> {
    let mnemonic = line.mnemonic.as_ref().unwrap();
    if mnemonic == "nop" {
        operand_count(line, 0)?;
        return Ok(NOP_WORD);
    }
    let info = isa::lookup_mnemonic(mnemonic).ok_or_else(|| {
        err(
            AssembleErrorKind::UnknownMnemonic,
            line.line_no,
            format!("unknown mnemonic `{mnemonic}`"),
        )
    })?;
    let opcode = info.value & 0x7f;
    let funct3 = (info.value >> 12) & 0x7;
    let funct7 = (info.value >> 25) & 0x7f;
    let ops = &line.operands;
    let ln = line.line_no;

    match info.format {
        Format::R => {
            operand_count(line, 3)?;
            let rd = expect_reg(&ops[0], ln)?;
            let rs1 = expect_reg(&ops[1], ln)?;
            let rs2 = expect_reg(&ops[2], ln)?;
            Ok(pack_r(opcode, funct3, funct7, rd, rs1, rs2))
        }
        Format::I if matches!(mnemonic.as_str(), "slli" | "srli" | "srai") => {
            operand_count(line, 3)?;
            let rd = expect_reg(&ops[0], ln)?;
            let rs1 = expect_reg(&ops[1], ln)?;
            let shamt = expect_imm(&ops[2], ln)? as u32;
            Ok(pack_i_shift(opcode, funct3, funct7, rd, rs1, shamt))
        }
        Format::I if mnemonic == "jalr" || matches!(mnemonic.as_str(), "lb" | "lh" | "lw" | "lbu" | "lhu") => {
            operand_count(line, 3)?;
            let rd = expect_reg(&ops[0], ln)?;
            let (rs1, imm) = split_base_imm(&ops[1], &ops[2], ln)?;
            Ok(pack_i(opcode, funct3, rd, rs1, imm))
        }
        Format::I => {
            operand_count(line, 3)?;
            let rd = expect_reg(&ops[0], ln)?;
            let rs1 = expect_reg(&ops[1], ln)?;
            let imm = expect_imm(&ops[2], ln)?;
            Ok(pack_i(opcode, funct3, rd, rs1, imm))
        }
        Format::S => {
            operand_count(line, 3)?;
            let rs2 = expect_reg(&ops[0], ln)?;
            let (rs1, imm) = split_base_imm(&ops[1], &ops[2], ln)?;
            Ok(pack_s(opcode, funct3, rs1, rs2, imm))
        }
        Format::B => {
            operand_count(line, 3)?;
            let rs1 = expect_reg(&ops[0], ln)?;
            let rs2 = expect_reg(&ops[1], ln)?;
            let imm = expect_imm(&ops[2], ln)?;
            Ok(pack_b(opcode, funct3, rs1, rs2, imm))
        }
        Format::U => {
            operand_count(line, 2)?;
            let rd = expect_reg(&ops[0], ln)?;
            let imm = expect_imm(&ops[1], ln)?;
            Ok(pack_u(opcode, rd, imm))
        }
        Format::J => {
            let (rd, imm) = match ops.len() {
                1 => (1u32, expect_imm(&ops[0], ln)?), // implicit link register ra
                2 => (expect_reg(&ops[0], ln)?, expect_imm(&ops[1], ln)?),
                n => {
                    return Err(err(
                        AssembleErrorKind::BadOperandCount,
                        ln,
                        format!("expected 1 or 2 operands, found {n}"),
                    ))
                }
            };
            Ok(pack_j(opcode, rd, imm))
        }
    }
}

/// Assembles RISC-V source text into an [`ObjectExt`] carrying the
/// little-endian byte stream and the symbol table.
pub fn assemble(src: &str, option: AssembleOption) -> Result<ObjectExt, AssembleError> {
    let preprocessed = preprocess(src);
    if option.verbose {
        tracing::debug!(preprocessed = %preprocessed, "assembler: preprocessed source");
    }
    let mut pairs = RvAsmParser::parse(Rule::main, &preprocessed)
        .map_err(|e| err(AssembleErrorKind::SyntaxError, 0, e.to_string()))?;
    let top = pairs.next().unwrap().into_inner();

    let (mut lines, symbols) = first_pass(top)?;
    second_pass(&mut lines, &symbols)?;

    let mut obj = Object {
        binary: Vec::new(),
        symbols,
    };
    let mut source = Vec::with_capacity(lines.len());
    for line in &lines {
        if line.mnemonic.is_some() {
            let word = assemble_line(line)?;
            let addr = line.addr.unwrap();
            obj.write_word(addr, word);
            source.push(SourceInfo {
                line_no: line.line_no,
                addr: Some(addr),
                word: Some(word),
                label: None,
                text: line.text.clone(),
            });
        } else {
            source.push(SourceInfo {
                line_no: line.line_no,
                addr: None,
                word: None,
                label: line.label.clone(),
                text: line.text.clone(),
            });
        }
    }
    Ok(ObjectExt { obj, source })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub const SUM_LOOP: &str = r#"
        # sums 0..4 into x2
        addi x1, x0, 5
        addi x2, x0, 0
        addi x3, x0, 0
    loop:
        beq  x3, x1, end
        add  x2, x2, x3
        addi x3, x3, 1
        jal  x0, loop
    end:
        sw   x2, 0(x0)
    "#;

    #[test]
    fn test_parser_accepts_labels_and_instructions() {
        let out = assemble(SUM_LOOP, AssembleOption::default()).unwrap();
        assert_eq!(out.obj.symbols["loop"], 12);
        assert_eq!(out.obj.symbols["end"], 28);
        assert_eq!(out.obj.binary.len(), 32);
    }

    #[test]
    fn unknown_mnemonic_reports_line() {
        let e = assemble("frobnicate x1, x2, x3", AssembleOption::default()).unwrap_err();
        assert_eq!(e.kind, AssembleErrorKind::UnknownMnemonic);
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let src = "foo:\naddi x1, x0, 1\nfoo:\naddi x2, x0, 2\n";
        let e = assemble(src, AssembleOption::default()).unwrap_err();
        assert_eq!(e.kind, AssembleErrorKind::DuplicateLabel);
    }

    #[test]
    fn bad_operand_count_is_rejected() {
        let e = assemble("addi x1, x0", AssembleOption::default()).unwrap_err();
        assert_eq!(e.kind, AssembleErrorKind::BadOperandCount);
    }

    #[test]
    fn nop_pseudo_instruction_assembles_to_addi_zero() {
        let out = assemble("nop", AssembleOption::default()).unwrap();
        assert_eq!(&out.obj.binary[0..4], &NOP_WORD.to_le_bytes());
    }

    #[test]
    fn branch_offset_is_pc_relative() {
        let src = "top:\nbeq x0, x0, top\n";
        let out = assemble(src, AssembleOption::default()).unwrap();
        // offset of -0 == 0 (branch to itself): imm field all zero except opcode/funct3
        let word = u32::from_le_bytes(out.obj.binary[0..4].try_into().unwrap());
        assert_eq!(word & 0x7f, 0b1100011);
    }
}

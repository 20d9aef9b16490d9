//! Quadruple stream to 32-bit x86 assembly (GAS syntax).
//!
//! Output follows the MinGW conventions: `_`-prefixed symbols, `.def`
//! records, CFI directives around each function, `LFB1k`/`LFE1k` anchor
//! labels, read-only strings in `.rdata` sections ahead of their defining
//! function, and a trailer that declares `_printf`.

use std::fmt::Write;

use thiserror::Error;

use crate::ir::Quad;
use crate::translator::{Tables, WORD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("unknown symbol '{name}' in function '{func}'")]
    UnknownSymbol { name: String, func: String },
    #[error("malformed quadruple {quad}")]
    Malformed { quad: String },
    #[error("operator '{op}' is not supported by the assembler")]
    UnsupportedOp { op: String },
}

/// Jump mnemonic suffix for each relational operator.
fn cond_suffix(op: &str) -> Option<&'static str> {
    Some(match op {
        ">" => "g",
        "<" => "l",
        "==" => "eq",
        ">=" => "ge",
        "<=" => "le",
        "!=" => "ne",
        _ => return None,
    })
}

pub struct Assembler<'a> {
    tables: &'a Tables,
    text: String,
    lfb_count: usize,
    lfe_count: Option<usize>,
    cur_func: Option<String>,
}

impl<'a> Assembler<'a> {
    pub fn new(tables: &'a Tables) -> Assembler<'a> {
        Assembler {
            tables,
            text: String::new(),
            lfb_count: 0,
            lfe_count: None,
            cur_func: None,
        }
    }

    /// Consume the instruction stream and return the complete assembly
    /// file. `filename` labels the `.file` directive.
    pub fn assemble(mut self, codes: &[Quad], filename: &str) -> Result<String, AssembleError> {
        for code in codes {
            self.instruction(code)?;
        }
        self.footer();
        let mut out = format!(
            "\t.file\t\"{}\"\n\t.def\t___main;\t.scl\t2;\t.type\t32;\t.endef\n",
            filename
        );
        out.push_str(&self.text);
        Ok(out)
    }

    fn instruction(&mut self, code: &Quad) -> Result<(), AssembleError> {
        match code.op.as_str() {
            "func" => {
                let fname = field(code, &code.result)?.to_string();
                self.cur_func = Some(fname.clone());
                self.func_header(&fname);
                self.func_init(&fname)?;
            }
            "endfunc" => {
                let fname = self.cur_func.take().unwrap_or_default();
                self.func_exit(&fname);
            }
            "param" => {
                let index: i64 = parse_count(code, &code.arg1)?;
                let total: i64 = parse_count(code, &code.result)?;
                let value = field(code, &code.arg2)?.to_string();
                let offset = (total - 1 - index) * WORD_SIZE;
                let offset = if offset == 0 {
                    String::new()
                } else {
                    offset.to_string()
                };
                if value.chars().all(|c| c.is_ascii_digit()) || value.starts_with("LC") {
                    let _ = writeln!(self.text, "\tmovl\t${}, {}(%esp)", value, offset);
                } else {
                    let var = self.get_var(&value)?;
                    let _ = writeln!(self.text, "\tmovl\t{}, %eax", var);
                    let _ = writeln!(self.text, "\tmovl\t%eax, {}(%esp)", offset);
                }
            }
            "call" => {
                let fname = field(code, &code.result)?;
                let _ = writeln!(self.text, "\tcall\t_{}", fname);
            }
            "return" => {
                // A valueless return leaves %eax alone.
                if let Some(value) = &code.result {
                    let var = self.get_var(value)?;
                    let _ = writeln!(self.text, "\tmovl\t{}, %eax", var);
                }
            }
            "label" => {
                let label = field(code, &code.result)?;
                let _ = writeln!(self.text, "{}:", label);
            }
            "j" => {
                let target = field(code, &code.result)?;
                let _ = writeln!(self.text, "\tjmp {}", target);
            }
            op if op.starts_with('j') => {
                let suffix = cond_suffix(&op[1..]).ok_or_else(|| AssembleError::UnsupportedOp {
                    op: op.to_string(),
                })?;
                let left = self.get_var(field(code, &code.arg1)?)?;
                let right = self.get_var(field(code, &code.arg2)?)?;
                let target = field(code, &code.result)?;
                let _ = writeln!(self.text, "\tmovl\t{}, %eax", left);
                let _ = writeln!(self.text, "\tcmpl\t{}, %eax", right);
                let _ = writeln!(self.text, "\tj{} {}", suffix, target);
            }
            "=" => {
                let source = field(code, &code.arg1)?.to_string();
                let dest = self.get_var(field(code, &code.result)?)?;
                if source.chars().all(|c| c.is_ascii_digit()) && !source.is_empty() {
                    let _ = writeln!(self.text, "\tmovl\t${}, {}", source, dest);
                } else {
                    let var = self.get_var(&source)?;
                    let _ = writeln!(self.text, "\tmovl\t{}, %eax", var);
                    let _ = writeln!(self.text, "\tmovl\t%eax, {}", dest);
                }
            }
            "+" | "-" | "*" => {
                let mnemonic = match code.op.as_str() {
                    "+" => "addl",
                    "-" => "subl",
                    _ => "imull",
                };
                let left = self.get_var(field(code, &code.arg1)?)?;
                let right = self.get_var(field(code, &code.arg2)?)?;
                let dest = self.get_var(field(code, &code.result)?)?;
                let _ = writeln!(self.text, "\tmovl\t{}, %eax", left);
                let _ = writeln!(self.text, "\t{}\t{}, %eax", mnemonic, right);
                let _ = writeln!(self.text, "\tmovl\t%eax, {}", dest);
            }
            "/" => {
                // The quotient is left in %eax.
                let left = self.get_var(field(code, &code.arg1)?)?;
                let right = self.get_var(field(code, &code.arg2)?)?;
                let _ = writeln!(self.text, "\tmovl\t{}, %eax", left);
                let _ = writeln!(self.text, "\tcltd");
                let _ = writeln!(self.text, "\tidivl\t{}", right);
            }
            op => {
                return Err(AssembleError::UnsupportedOp { op: op.to_string() });
            }
        }
        Ok(())
    }

    /// Close the previous function's end anchor, dump this function's
    /// interned strings, and declare the symbol.
    fn func_header(&mut self, fname: &str) {
        if let Some(n) = self.lfe_count {
            let _ = writeln!(self.text, "LFE1{}:", n);
            self.lfe_count = Some(n + 1);
        } else {
            self.lfe_count = Some(0);
        }

        let owned: Vec<(&String, usize)> = self
            .tables
            .constant_table
            .iter()
            .filter(|(_, (func, _))| func == fname)
            .map(|(key, (_, ordinal))| (key, *ordinal))
            .collect();
        if !owned.is_empty() {
            self.text.push_str("\t.section .rdata,\"dr\"\n");
            for (key, ordinal) in owned {
                let _ = writeln!(self.text, "LC{}:", ordinal);
                let _ = writeln!(self.text, "\t.ascii \"{}\\0\"", key);
            }
            self.text.push_str("\t.text\n");
        }

        let _ = writeln!(self.text, "\t.globl\t_{}", fname);
        let _ = writeln!(
            self.text,
            "\t.def\t_{};\t.scl\t2;\t.type\t32;\t.endef",
            fname
        );
    }

    fn func_init(&mut self, fname: &str) -> Result<(), AssembleError> {
        let _ = writeln!(self.text, "_{}:", fname);
        let _ = writeln!(self.text, "LFB1{}:", self.lfb_count);
        self.lfb_count += 1;
        self.text.push_str(
            "\t.cfi_startproc\n\tpushl\t%ebp\n\t.cfi_def_cfa_offset 8\n\t.cfi_offset 5, -8\n\tmovl\t%esp, %ebp\n\t.cfi_def_cfa_register 5\n",
        );
        let layout = self
            .tables
            .symbol_table
            .get(fname)
            .ok_or_else(|| AssembleError::UnknownSymbol {
                name: fname.to_string(),
                func: fname.to_string(),
            })?;
        if layout.stacksize > 0 {
            if fname == "main" {
                self.text.push_str("\tandl\t$-16, %esp\n");
            }
            let _ = writeln!(self.text, "\tsubl\t${}, %esp", layout.stacksize);
        }
        if fname == "main" {
            self.text.push_str("\tcall\t___main\n");
        }
        Ok(())
    }

    fn func_exit(&mut self, fname: &str) {
        if fname == "main" {
            self.text.push_str("\tleave\n");
        } else {
            self.text.push_str("\tpopl\t%ebp\n");
        }
        self.text
            .push_str("\t.cfi_restore 5\n\t.cfi_def_cfa 4, 4\n\tret\n\t.cfi_endproc\n");
    }

    fn footer(&mut self) {
        if let Some(n) = self.lfe_count {
            let _ = writeln!(self.text, "LFE1{}:", n);
            self.lfe_count = Some(n + 1);
        }
        let _ = writeln!(
            self.text,
            "\t.ident\t\"BWCC: {}\"",
            env!("CARGO_PKG_VERSION")
        );
        self.text
            .push_str("\t.def\t_printf;\t.scl\t2;\t.type\t32;\t.endef\n");
    }

    /// Render an operand: literals and `LC` labels are immediates, a
    /// `_callee` marker is the value already in `%eax`, anything else is a
    /// stack slot of the current function.
    fn get_var(&self, sym: &str) -> Result<String, AssembleError> {
        let digits = sym.strip_prefix('-').unwrap_or(sym);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Ok(format!("${}", sym));
        }
        if sym.starts_with("LC") {
            return Ok(format!("${}", sym));
        }
        if sym.starts_with('_') {
            return Ok("%eax".to_string());
        }
        let func = self.cur_func.as_deref().unwrap_or("");
        let layout =
            self.tables
                .symbol_table
                .get(func)
                .ok_or_else(|| AssembleError::UnknownSymbol {
                    name: sym.to_string(),
                    func: func.to_string(),
                })?;
        let offset = layout
            .symbols
            .get(sym)
            .ok_or_else(|| AssembleError::UnknownSymbol {
                name: sym.to_string(),
                func: func.to_string(),
            })?;
        if *offset == 0 {
            Ok("(%esp)".to_string())
        } else {
            Ok(format!("{}(%esp)", offset))
        }
    }
}

fn field<'q>(code: &'q Quad, value: &'q Option<String>) -> Result<&'q str, AssembleError> {
    value.as_deref().ok_or_else(|| AssembleError::Malformed {
        quad: code.to_string(),
    })
}

fn parse_count(code: &Quad, value: &Option<String>) -> Result<i64, AssembleError> {
    field(code, value)?
        .parse()
        .map_err(|_| AssembleError::Malformed {
            quad: code.to_string(),
        })
}

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use crate::ir::Quad;
use crate::translator::{Tables, TranslateError};
use crate::{compile, translate, AssembleError, Error};

fn quads(src: &str) -> (Vec<Quad>, Tables) {
    let ast = bwcc_c::parse(src, "<test>").expect("source should parse");
    match translate(&ast) {
        Ok(out) => out,
        Err(e) => panic!("translate failed: {}\nsource: {}", e, src),
    }
}

fn translate_err(src: &str) -> TranslateError {
    let ast = bwcc_c::parse(src, "<test>").expect("source should parse");
    match translate(&ast) {
        Ok(_) => panic!("expected a translate error\nsource: {}", src),
        Err(e) => e,
    }
}

fn asm(src: &str) -> String {
    match compile(src, "test.c") {
        Ok(out) => out.assembly,
        Err(e) => panic!("compile failed: {}\nsource: {}", e, src),
    }
}

fn quad(op: &str, arg1: Option<&str>, arg2: Option<&str>, result: Option<&str>) -> Quad {
    Quad::new(
        op,
        arg1.map(str::to_string),
        arg2.map(str::to_string),
        result.map(str::to_string),
    )
}

/// Structural checks that must hold for any translated unit: temporaries
/// are recorded symbols, frames are 16-byte aligned, interned labels exist,
/// and every conditional jump is paired with a distinct, defined fallthrough
/// target.
fn check_invariants(codes: &[Quad], tables: &Tables) {
    let mut labels: HashMap<String, HashSet<String>> = HashMap::new();
    let mut cur: Option<String> = None;
    for q in codes {
        match q.op.as_str() {
            "func" => cur = q.result.clone(),
            "endfunc" => cur = None,
            "label" => {
                labels
                    .entry(cur.clone().expect("label outside a function"))
                    .or_default()
                    .insert(q.result.clone().expect("label quad has a target"));
            }
            _ => {}
        }
    }

    let mut cur: Option<String> = None;
    for (i, q) in codes.iter().enumerate() {
        match q.op.as_str() {
            "func" => cur = q.result.clone(),
            "endfunc" => {
                cur = None;
                continue;
            }
            _ => {}
        }
        let func = match &cur {
            Some(f) => f.clone(),
            None => continue,
        };
        let layout = &tables.symbol_table[&func];
        assert_eq!(layout.stacksize % 16, 0, "frame of {} is unaligned", func);

        for field in [&q.arg1, &q.arg2, &q.result] {
            if let Some(v) = field {
                let digits = v.strip_prefix('T').unwrap_or("");
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    assert!(
                        layout.symbols.contains_key(v),
                        "temporary {} missing from {}'s symbols",
                        v,
                        func
                    );
                }
            }
        }

        if q.op == "param" {
            if let Some(v) = &q.arg2 {
                if let Some(ordinal) = v.strip_prefix("LC") {
                    let ordinal: usize = ordinal.parse().expect("LC labels are numbered");
                    assert!(
                        tables.constant_table.values().any(|(_, n)| *n == ordinal),
                        "{} has no constant-table entry",
                        v
                    );
                }
            }
        }

        if q.op.starts_with('j') && q.op.len() > 1 {
            let next = &codes[i + 1];
            assert_eq!(next.op, "j", "conditional jump not followed by a jump");
            let taken = q.result.as_ref().unwrap();
            let fallthrough = next.result.as_ref().unwrap();
            assert_ne!(taken, fallthrough, "branch targets must differ");
            let defined = &labels[&func];
            assert!(defined.contains(taken), "{} is undefined", taken);
            assert!(defined.contains(fallthrough), "{} is undefined", fallthrough);
        }
    }
}

// Translator

#[test]
fn empty_program_quads() {
    let (codes, tables) = quads("int main(){}");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("endfunc", None, None, None),
        ]
    );
    assert_eq!(tables.symbol_table["main"].stacksize, 0);
    check_invariants(&codes, &tables);
}

#[test]
fn local_with_initializer_and_return() {
    let (codes, tables) = quads("int main(){ int a = 7; return a; }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("=", Some("7"), None, Some("a")),
            quad("return", None, None, Some("a")),
            quad("endfunc", None, None, None),
        ]
    );
    let layout = &tables.symbol_table["main"];
    assert_eq!(layout.stacksize, 16);
    assert_eq!(layout.symbols["a"], 12);
    check_invariants(&codes, &tables);
}

#[test]
fn if_else_branch_shape() {
    let (codes, tables) =
        quads("int main(){ int a; int b; int x; if (a > b) x = 1; else x = 2; }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("j>", Some("a"), Some("b"), Some("L1")),
            quad("j", None, None, Some("L2")),
            quad("label", None, None, Some("L1")),
            quad("=", Some("1"), None, Some("x")),
            quad("j", None, None, Some("L3")),
            quad("label", None, None, Some("L2")),
            quad("=", Some("2"), None, Some("x")),
            quad("label", None, None, Some("L3")),
            quad("endfunc", None, None, None),
        ]
    );
    check_invariants(&codes, &tables);
}

#[test]
fn if_without_else_falls_to_end_label() {
    let (codes, tables) = quads("int main(){ int a; int x; if (a > 0) x = 1; }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("j>", Some("a"), Some("0"), Some("L1")),
            quad("j", None, None, Some("L2")),
            quad("label", None, None, Some("L1")),
            quad("=", Some("1"), None, Some("x")),
            quad("j", None, None, Some("L2")),
            quad("label", None, None, Some("L2")),
            quad("endfunc", None, None, None),
        ]
    );
    check_invariants(&codes, &tables);
}

#[test]
fn while_template() {
    let (codes, tables) = quads("int main(){ int i = 0; while (i < 10) i++; }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("=", Some("0"), None, Some("i")),
            quad("label", None, None, Some("L1")),
            quad("j<", Some("i"), Some("10"), Some("L2")),
            quad("j", None, None, Some("L3")),
            quad("label", None, None, Some("L2")),
            quad("+", Some("i"), Some("1"), Some("T1")),
            quad("=", Some("T1"), None, Some("i")),
            quad("j", None, None, Some("L1")),
            quad("label", None, None, Some("L3")),
            quad("endfunc", None, None, None),
        ]
    );
    check_invariants(&codes, &tables);
}

#[test]
fn do_while_starts_at_body_label() {
    let (codes, tables) = quads("int main(){ int i = 3; do i--; while (i > 0); }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("=", Some("3"), None, Some("i")),
            quad("label", None, None, Some("L1")),
            quad("-", Some("i"), Some("1"), Some("T1")),
            quad("=", Some("T1"), None, Some("i")),
            quad("j>", Some("i"), Some("0"), Some("L1")),
            quad("j", None, None, Some("L2")),
            quad("label", None, None, Some("L2")),
            quad("endfunc", None, None, None),
        ]
    );
    check_invariants(&codes, &tables);
}

#[test]
fn for_template_visits_init_once_and_next_before_back_edge() {
    let (codes, tables) = quads("int main(){ for (int i = 0; i < 3; i++) ; }");
    assert_eq!(
        codes,
        vec![
            quad("func", None, None, Some("main")),
            quad("=", Some("0"), None, Some("i")),
            quad("label", None, None, Some("L1")),
            quad("j<", Some("i"), Some("3"), Some("L2")),
            quad("j", None, None, Some("L3")),
            quad("label", None, None, Some("L2")),
            quad("+", Some("i"), Some("1"), Some("T1")),
            quad("=", Some("T1"), None, Some("i")),
            quad("j", None, None, Some("L1")),
            quad("label", None, None, Some("L3")),
            quad("endfunc", None, None, None),
        ]
    );
    check_invariants(&codes, &tables);
}

#[test]
fn postfix_yields_operand_prefix_yields_temp() {
    let (codes, _) = quads("int main(){ int i = 0; int x; int y; x = i++; y = ++i; }");
    // i++ assigns back through T1 but the assignment to x reads i itself.
    let after_postfix = codes
        .iter()
        .position(|q| q.op == "=" && q.result.as_deref() == Some("x"))
        .expect("assignment to x");
    assert_eq!(codes[after_postfix], quad("=", Some("i"), None, Some("x")));
    // ++i assigns the incremented temporary.
    let after_prefix = codes
        .iter()
        .position(|q| q.op == "=" && q.result.as_deref() == Some("y"))
        .expect("assignment to y");
    assert_eq!(codes[after_prefix], quad("=", Some("T2"), None, Some("y")));
}

#[test]
fn unary_minus_folds_literals_and_negates_names() {
    let (codes, _) = quads("int main(){ int a; int b; a = -5; b = -a; }");
    assert!(codes.contains(&quad("=", Some("-5"), None, Some("a"))));
    assert!(codes.contains(&quad("-", Some("0"), Some("a"), Some("T1"))));
    assert!(codes.contains(&quad("=", Some("T1"), None, Some("b"))));
}

#[test]
fn parameters_are_recorded_without_growing_the_frame() {
    let (codes, tables) = quads("int f(int a, int b){ return a; }");
    assert_eq!(codes[0], quad("func", None, None, Some("f")));
    let layout = &tables.symbol_table["f"];
    assert_eq!(layout.stacksize, 0);
    // Offsets keep walking down from the aligned frame size even when the
    // frame itself is empty.
    assert_eq!(layout.symbols["a"], -4);
    assert_eq!(layout.symbols["b"], -8);
}

#[test]
fn char_locals_pack_by_word() {
    let (_, tables) = quads("int main(){ char c; char d; int n; }");
    let layout = &tables.symbol_table["main"];
    // 4 + 1 + 1 rounds up to 16; each offset is re-aligned to a word.
    assert_eq!(layout.stacksize, 16);
    assert_eq!(layout.symbols["c"], 12);
    assert_eq!(layout.symbols["d"], 8);
    assert_eq!(layout.symbols["n"], 4);
}

#[test]
fn translating_the_same_ast_twice_is_deterministic() {
    let ast = bwcc_c::parse("int main(){ int i = 0; while (i < 9) i++; }", "<test>").unwrap();
    let first = translate(&ast).unwrap();
    let second = translate(&ast).unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}

const NINE_BY_NINE: &str = r#"
int main(){
    for(int i = 1; i < 10; i++){
        for(int j = 1; j<10; j++){
            printf("%d*%d=%d\t", i, j, i*j);
        }
        printf("\n");
    }
}
"#;

#[test]
fn multiplication_table_constants_and_params() {
    let (codes, tables) = quads(NINE_BY_NINE);
    check_invariants(&codes, &tables);

    let mut expected = IndexMap::new();
    expected.insert(
        "%d*%d=%d\\t".to_string(),
        ("main".to_string(), 0),
    );
    expected.insert("\\n".to_string(), ("main".to_string(), 1));
    assert_eq!(tables.constant_table, expected);

    let params: Vec<&Quad> = codes.iter().filter(|q| q.op == "param").collect();
    assert_eq!(params.len(), 5);
    // Reverse source order: the computed product goes first, the format
    // string last, each quad carrying the total count 4.
    assert_eq!(params[0].arg1.as_deref(), Some("0"));
    assert_eq!(params[0].arg2.as_deref(), Some("T1"));
    assert_eq!(params[1].arg2.as_deref(), Some("j"));
    assert_eq!(params[2].arg2.as_deref(), Some("i"));
    assert_eq!(params[3].arg1.as_deref(), Some("3"));
    assert_eq!(params[3].arg2.as_deref(), Some("LC0"));
    for p in &params[..4] {
        assert_eq!(p.result.as_deref(), Some("4"));
    }
    assert_eq!(params[4].arg2.as_deref(), Some("LC1"));
    assert_eq!(params[4].result.as_deref(), Some("1"));

    assert_eq!(
        codes.iter().filter(|q| q.op == "call").count(),
        2,
        "two printf calls"
    );
}

// Unsupported constructs surface as structured errors.

#[test]
fn unsupported_constructs_are_rejected() {
    let err = translate_err("int main(){ while (1 < 2) break; }");
    assert!(err.to_string().contains("break statement"), "{}", err);

    let err = translate_err("int main(){ int a = 1; a += 2; }");
    assert!(err.to_string().contains("compound assignment"), "{}", err);

    let err = translate_err("int main(){ int x; while (x) x = 0; }");
    assert!(err.to_string().contains("must be a comparison"), "{}", err);

    let err = translate_err("int main(){ long x; }");
    assert!(err.to_string().contains("unknown type 'long'"), "{}", err);

    let err = translate_err("int main(){ char d[100]; }");
    assert!(err.to_string().contains("array declaration"), "{}", err);

    let err = translate_err("int main(){ int *p; }");
    assert!(err.to_string().contains("pointer declaration"), "{}", err);

    let err = translate_err("int f(a) int a; { return a; }");
    assert!(err.to_string().contains("old-style"), "{}", err);

    let err = translate_err("int main(){ for (;;) ; }");
    assert!(err.to_string().contains("must be a comparison"), "{}", err);
}

#[test]
fn modulo_translates_but_does_not_assemble() {
    let src = "int main(){ int a = 7; int b; b = a % 2; }";
    let (codes, tables) = quads(src);
    assert!(codes.iter().any(|q| q.op == "%"));
    match compile(src, "test.c") {
        Err(Error::Assemble(AssembleError::UnsupportedOp { op })) => assert_eq!(op, "%"),
        Err(other) => panic!("expected an unsupported-op error, got {}", other),
        Ok(_) => panic!("expected an unsupported-op error"),
    }
    let _ = tables;
}

// Assembler

#[test]
fn empty_program_assembly() {
    let expected = format!(
        "\t.file\t\"test.c\"\n\
         \t.def\t___main;\t.scl\t2;\t.type\t32;\t.endef\n\
         \t.globl\t_main\n\
         \t.def\t_main;\t.scl\t2;\t.type\t32;\t.endef\n\
         _main:\n\
         LFB10:\n\
         \t.cfi_startproc\n\
         \tpushl\t%ebp\n\
         \t.cfi_def_cfa_offset 8\n\
         \t.cfi_offset 5, -8\n\
         \tmovl\t%esp, %ebp\n\
         \t.cfi_def_cfa_register 5\n\
         \tcall\t___main\n\
         \tleave\n\
         \t.cfi_restore 5\n\
         \t.cfi_def_cfa 4, 4\n\
         \tret\n\
         \t.cfi_endproc\n\
         LFE10:\n\
         \t.ident\t\"BWCC: {}\"\n\
         \t.def\t_printf;\t.scl\t2;\t.type\t32;\t.endef\n",
        env!("CARGO_PKG_VERSION")
    );
    assert_eq!(asm("int main(){}"), expected);
}

#[test]
fn frame_setup_appears_only_with_locals() {
    let text = asm("int main(){}");
    assert!(!text.contains("andl"));
    assert!(!text.contains("subl"));

    let text = asm("int main(){ int a = 7; return a; }");
    assert!(text.contains("\tandl\t$-16, %esp\n"));
    assert!(text.contains("\tsubl\t$16, %esp\n"));
    assert!(text.contains("\tmovl\t$7, 12(%esp)\n"));
    assert!(text.contains("\tmovl\t12(%esp), %eax\n"));
}

#[test]
fn zero_offsets_render_bare() {
    let text = asm("int main(){ int a; int b; int c; int d; d = 9; return d; }");
    assert!(text.contains("\tmovl\t$9, (%esp)\n"));
    assert!(text.contains("\tmovl\t(%esp), %eax\n"));
}

#[test]
fn conditional_jump_lowering() {
    let text = asm("int main(){ int a; int b; int x; if (a > b) x = 1; else x = 2; }");
    assert!(text.contains("\tmovl\t12(%esp), %eax\n\tcmpl\t8(%esp), %eax\n\tjg L1\n"));
    assert!(text.contains("\tjmp L2\n"));
    assert!(text.contains("L3:\n"));
}

#[test]
fn relational_suffixes() {
    for (op, suffix) in [
        (">", "jg"),
        ("<", "jl"),
        ("==", "jeq"),
        (">=", "jge"),
        ("<=", "jle"),
        ("!=", "jne"),
    ] {
        let src = format!("int main(){{ int a; while (a {} 0) a = 1; }}", op);
        let text = asm(&src);
        assert!(text.contains(&format!("\t{} L2\n", suffix)), "{}", text);
    }
}

#[test]
fn division_uses_cltd_and_idivl() {
    let text = asm("int main(){ int a = 8; int b = 2; int c; c = a / b; }");
    assert!(text.contains("\tcltd\n"));
    assert!(text.contains("\tidivl\t8(%esp)\n"));
}

#[test]
fn arithmetic_lowering() {
    let text = asm("int main(){ int a = 1; int b = 2; int c; c = a + b * 2 - 1; }");
    assert!(text.contains("\timull\t"));
    assert!(text.contains("\taddl\t"));
    assert!(text.contains("\tsubl\t$1, %eax\n"));
}

#[test]
fn call_results_flow_through_eax() {
    let text = asm("int f(){ return 3; } int main(){ int x; x = f(); }");
    assert!(text.contains("\tcall\t_f\n"));
    // `_f` renders as %eax: the call's value is already there.
    assert!(text.contains("\tmovl\t%eax, %eax\n"));
    // The first function closes with a plain epilogue, main with leave.
    assert!(text.contains("\tpopl\t%ebp\n"));
    assert!(text.contains("\tleave\n"));
    // Anchor labels advance per function.
    assert!(text.contains("LFB10:\n"));
    assert!(text.contains("LFE10:\n"));
    assert!(text.contains("LFB11:\n"));
    assert!(text.contains("LFE11:\n"));
}

#[test]
fn valueless_return_leaves_eax_alone() {
    let text = asm("int main(){ int a = 1; return; }");
    // The only store targets the local directly; %eax is never touched.
    assert!(!text.contains("%eax"), "{}", text);
}

#[test]
fn strings_are_emitted_in_rdata_before_their_function() {
    let text = asm(NINE_BY_NINE);
    assert!(text.contains("\t.section .rdata,\"dr\"\n"));
    assert!(text.contains("LC0:\n\t.ascii \"%d*%d=%d\\t\\0\"\n"));
    assert!(text.contains("LC1:\n\t.ascii \"\\n\\0\"\n"));
    let rdata = text.find(".rdata").unwrap();
    let entry = text.find("_main:").unwrap();
    assert!(rdata < entry, "constants precede the function body");
    // The format string occupies the lowest outgoing slot.
    assert!(text.contains("\tmovl\t$LC0, (%esp)\n"));
    assert!(text.contains("\tmovl\t$LC1, (%esp)\n"));
    assert!(text.contains("\tmovl\t%eax, 12(%esp)\n"));
}

#[test]
fn negative_literals_load_through_eax() {
    let text = asm("int main(){ int a; a = -5; }");
    assert!(text.contains("\tmovl\t$-5, %eax\n\tmovl\t%eax, 12(%esp)\n"));
}

#[test]
fn multiplication_table_end_to_end() {
    let out = compile(NINE_BY_NINE, "hello.c").expect("pipeline");
    assert!(out.assembly.starts_with("\t.file\t\"hello.c\"\n"));
    assert!(out.assembly.contains("\tcall\t_printf\n"));
    assert!(out.assembly.ends_with(
        "\t.def\t_printf;\t.scl\t2;\t.type\t32;\t.endef\n"
    ));
    check_invariants(&out.codes, &out.tables);
}

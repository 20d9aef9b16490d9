use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use clap::Parser;

/// Compile a C source file to 32-bit x86 assembly.
#[derive(Parser)]
#[command(name = "bwcc", version, about)]
struct Args {
    /// C source file
    input: PathBuf,

    /// Where to write the assembly
    #[arg(short, long, default_value = "hello.s")]
    output: PathBuf,

    /// Print the parsed AST
    #[arg(long)]
    dump_ast: bool,

    /// Print the quadruple listing and the layout tables
    #[arg(long)]
    dump_ir: bool,

    /// Assemble and link the output with the system C compiler
    #[arg(long)]
    link: bool,

    /// Run the linked executable (implies --link)
    #[arg(long)]
    run: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match drive(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bwcc: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn drive(args: &Args) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(&args.input)?;
    let filename = args
        .input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hello.c".to_string());

    let ast = bwcc::parse(&source, &filename)?;
    if args.dump_ast {
        println!("{:#?}", ast);
    }

    let (codes, tables) = bwcc::translate(&ast)?;
    if args.dump_ir {
        for code in &codes {
            println!("{}", code);
        }
        for (func, layout) in &tables.symbol_table {
            println!("{}: stacksize {}", func, layout.stacksize);
            for (name, offset) in &layout.symbols {
                println!("    {} -> {}(%esp)", name, offset);
            }
        }
    }

    let assembly = bwcc::assemble(&codes, &tables, &filename)?;
    fs::write(&args.output, &assembly)?;
    log::info!("wrote {}", args.output.display());

    if args.link || args.run {
        let exe = args.output.with_extension("exe");
        let status = Command::new("cc")
            .arg(&args.output)
            .arg("-o")
            .arg(&exe)
            .status()?;
        if !status.success() {
            return Err(format!("cc exited with {}", status).into());
        }
        if args.run {
            let status = Command::new(&exe).status()?;
            println!("{} exited with {}", exe.display(), status);
        }
    }
    Ok(())
}

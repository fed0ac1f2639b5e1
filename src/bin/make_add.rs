//! Builds the two-entry add module, verifies it and emits it.
//!
//! `--emit ir` prints the module, `--emit asm` disassembles the x86-64 code
//! with one label per entry symbol and shared block, `--emit obj` writes an
//! ELF relocatable object.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};
use log::info;

use multientry::core::CompilationSession;
use multientry::lower::lower;
use multientry::x64::{CompiledBody, ElfWriter, X64Backend, X64Options};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Textual IR
    Ir,
    /// x86-64 assembly listing
    Asm,
    /// ELF relocatable object
    Obj,
}

/// Build the multi-entry add example
#[derive(Parser, Debug)]
#[command(name = "make_add")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// What to emit
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of the shared body symbol
    #[arg(long, default_value = "add")]
    body_name: String,

    /// Print lowering statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn listing(compiled: &CompiledBody) -> String {
    let mut labels: Vec<(u64, String)> = compiled
        .entries
        .iter()
        .map(|entry| (entry.offset, format!("{}:", entry.name)))
        .chain(
            compiled
                .block_offsets
                .iter()
                .map(|(name, offset)| (*offset, format!(".{}:", name))),
        )
        .collect();
    labels.sort_by_key(|&(offset, _)| offset);

    let mut decoder = Decoder::with_ip(
        64,
        &compiled.code,
        compiled.base_address,
        DecoderOptions::NONE,
    );
    let mut formatter = NasmFormatter::new();
    let mut instruction = Instruction::default();
    let mut text = String::new();
    let mut out = format!("; body {}\n", compiled.name);
    let mut next_label = labels.iter().peekable();

    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        let offset = instruction.ip() - compiled.base_address;
        while let Some((_, label)) = next_label.next_if(|(at, _)| *at <= offset) {
            out.push_str(label);
            out.push('\n');
        }
        text.clear();
        formatter.format(&instruction, &mut text);
        out.push_str(&format!("    {:<40} ; {:#06x}\n", text, offset));
    }
    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let add = multientry::build_add_module(&cli.body_name)?;
    add.module.verify(add.body)?;
    info!("module {} verified", add.module.name());

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let options = X64Options::default();

    let bytes = match cli.emit {
        Emit::Ir => add.module.display().to_string().into_bytes(),
        Emit::Asm => {
            let mut backend = X64Backend::with_options(&session, options);
            let compiled = lower(&add.module, add.body, &mut backend)?;
            listing(&compiled).into_bytes()
        }
        Emit::Obj => {
            let mut backend = X64Backend::with_options(&session, options.clone());
            let compiled = lower(&add.module, add.body, &mut backend)?;
            let mut writer = ElfWriter::new(options);
            writer.add_body(&compiled);
            writer.finish()?
        }
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, &bytes)?;
            info!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None if cli.emit == Emit::Obj => {
            return Err("refusing to write an object file to stdout, pass --output".into());
        }
        None => io::stdout().write_all(&bytes)?,
    }

    if cli.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpuasm_cli::{export_labels, load_lines, selector};
use gpuasm_rs::{assemble, isa, write_sections, OutputFormat, ProgTypes};

#[derive(Parser, Debug)]
#[command(author, version, about = "Table-driven GPU assembler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List bundled instruction sets and their variants
    Isas,
    /// Assemble a JSON line list
    Asm {
        /// Input file (JSON array of lines)
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Instruction set
        #[arg(long, default_value = "demo")]
        isa: String,
        /// Processor variant (default: all features)
        #[arg(long)]
        variant: Option<String>,
        /// Program type
        #[arg(long, value_enum)]
        ptype: Option<PType>,
        /// Output format (default depends on the ISA)
        #[arg(long, value_enum)]
        format: Option<Format>,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Export labels to JSON (Vec<{ value, name }>)
        #[arg(long, value_name = "FILE")]
        labels_out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PType {
    Vp,
    Gp,
    Fp,
    Cp,
}

impl From<PType> for ProgTypes {
    fn from(p: PType) -> Self {
        match p {
            PType::Vp => ProgTypes::VERTEX,
            PType::Gp => ProgTypes::GEOMETRY,
            PType::Fp => ProgTypes::FRAGMENT,
            PType::Cp => ProgTypes::COMPUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Raw,
    Hex8,
    Hex32,
    C8,
    C32,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Raw => OutputFormat::Raw,
            Format::Hex8 => OutputFormat::Hex8,
            Format::Hex32 => OutputFormat::Hex32,
            Format::C8 => OutputFormat::CArray8,
            Format::C32 => OutputFormat::CArray32,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Isas => {
            for name in isa::NAMES {
                let Some(desc) = isa::lookup(name) else { continue };
                let variants: Vec<&str> = desc.variants.iter().map(|(n, _)| *n).collect();
                println!("{name}\t{}", variants.join(" "));
            }
        }
        Command::Asm { input, isa: isa_name, variant, ptype, format, output, labels_out } => {
            let desc = isa::lookup(&isa_name)
                .ok_or_else(|| anyhow!("unknown isa {isa_name} (known: {})", isa::NAMES.join(", ")))?;
            let sel = selector(desc, variant.as_deref(), ptype.map(ProgTypes::from))?;
            let lines = load_lines(&input)?;
            let asm = assemble(desc, &sel, &lines)?;
            info!(iterations = asm.iterations, sections = asm.sections.len(), "assembled");

            let fmt = format.map(OutputFormat::from).unwrap_or_else(|| OutputFormat::default_for(desc));
            let mut buf = Vec::new();
            write_sections(&mut buf, &asm.sections, fmt)?;
            match output {
                Some(path) => fs::write(&path, &buf).with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(&buf)?,
            }
            if let Some(path) = labels_out {
                let json = serde_json::to_string_pretty(&export_labels(&asm.labels))?;
                fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }
    Ok(())
}

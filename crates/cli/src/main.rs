//! Command-line inspector for prelinked-kernel Mach-O images

use anyhow::Context;
use clap::Parser;
use kextract_kernelcache as kernelcache;
use kextract_macho::{LoadCommand, MachImage};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "kextract")]
#[command(about = "Prelinked-kernel Mach-O inspector")]
struct Cli {
    /// Input image (kernelcache or plain Mach-O)
    input: PathBuf,

    /// List the embedded kext names from the prelink info
    #[arg(long)]
    kext_names: bool,

    /// Emit a JSON report of the scanned kernelcache
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data = std::fs::read(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    debug!(len = data.len(), "image loaded");

    if cli.json {
        let report = kernelcache::report::build_report(&data)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if cli.kext_names {
        for name in kernelcache::list_kext_names(&data)? {
            println!("{name}");
        }
        return Ok(());
    }

    let image = kernelcache::load(&data)?;
    print_summary(&image);
    Ok(())
}

fn print_summary(image: &MachImage) {
    let header = &image.header;
    println!("cpu type      {:#x}/{:#x}", header.cputype, header.cpusubtype);
    println!("file type     {:#x}", header.filetype);
    println!("load commands {} ({} bytes)", header.ncmds, header.sizeofcmds);

    for command in &image.commands {
        match command {
            LoadCommand::Segment(segment) => {
                println!(
                    "segment {:<16} file {:#010x}+{:#x}",
                    String::from_utf8_lossy(segment.name()),
                    segment.fileoff,
                    segment.filesize
                );
                for section in &segment.sections {
                    println!(
                        "  section {:<16} file {:#010x}+{:#x}",
                        String::from_utf8_lossy(section.name()),
                        section.offset,
                        section.size
                    );
                }
            }
            LoadCommand::Symtab(symtab) => {
                println!("symtab  {} symbols", symtab.symbols.len());
            }
            LoadCommand::Uuid(uuid) => {
                println!("uuid    {}", hex::encode(uuid.uuid));
            }
            LoadCommand::Thread(thread) => {
                println!("thread  flavor {} ({} words)", thread.flavor, thread.count);
            }
            _ => {}
        }
    }
}

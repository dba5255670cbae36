use std::env;
use std::io::{self, Read, Write};

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let num_args = env::args().count();
    if num_args < 2 || num_args > 3 {
        println!("Usage: lscab <path/to/data1.cab> [member\\to\\extract]");
        return Ok(());
    }

    let input_path = env::args().nth(1).unwrap();
    let source = iscab::DirectorySource::new(&input_path);
    let cabinet =
        iscab::Cabinet::new(source).context("Failed to open cabinet")?;

    match env::args().nth(2) {
        Some(member) => {
            let mut reader = cabinet
                .read_file(&member)
                .with_context(|| format!("Failed to extract {:?}", member))?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            io::stdout().write_all(&data)?;
        }
        None => {
            println!("Cabinet version {}:", cabinet.version());
            let mut total_size = 0u64;
            for entry in cabinet.file_entries() {
                let mut notes = String::new();
                if entry.is_compressed() {
                    notes.push_str(" [compressed]");
                }
                if entry.is_split() {
                    notes.push_str(" [split]");
                }
                if entry.is_obfuscated() {
                    notes.push_str(" [obfuscated]");
                }
                println!(
                    "  {} ({} bytes){}",
                    entry.name(),
                    entry.uncompressed_size(),
                    notes
                );
                total_size += u64::from(entry.uncompressed_size());
            }
            println!("  {} bytes total", total_size);
        }
    }

    Ok(())
}

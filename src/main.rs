use clap::{Parser, Subcommand};
use minitar::archive::{self, PackOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minitar", about = "Minimal ustar archive tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into an archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Fixed header mtime (seconds since the epoch) for reproducible output
        #[arg(long)]
        mtime: Option<u64>,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Unpack an archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List archive contents
    List {
        input: PathBuf,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one entry to stdout
    Cat {
        input: PathBuf,
        name:  String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, mtime, input } => {
            let mut ar = archive::create(&output, PackOptions { mtime })?;
            for path in &input {
                let name = path.file_name()
                    .ok_or_else(|| format!("not a file: {}", path.display()))?
                    .to_string_lossy()
                    .into_owned();
                let data = std::fs::read(path)?;
                ar.append(&name, &data)?;
                println!("  packed  {}", path.display());
            }
            ar.finalize()?;
            println!("Created: {}", output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let ar = archive::open(&input)?;
            let n = archive::extract_all(&ar, &output_dir)?;
            println!("Unpacked {n} file(s) to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let ar = archive::open(&input)?;
            let entries = archive::list(&ar);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Archive: {}", input.display());
                println!("{:<40} {:>12} {:>12}", "Name", "Size", "Mtime");
                for e in entries {
                    println!("{:<40} {:>12} {:>12}", e.name, e.size, e.mtime);
                }
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, name } => {
            let ar = archive::open(&input)?;
            let mut out = std::io::stdout().lock();
            out.write_all(ar.get(&name)?)?;
            out.flush()?;
        }
    }

    Ok(())
}

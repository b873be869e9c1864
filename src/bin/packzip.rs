use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::process;

use packzip::{ArchiveFile, DosDateTime, MethodPolicy, Options, ZipBuilder};

#[derive(Parser)]
#[command(name = "packzip")]
#[command(version)]
#[command(about = "Build and inspect zip archives")]
struct Cli {
    /// Log progress (repeat for per-entry detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a new archive
    Pack {
        /// Archive to write
        #[arg(value_name = "ZIP_FILE")]
        zip_file: PathBuf,
        /// Local directory to pack
        #[arg(value_name = "SRC_DIR")]
        src_dir: PathBuf,
        /// Directory name to place every entry under
        #[arg(short, long)]
        prefix: Option<String>,
        /// Store entries without compression
        #[arg(short, long)]
        store: bool,
        /// Deflate level
        #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
        /// Use 1980-01-01 00:00 for every entry so identical input gives identical output
        #[arg(long)]
        reproducible: bool,
        /// Build the archive but do not write it
        #[arg(long)]
        dry_run: bool,
    },

    /// List all entries in the archive
    List {
        #[arg(value_name = "ZIP_FILE")]
        zip_file: PathBuf,
    },

    /// Extract an entry's data to stdout
    Cat {
        #[arg(value_name = "ZIP_FILE")]
        zip_file: PathBuf,
        /// Name of the entry to extract
        name: String,
    },

    /// Unpack the archive to a local directory
    Unpack {
        #[arg(value_name = "ZIP_FILE")]
        zip_file: PathBuf,
        /// Destination directory
        #[arg(value_name = "DEST_DIR")]
        dest_dir: PathBuf,
    },

    /// Check every entry's size and CRC-32
    Verify {
        #[arg(value_name = "ZIP_FILE")]
        zip_file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = handle_command(cli.command) {
        eprintln!("Operation failed: {}", e);
        process::exit(1);
    }
}

fn handle_command(command: Commands) -> packzip::Result<()> {
    match command {
        Commands::Pack {
            zip_file,
            src_dir,
            prefix,
            store,
            level,
            reproducible,
            dry_run,
        } => {
            let options = Options {
                level,
                method: if store {
                    MethodPolicy::Store
                } else {
                    MethodPolicy::Auto
                },
                timestamp: reproducible.then_some(DosDateTime::MIN),
            };

            let mut builder = ZipBuilder::with_options(options);
            println!("Packing '{}'", src_dir.display());
            let count = builder.pack(&src_dir, prefix.as_deref())?;

            let assembled = if dry_run {
                builder.finish()?
            } else {
                builder.save(&zip_file)?
            };

            for w in &assembled.warnings {
                eprintln!("WARN: {}", w);
            }
            println!(
                "{}{}: {} entries, {} bytes",
                if dry_run { "(dry run) " } else { "" },
                zip_file.display(),
                count,
                assembled.bytes.len()
            );
        }

        Commands::List { zip_file } => {
            let file = ArchiveFile::open(zip_file)?;
            let archive = file.archive()?;
            if archive.is_empty() {
                println!("Archive is empty");
                return Ok(());
            }

            println!(
                "{:<40} {:<12} {:<12} {:<8} {:<8} {:<19}",
                "NAME", "SIZE", "PACKED", "METHOD", "RATIO", "MODIFIED"
            );
            println!("{}", "-".repeat(104));

            for entry in archive.entries() {
                let size = entry.uncompressed_size;
                let packed = entry.compressed_size;

                let ratio = if size > 0 {
                    (packed as f64 / size as f64) * 100.0
                } else {
                    100.0
                };
                let modified = entry
                    .modified()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());

                println!(
                    "{:<40} {:<12} {:<12} {:<8} {:<8} {:<19}",
                    entry.name,
                    size,
                    packed,
                    entry.method.name(),
                    format!("{:.1}%", ratio),
                    modified
                );
            }
        }

        Commands::Cat { zip_file, name } => {
            let file = ArchiveFile::open(zip_file)?;
            let data = file.archive()?.read(&name)?;
            io::stdout().write_all(&data)?;
        }

        Commands::Unpack { zip_file, dest_dir } => {
            let file = ArchiveFile::open(zip_file)?;
            let archive = file.archive()?;
            println!("Unpacking to '{}'", dest_dir.display());

            for (index, entry) in archive.entries().iter().enumerate() {
                let Some(relative) = safe_relative(&entry.name) else {
                    eprintln!("WARN: skipping '{}', it escapes the destination", entry.name);
                    continue;
                };
                let data = archive.read_at(index)?;
                let file_path = dest_dir.join(relative);
                if let Some(parent) = file_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(file_path, data)?;
            }
            println!("OK");
        }

        Commands::Verify { zip_file } => {
            let file = ArchiveFile::open(&zip_file)?;
            let archive = file.archive()?;
            archive.verify()?;
            println!("{}: {} entries OK", zip_file.display(), archive.len());
        }
    }
    Ok(())
}

/// Keeps only names that stay inside the destination directory.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| path.to_path_buf())
}

//! Binary entry point for the `ngt` command-line tool.
//!
//! A small front-end over the library's read path:
//!
//! - `ngt ls FILE...`  — one line per chunk: index, ITEM, TITLE, format,
//!   dimensions, DATE
//! - `ngt dump FILE`   — decoded values of one chunk (optionally one plane)
//!
//! Verbosity is a process-wide atomic level: `-q` silences headers, `-v`
//! adds per-file detail.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::Context;
use clap::{Parser, Subcommand};

use gt3::file::ChunkSeek;
use gt3::{Gt3File, Varbuf};

/// 0 = data only; 1 = normal; 2 = verbose.
static DISPLAY_LEVEL: AtomicI32 = AtomicI32::new(1);

fn display_level() -> i32 {
    DISPLAY_LEVEL.load(Ordering::Relaxed)
}

macro_rules! display {
    ($level:expr, $($arg:tt)*) => {
        if display_level() >= $level {
            println!($($arg)*);
        }
    };
}

#[derive(Parser)]
#[command(name = "ngt", about = "Inspect GTOOL3 container files", version)]
struct Cli {
    /// Print more per-file detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print data only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the chunks of one or more files.
    Ls {
        /// Container files to list.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the decoded values of one chunk.
    Dump {
        /// Container file to read.
        file: PathBuf,

        /// Chunk index (default: the first chunk).
        #[arg(short = 't', long = "chunk", default_value_t = 0)]
        chunk: i64,

        /// Restrict output to one z-plane.
        #[arg(short = 'z', long = "plane")]
        plane: Option<usize>,
    },
}

fn ls_one(path: &PathBuf) -> anyhow::Result<()> {
    let mut fp = Gt3File::open(path).with_context(|| format!("{}", path.display()))?;

    display!(2, "# {}: {} bytes", path.display(), fp.file_size());
    display!(
        1,
        "{:>5} {:<16} {:<32} {:<8} {:>14} {:<16}",
        "No.",
        "ITEM",
        "TITLE",
        "DFMT",
        "SIZE",
        "DATE"
    );

    loop {
        let head = fp.read_header()?;
        let [nx, ny, nz] = fp.dimensions();
        println!(
            "{:>5} {:<16} {:<32} {:<8} {:>4}x{:>4}x{:>3} {:<16}",
            fp.chunk_index(),
            head.get_str("ITEM").unwrap_or_default(),
            head.get_str("TITLE").unwrap_or_default(),
            fp.format(),
            nx,
            ny,
            nz,
            head.get_str("DATE").unwrap_or_default(),
        );

        fp.next()?;
        if fp.eof() {
            break;
        }
    }
    Ok(())
}

fn dump(file: &PathBuf, chunk: i64, plane: Option<usize>) -> anyhow::Result<()> {
    let mut fp = Gt3File::open(file).with_context(|| format!("{}", file.display()))?;
    fp.seek_chunk(ChunkSeek::Set(chunk))
        .with_context(|| format!("chunk {chunk}"))?;

    let head = fp.read_header()?;
    let [nx, ny, nz] = fp.dimensions();
    display!(
        1,
        "# {} chunk {}: {} {}x{}x{} miss={}",
        file.display(),
        chunk,
        fp.format(),
        nx,
        ny,
        nz,
        head.get_double("MISS").unwrap_or(-999.0),
    );

    let mut var = Varbuf::new(&mut fp)?;
    let planes: Vec<usize> = match plane {
        Some(z) => vec![z],
        None => (0..nz).collect(),
    };

    for z in planes {
        var.read_z(&mut fp, z)?;
        let mut row = vec![0f64; nx];
        for y in 0..ny {
            var.copy_into_f64(&mut row, (y * nx) as isize, 1);
            for (x, v) in row.iter().enumerate() {
                println!("{x:>6} {y:>6} {z:>4} {v:>20.8e}");
            }
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    gt3::set_program_name("ngt");
    let cli = Cli::parse();

    DISPLAY_LEVEL.store(
        if cli.quiet { 0 } else { 1 + i32::from(cli.verbose) },
        Ordering::Relaxed,
    );

    let result = match &cli.command {
        Command::Ls { files } => files.iter().try_for_each(ls_one),
        Command::Dump { file, chunk, plane } => dump(file, *chunk, *plane),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ngt: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

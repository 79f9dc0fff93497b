// GTOOL3 container library

pub mod axis;
pub mod bitset;
pub mod caltime;
pub mod codec;
pub mod dateiter;
pub mod error;
pub mod file;
pub mod fmt;
pub mod gauss;
pub mod grid;
pub mod header;
pub mod mask;
pub mod pack;
pub mod record;
pub mod time;
pub mod varbuf;
pub mod vcat;
pub mod wire;
pub mod write;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the most common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// Crate-wide error type.
pub use error::{Gt3Error, Result};

/// The process-wide error stack and its knobs.
pub use error::{
    clear_last_error, error_count, last_error, set_exit_on_error, set_print_on_error,
    set_program_name, ErrorKind, ErrorStack,
};

/// An open container file positioned at one chunk.
pub use file::{ChunkSeek, Gt3File};

/// The 1024-byte metadata block heading every chunk.
pub use header::Gt3Header;

/// Storage format tags.
pub use fmt::{ElemKind, Family, Format};

/// The reusable per-chunk decode buffer.
pub use varbuf::{VarData, Varbuf};

/// Write one chunk (header + encoded body) to a stream.
pub use write::{write_chunk, DataRef};

/// Calendar arithmetic.
pub use caltime::{CalTime, Calendar};

/// Header-facing dates, durations, and calendar guessing.
pub use time::{
    duration_between, guess_calendar, guess_calendar_file, guess_calendar_header, time_value,
    Date, Duration, TimeUnit,
};

/// Repeating date stepping.
pub use dateiter::DateIterator;

/// Axis generation, weights, and axis files.
pub use axis::{axis_weight, write_axis_file, write_weight_file, Axis};

/// The virtually concatenated multi-file view.
pub use vcat::VCatFile;

//! Log file format
//!
//! CSV export of the pulse log, one row per accepted pulse.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::PulseRecord;

/// Column header of the exported log
const CSV_HEADER: &str = "timestamp_ms,pulse_width_us,next_gap_ms";

/// Write logged pulses to a CSV file in arrival order.
pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[PulseRecord]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{}",
            row.timestamp_ms, row.pulse_width_us, row.next_gap_ms
        )?;
    }

    writer.flush()
}

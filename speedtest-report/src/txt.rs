//! Plain-text Output

use crate::{write_export, OutputFormat, ReportError};
use speedtest_core::{format_duration, loops_label, relative_display, Cache};
use std::path::Path;

/// One `"{rel}:{signature} | {n} loops, {duration} / loop"` line per record.
pub fn generate_txt_report(cache: &Cache, working_dir: &Path) -> String {
    let mut output = String::new();
    for (source, records) in cache.iter() {
        let rel = relative_display(Path::new(source), working_dir);
        for (signature, record) in records {
            output.push_str(&format!(
                "{}:{} | {}, {} / loop\n",
                rel,
                signature,
                loops_label(record.loop_count),
                format_duration(record.score)
            ));
        }
    }
    output
}

/// Write the text log to the next free `run*.txt` in `dir`.
pub fn write_txt(cache: &Cache, dir: &Path) -> Result<String, ReportError> {
    write_export(dir, OutputFormat::Txt, &generate_txt_report(cache, dir))
}

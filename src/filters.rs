//! Log excerpt extraction
//!
//! Trims a log file down to the part relevant to a single test: from the
//! first line matching the start marker through the first line at or after
//! it matching the end marker, both inclusive. Without an end marker the
//! excerpt runs to the end of the file. Without a start marker nothing is
//! written and the original file is left alone.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::info;

use crate::error::{QaError, Result};

/// Something that can recognise a marker line
pub trait LineMatcher {
    fn matches(&self, line: &str) -> bool;
}

impl LineMatcher for str {
    fn matches(&self, line: &str) -> bool {
        line.contains(self)
    }
}

impl LineMatcher for Regex {
    fn matches(&self, line: &str) -> bool {
        self.is_match(line)
    }
}

/// Outcome of a filter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// An excerpt was written; `end_found` is false when it ran to end of file
    Written { lines: usize, end_found: bool },
    /// No start marker; nothing was written
    StartNotFound,
}

/// Extracts the excerpt between plain-text `start` and `end` markers
///
/// With `inplace` the log file is overwritten; otherwise the excerpt goes to
/// `outfile`, which is then required.
///
/// # Errors
/// * `Filter` - the log file is missing, unreadable or not valid UTF-8
/// * `Configuration` - `inplace` is false and no `outfile` was given
///
/// # Examples
///
/// ```
/// use qakit::filters::{generic_log_filter, FilterOutcome};
///
/// # fn example() -> qakit::error::Result<()> {
/// let dir = std::env::temp_dir();
/// let log = dir.join("qakit-doc-example.log");
/// std::fs::write(&log, "boot\n== start ==\nbody\n== end ==\nshutdown\n")?;
///
/// let outcome = generic_log_filter(&log, "== start ==", "== end ==", true, None)?;
/// assert_eq!(outcome, FilterOutcome::Written { lines: 3, end_found: true });
/// assert_eq!(std::fs::read_to_string(&log)?, "== start ==\nbody\n== end ==\n");
/// # std::fs::remove_file(&log)?;
/// # Ok(())
/// # }
/// ```
pub fn generic_log_filter(
    logfile: &Path,
    start: &str,
    end: &str,
    inplace: bool,
    outfile: Option<&Path>,
) -> Result<FilterOutcome> {
    filter_log(logfile, start, end, inplace, outfile)
}

/// Same as [`generic_log_filter`] with regular-expression markers
pub fn regex_log_filter(
    logfile: &Path,
    start: &Regex,
    end: &Regex,
    inplace: bool,
    outfile: Option<&Path>,
) -> Result<FilterOutcome> {
    filter_log(logfile, start, end, inplace, outfile)
}

fn filter_log<M: LineMatcher + ?Sized>(
    logfile: &Path,
    start: &M,
    end: &M,
    inplace: bool,
    outfile: Option<&Path>,
) -> Result<FilterOutcome> {
    if !logfile.exists() {
        return Err(QaError::Filter(format!(
            "failed finding {} to process",
            logfile.display()
        )));
    }

    let target = match (inplace, outfile) {
        (true, _) => logfile,
        (false, Some(path)) => path,
        (false, None) => {
            return Err(QaError::config(
                "filtering without inplace requires an output file",
            ))
        }
    };

    info!("Processing file {}", logfile.display());
    // Logs are processed as text; a file that is not UTF-8 is rejected whole
    let contents = fs::read_to_string(logfile).map_err(|e| {
        QaError::Filter(format!("failed reading {}: {}", logfile.display(), e))
    })?;

    let Some((excerpt, lines, end_found)) = extract(&contents, start, end) else {
        info!("Couldn't find start of {}, skipping processing", logfile.display());
        return Ok(FilterOutcome::StartNotFound);
    };

    if !end_found {
        info!(
            "End of {} not found, capturing everything past start position",
            logfile.display()
        );
    }

    info!("Saving filtered {} to {}", logfile.display(), target.display());
    fs::write(target, excerpt)?;

    Ok(FilterOutcome::Written { lines, end_found })
}

/// Returns the excerpt, its line count and whether the end marker was seen
///
/// Markers are matched against each line without its terminator.
fn extract<'a, M: LineMatcher + ?Sized>(
    contents: &'a str,
    start: &M,
    end: &M,
) -> Option<(&'a str, usize, bool)> {
    let mut offset = 0;
    let mut from = None;
    let mut lines = 0;

    for raw in contents.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\r', '\n']);
        if from.is_none() && start.matches(line) {
            from = Some(offset);
        }
        offset += raw.len();

        if let Some(begin) = from {
            lines += 1;
            if end.matches(line) {
                return Some((&contents[begin..offset], lines, true));
            }
        }
    }

    from.map(|begin| (&contents[begin..], lines, false))
}

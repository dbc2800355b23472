use std::fs;

use anyhow::Result;
use qakit::error::ErrorKind;
use qakit::filters::{generic_log_filter, regex_log_filter, FilterOutcome};
use regex::Regex;
use tempfile::TempDir;

const LOG: &str = "\
2024-05-01 10:00:00 boot
2024-05-01 10:00:01 === test_login start ===
2024-05-01 10:00:02 POST /login 200
2024-05-01 10:00:03 === test_login end ===
2024-05-01 10:00:04 === test_logout start ===
2024-05-01 10:00:05 shutdown
";

fn write_log(dir: &TempDir, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("app.log");
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn test_inplace_filter_between_markers() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;

    let outcome = generic_log_filter(&log, "test_login start", "test_login end", true, None)?;

    assert_eq!(
        outcome,
        FilterOutcome::Written {
            lines: 3,
            end_found: true
        }
    );
    assert_eq!(
        fs::read_to_string(&log)?,
        "2024-05-01 10:00:01 === test_login start ===\n\
         2024-05-01 10:00:02 POST /login 200\n\
         2024-05-01 10:00:03 === test_login end ===\n"
    );
    Ok(())
}

#[test]
fn test_filter_to_separate_output_leaves_original() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;
    let out = dir.path().join("excerpt.log");

    generic_log_filter(&log, "test_login start", "test_login end", false, Some(&out))?;

    assert_eq!(fs::read_to_string(&log)?, LOG);
    assert!(fs::read_to_string(&out)?.ends_with("test_login end ===\n"));
    Ok(())
}

#[test]
fn test_missing_end_marker_runs_to_end_of_file() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;
    let out = dir.path().join("excerpt.log");

    let outcome = generic_log_filter(&log, "test_logout start", "test_logout end", false, Some(&out))?;

    assert_eq!(
        outcome,
        FilterOutcome::Written {
            lines: 2,
            end_found: false
        }
    );
    assert_eq!(
        fs::read_to_string(&out)?,
        "2024-05-01 10:00:04 === test_logout start ===\n2024-05-01 10:00:05 shutdown\n"
    );
    Ok(())
}

#[test]
fn test_missing_start_marker_changes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;
    let out = dir.path().join("excerpt.log");

    let outcome = generic_log_filter(&log, "test_signup start", "test_signup end", false, Some(&out))?;
    assert_eq!(outcome, FilterOutcome::StartNotFound);
    assert!(!out.exists());

    let outcome = generic_log_filter(&log, "test_signup start", "test_signup end", true, None)?;
    assert_eq!(outcome, FilterOutcome::StartNotFound);
    assert_eq!(fs::read(&log)?, LOG.as_bytes());
    Ok(())
}

#[test]
fn test_missing_logfile() -> Result<()> {
    let dir = TempDir::new()?;
    let log = dir.path().join("absent.log");

    let err = generic_log_filter(&log, "a", "b", true, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Filter);
    assert!(err.to_string().contains("absent.log"));
    Ok(())
}

#[test]
fn test_output_required_when_not_inplace() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;

    let err = generic_log_filter(&log, "start", "end", false, None).unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(fs::read_to_string(&log)?, LOG);
    Ok(())
}

#[test]
fn test_regex_filter() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, LOG)?;
    let start = Regex::new(r"=== test_\w+ start ===$")?;
    let end = Regex::new(r"POST /\w+ \d{3}")?;

    let outcome = regex_log_filter(&log, &start, &end, true, None)?;

    assert_eq!(
        outcome,
        FilterOutcome::Written {
            lines: 2,
            end_found: true
        }
    );
    assert_eq!(
        fs::read_to_string(&log)?,
        "2024-05-01 10:00:01 === test_login start ===\n2024-05-01 10:00:02 POST /login 200\n"
    );
    Ok(())
}

#[test]
fn test_last_line_without_newline() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(&dir, "noise\nBEGIN\ntail")?;

    let outcome = generic_log_filter(&log, "BEGIN", "END", true, None)?;

    assert_eq!(
        outcome,
        FilterOutcome::Written {
            lines: 2,
            end_found: false
        }
    );
    assert_eq!(fs::read_to_string(&log)?, "BEGIN\ntail");
    Ok(())
}

#[test]
fn test_repeated_body_lines_are_all_kept() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_log(
        &dir,
        "noise\nSTART\nretrying\nretrying\nretrying\nEND\nretrying\n",
    )?;
    let out = dir.path().join("excerpt.log");

    let outcome = generic_log_filter(&log, "START", "END", false, Some(&out))?;

    assert_eq!(
        outcome,
        FilterOutcome::Written {
            lines: 5,
            end_found: true
        }
    );
    assert_eq!(
        fs::read_to_string(&out)?,
        "START\nretrying\nretrying\nretrying\nEND\n"
    );
    assert!(fs::read_to_string(&log)?.starts_with("noise\n"));
    Ok(())
}

#[test]
fn test_non_utf8_log_is_filter_error() -> Result<()> {
    let dir = TempDir::new()?;
    let log = dir.path().join("binary.log");
    fs::write(&log, [b'S', b'T', b'A', b'R', b'T', b'\n', 0xff, 0xfe, b'\n'])?;

    let err = generic_log_filter(&log, "START", "END", true, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Filter);
    assert!(err.to_string().contains("binary.log"));
    assert_eq!(fs::read(&log)?[6], 0xff);
    Ok(())
}

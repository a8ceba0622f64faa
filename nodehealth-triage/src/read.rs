/**
 * SPOOL READER - bounded, corruption-tolerant tail reads
 *
 * ROLE: recover the last N valid reports of a spool without reading the
 * whole file. Blocks are read backward from EOF until N valid records are
 * found or the start of the file is reached. Each complete line is parsed
 * once; only the partial line at the front of the window is carried over.
 *
 * Spools are read while the agent is still appending, so bytes after the
 * final newline are treated as an in-flight or torn record: counted as one
 * invalid record, never parsed.
 */

use crate::error::TriageError;
use nodehealth_contracts::HealthReport;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BLOCK_SIZE: u64 = 4096;

/// Tail of one spool file; `reports` are oldest-first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailRead {
    pub reports: Vec<HealthReport>,
    pub invalid: usize,
}

impl TailRead {
    pub fn node_ids(&self) -> BTreeSet<&str> {
        self.reports.iter().map(|r| r.node_id()).collect()
    }
}

/// Tail of one file found in directory mode
#[derive(Debug, Clone, PartialEq)]
pub struct FileTail {
    pub path: PathBuf,
    pub tail: TailRead,
}

pub fn tail(path: &Path, n: usize) -> Result<TailRead, TriageError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TriageError::SpoolMissing(path.to_path_buf()))
        }
        Err(e) => return Err(TriageError::read(path, e)),
    };
    if !meta.is_file() {
        return Err(TriageError::NotAFile(path.to_path_buf()));
    }
    if n == 0 {
        return Ok(TailRead::default());
    }

    let mut file = File::open(path).map_err(|e| TriageError::read(path, e))?;
    let len = file.metadata().map_err(|e| TriageError::read(path, e))?.len();

    let mut pos = len;
    // Start of the oldest line seen so far; its beginning lies before `pos`
    let mut head: Vec<u8> = Vec::new();
    let mut fragment_checked = false;
    let mut read = TailRead::default();

    while pos > 0 && read.reports.len() < n {
        let step = BLOCK_SIZE.min(pos);
        pos -= step;
        let mut block = vec![0u8; step as usize];
        file.seek(SeekFrom::Start(pos))
            .and_then(|_| file.read_exact(&mut block))
            .map_err(|e| TriageError::read(path, e))?;
        block.extend_from_slice(&head);

        let Some(first_newline) = block.iter().position(|b| *b == b'\n') else {
            head = block;
            continue;
        };
        let mut lines: Vec<&[u8]> = block[first_newline + 1..].split(|b| *b == b'\n').collect();
        if !fragment_checked {
            // Bytes after the final newline: in-flight or torn record
            if let Some(fragment) = lines.pop() {
                if !trim(fragment).is_empty() {
                    read.invalid += 1;
                }
            }
            fragment_checked = true;
        }
        for line in lines.into_iter().rev() {
            if read.reports.len() >= n {
                break;
            }
            take_line(&mut read, line);
        }
        head = block[..first_newline].to_vec();
    }

    // At file start the head is a whole line
    if pos == 0 && read.reports.len() < n {
        if fragment_checked {
            take_line(&mut read, &head);
        } else if !trim(&head).is_empty() {
            read.invalid += 1;
        }
    }

    debug!(
        "Tail of {}: {} valid, {} invalid from {} of {} bytes",
        path.display(),
        read.reports.len(),
        read.invalid,
        len - pos,
        len
    );
    read.reports.reverse();
    Ok(read)
}

/// Parse one complete line into `read`, newest-first; blank lines are skipped
fn take_line(read: &mut TailRead, line: &[u8]) {
    let line = trim(line);
    if line.is_empty() {
        return;
    }
    match parse_line(line) {
        Some(report) => read.reports.push(report),
        None => read.invalid += 1,
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end.max(start)]
}

fn parse_line(line: &[u8]) -> Option<HealthReport> {
    let report: HealthReport = serde_json::from_slice(line).ok()?;
    report.validate().ok()?;
    Some(report)
}

/// Tail every regular file in `dir` whose name matches `pattern`, in name order.
/// A file whose tail holds more than one node_id fails the whole read.
pub fn read_dir(dir: &Path, pattern: &str, n: usize) -> Result<Vec<FileTail>, TriageError> {
    if !dir.is_dir() {
        return Err(TriageError::DirMissing(dir.to_path_buf()));
    }
    let matcher = glob::Pattern::new(pattern).map_err(|source| TriageError::BadGlob {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| TriageError::read(dir, e))? {
        let entry = entry.map_err(|e| TriageError::read(dir, e))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if path.is_file() && matcher.matches(&name) {
            paths.push((name, path));
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for (_, path) in paths {
        let tail = tail(&path, n)?;
        let ids = tail.node_ids();
        if ids.len() > 1 {
            let ids = ids.into_iter().collect::<Vec<_>>().join(", ");
            return Err(TriageError::MultipleNodeIds { path, ids });
        }
        files.push(FileTail { path, tail });
    }
    Ok(files)
}

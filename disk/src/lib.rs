use std::{
    cell::Cell,
    fmt,
    fs::{self, File},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    CannotOpen { name: String, kind: io::ErrorKind },
    Read { name: String, kind: io::ErrorKind },
    Spool { kind: io::ErrorKind },
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::CannotOpen { name, kind } => write!(f, "cannot open {}: {}", name, kind),
            DiskError::Read { name, kind } => write!(f, "cannot read {}: {}", name, kind),
            DiskError::Spool { kind } => write!(f, "cannot spool batch input: {}", kind),
        }
    }
}

impl std::error::Error for DiskError {}

static SPOOL_SEQ: AtomicUsize = AtomicUsize::new(0);

pub fn make_name(seq: usize) -> String {
    let mut spool_name = String::from("SPOOL_");
    spool_name.push_str(&format!("{}_{}", std::process::id(), seq));
    spool_name
}

/// A program's backing file. Only the path and the line count are kept in
/// memory; the text itself is read back one page at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    path: PathBuf,
    line_count: usize,
    spooled: bool,
}

impl Script {
    /// The name the script was admitted under. Empty for spooled batch input.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_spooled(&self) -> bool {
        self.spooled
    }

    pub fn page_count(&self, page_size: usize) -> usize {
        if page_size == 0 {
            return 0;
        }
        self.line_count.div_ceil(page_size)
    }
}

fn read_raw_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Line-oriented backing store for program text.
#[derive(Debug)]
pub struct Disk {
    spool_dir: PathBuf,
    page_reads: Cell<usize>,
}

impl Disk {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            page_reads: Cell::new(0),
        }
    }

    /// Number of pages read back from backing files so far.
    pub fn page_reads(&self) -> usize {
        self.page_reads.get()
    }

    /// Opens a script and counts its lines. The path is canonicalised so the
    /// script can be re-read after the working directory changes.
    pub fn open(&self, name: &str) -> Result<Script, DiskError> {
        let cannot_open = |e: io::Error| DiskError::CannotOpen {
            name: name.to_string(),
            kind: e.kind(),
        };
        let path = fs::canonicalize(name).map_err(cannot_open)?;
        let file = File::open(&path).map_err(cannot_open)?;
        let line_count = count_lines(BufReader::new(file)).map_err(|e| DiskError::Read {
            name: name.to_string(),
            kind: e.kind(),
        })?;
        info!("Opened {} ({} lines)", path.display(), line_count);
        Ok(Script {
            name: name.to_string(),
            path,
            line_count,
            spooled: false,
        })
    }

    /// Writes `lines` into a fresh backing file under the spool directory.
    pub fn spool(&self, lines: &[String]) -> Result<Script, DiskError> {
        let seq = SPOOL_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = self.spool_dir.join(make_name(seq));
        let spool_err = |e: io::Error| DiskError::Spool { kind: e.kind() };
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(spool_err)?;
        for line in lines {
            writeln!(file, "{}", line).map_err(spool_err)?;
        }
        file.flush().map_err(spool_err)?;
        info!("Spooled {} lines into {}", lines.len(), path.display());
        Ok(Script {
            name: String::new(),
            path,
            line_count: lines.len(),
            spooled: true,
        })
    }

    /// Reads page `page` of `script`: skips `page * page_size` lines and
    /// returns up to `page_size` lines with their line endings stripped.
    pub fn read_page(
        &self,
        script: &Script,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>, DiskError> {
        let read_err = |e: io::Error| DiskError::Read {
            name: script.path.display().to_string(),
            kind: e.kind(),
        };
        debug!("Start reading page[{}] of {}", page, script.path.display());
        let file = File::open(&script.path).map_err(|e| DiskError::CannotOpen {
            name: script.path.display().to_string(),
            kind: e.kind(),
        })?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        for _ in 0..page * page_size {
            if read_raw_line(&mut reader, &mut buf).map_err(read_err)?.is_none() {
                break;
            }
        }
        let mut lines = Vec::with_capacity(page_size);
        while lines.len() < page_size {
            match read_raw_line(&mut reader, &mut buf).map_err(read_err)? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        self.page_reads.set(self.page_reads.get() + 1);
        debug!("Done reading page[{}]: {} lines", page, lines.len());
        Ok(lines)
    }

    /// Removes the backing file of a spooled script. Scripts the user owns are
    /// never touched.
    pub fn discard(&self, script: &Script) {
        if !script.spooled {
            return;
        }
        if let Err(e) = fs::remove_file(&script.path) {
            warn!("Could not remove spool file {}: {}", script.path.display(), e);
        }
    }
}

impl Default for Disk {
    fn default() -> Self {
        Disk::new(std::env::temp_dir())
    }
}

fn count_lines(mut reader: impl BufRead) -> io::Result<usize> {
    let mut buf = Vec::new();
    let mut count = 0;
    while read_raw_line(&mut reader, &mut buf)?.is_some() {
        count += 1;
    }
    Ok(count)
}

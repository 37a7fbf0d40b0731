use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Every log starts with this marker so a stray file is never replayed as ours.
pub const MAGIC: &[u8; 8] = b"FBWAL001";

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Result of reading a log back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the file up to the end of the last valid entry.
    pub valid_len: u64,
    /// Bytes after the last valid entry (torn write or corruption).
    pub discarded_bytes: u64,
}

/// Append-only write-ahead log.
///
/// Layout: `MAGIC` followed by entries `[u32: len][bincode: Event][u32: crc32]`.
/// A truncated or corrupt tail is dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, writing the header into a new file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if fresh {
            writer.write_all(MAGIC)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted log next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Cut the file back to `len` bytes so later appends follow the last
    /// valid entry instead of a torn tail.
    pub fn truncate_to(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Read every valid event. A missing file replays as empty; a file with a
    /// foreign header is an error.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let total_len = file.metadata()?.len();
        if total_len == 0 {
            return Ok(Replay::default());
        }
        let mut reader = BufReader::new(file);

        // A crash while writing the header of a new file leaves a prefix of it.
        if total_len < MAGIC.len() as u64 {
            let mut partial = Vec::new();
            reader.read_to_end(&mut partial)?;
            if !MAGIC.starts_with(&partial) {
                return Err(bad_header(path));
            }
            return Ok(Replay {
                events: Vec::new(),
                valid_len: 0,
                discarded_bytes: total_len,
            });
        }

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(|_| bad_header(path))?;
        if &magic != MAGIC {
            return Err(bad_header(path));
        }

        let mut events = Vec::new();
        let mut consumed = MAGIC.len() as u64;

        loop {
            let mut len_buf = [0u8; 4];
            if read_or_eof(&mut reader, &mut len_buf)?.is_none() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if (consumed + 8 + len as u64) > total_len {
                break; // torn tail
            }

            let mut payload = vec![0u8; len];
            if read_or_eof(&mut reader, &mut payload)?.is_none() {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if read_or_eof(&mut reader, &mut crc_buf)?.is_none() {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
            consumed += 8 + len as u64;
        }

        Ok(Replay {
            events,
            valid_len: consumed,
            discarded_bytes: total_len - consumed,
        })
    }
}

fn bad_header(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} is not a flexibook log", path.display()),
    )
}

/// `Ok(None)` on a clean or partial EOF.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

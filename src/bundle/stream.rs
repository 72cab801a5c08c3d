//! Filtered archive stream.
//!
//! A producer thread re-scans the bundle and writes the selected entries into
//! an uncompressed tar stream. The bytes travel over a rendezvous channel, so
//! the producer only runs while the consumer is reading: at most one chunk
//! (one header or one copy buffer) is in flight at any time.
//!
//! Every payload entry is checked against the manifest, in order. A mismatch
//! stops the producer and is handed to the consumer as the result of its next
//! `read`.

use super::error::{BundleError, BundleResult};
use super::reader::entry_file_name;
use super::{FileEntry, MANIFEST_NAME};
use crate::tags::TagQuery;
use flate2::read::GzDecoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tar::{Archive, Builder};
use tracing::{debug, warn};

type Chunk = io::Result<Vec<u8>>;

/// Read side of a filtered bundle.
///
/// Supports one forward pass. Dropping the stream (or calling
/// [`FilteredStream::close`]) stops the producer at its next write.
pub struct FilteredStream {
    rx: Option<Receiver<Chunk>>,
    pending: Vec<u8>,
    pos: usize,
    producer: Option<JoinHandle<()>>,
}

impl FilteredStream {
    pub(crate) fn spawn<R>(source: R, files: Vec<FileEntry>, query: TagQuery) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(0);

        let producer = thread::spawn(move || {
            let mut builder = Builder::new(PipeWriter::new(tx));
            match copy_selected(source, &files, &query, &mut builder) {
                Ok(copied) => match builder.into_inner() {
                    Ok(_) => debug!(copied, "Filtered stream complete"),
                    Err(e) => debug!(error = %e, "Filtered stream closed early"),
                },
                Err(err) if builder.get_ref().closed => {
                    debug!(error = %err, "Filtered stream closed early");
                }
                Err(err) => {
                    warn!(error = %err, "Filtered stream aborted");
                    builder.get_mut().fail(err.into());
                }
            }
        });

        Self {
            rx: Some(rx),
            pending: Vec::new(),
            pos: 0,
            producer: Some(producer),
        }
    }

    /// Stop the producer and wait for it to exit.
    pub fn close(mut self) -> io::Result<()> {
        self.rx = None;
        self.join_producer()
    }

    fn join_producer(&mut self) -> io::Result<()> {
        match self.producer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "bundle filter thread panicked")),
            None => Ok(()),
        }
    }
}

impl Read for FilteredStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pos);
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            let Some(rx) = &self.rx else {
                return Ok(0);
            };

            match rx.recv() {
                Ok(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Ok(Err(err)) => {
                    self.rx = None;
                    return Err(err);
                }
                Err(mpsc::RecvError) => {
                    self.rx = None;
                    self.join_producer()?;
                    return Ok(0);
                }
            }
        }
    }
}

/// Write side of the channel. Each `write` hands one chunk to the consumer
/// and blocks until it is taken.
struct PipeWriter {
    tx: SyncSender<Chunk>,
    closed: bool,
}

impl PipeWriter {
    fn new(tx: SyncSender<Chunk>) -> Self {
        Self { tx, closed: false }
    }

    /// Deliver `err` to the consumer and refuse all further writes.
    fn fail(&mut self, err: io::Error) {
        self.closed = true;
        // A consumer that already hung up has nothing to report to.
        let _ = self.tx.send(Err(err));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(broken_pipe());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx.send(Ok(buf.to_vec())).map_err(|_| {
            self.closed = true;
            broken_pipe()
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "filtered stream closed")
}

/// Re-scan `source` from the start and append every selected payload to
/// `out`. Returns the number of payloads copied.
///
/// Unselected payloads are never read; advancing to the next entry discards
/// whatever is left of the current one.
fn copy_selected<R, W>(
    mut source: R,
    files: &[FileEntry],
    query: &TagQuery,
    out: &mut Builder<W>,
) -> BundleResult<usize>
where
    R: Read + Seek,
    W: Write,
{
    source.seek(SeekFrom::Start(0))?;
    let mut archive = Archive::new(GzDecoder::new(source));
    let mut entries = archive
        .entries()
        .map_err(|e| BundleError::invalid_format(e.to_string()))?;

    {
        let manifest = entries
            .next()
            .ok_or_else(|| BundleError::corrupt(MANIFEST_NAME, "end of archive"))??;
        let name = entry_file_name(&manifest)?;
        if name != MANIFEST_NAME {
            return Err(BundleError::corrupt(MANIFEST_NAME, name));
        }
    }

    let mut copied = 0;
    for file in files {
        let mut entry = entries
            .next()
            .ok_or_else(|| BundleError::corrupt(describe(&file.name, file.size), "end of archive"))??;

        let name = entry_file_name(&entry)?;
        let size = entry.size();
        if name != file.name || size != file.size {
            return Err(BundleError::corrupt(
                describe(&file.name, file.size),
                describe(&name, size),
            ));
        }

        if !query.selects_loose(&file.tags) {
            continue;
        }

        let path = entry.path()?.into_owned();
        let mut header = entry.header().clone();
        out.append_data(&mut header, path, &mut entry)?;
        copied += 1;
    }

    Ok(copied)
}

fn describe(name: &str, size: u64) -> String {
    format!("{name} ({size} bytes)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{Bundle, BundleManifest, BundleWriter};
    use crate::calver::CalVer;
    use crate::tags::Tag;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Payload {
        name: &'static str,
        data: Vec<u8>,
        tags: &'static [&'static str],
    }

    fn payload(name: &'static str, data: &[u8], tags: &'static [&'static str]) -> Payload {
        Payload {
            name,
            data: data.to_vec(),
            tags,
        }
    }

    /// Build a bundle whose manifest lists `listed` while the archive holds
    /// `physical`, in that order.
    fn build(listed: &[Payload], physical: &[Payload]) -> Bundle<Cursor<Vec<u8>>> {
        Bundle::open(Cursor::new(build_bytes(listed, physical))).unwrap()
    }

    fn build_bytes(listed: &[Payload], physical: &[Payload]) -> Vec<u8> {
        let mut manifest = BundleManifest::new(CalVer::parse("2023.1.2").unwrap(), "3.3.0");
        for p in listed {
            manifest.files.push(FileEntry::new(
                p.name,
                p.data.len() as u64,
                p.tags.iter().map(|t| Tag::parse(t)).collect(),
            ));
        }
        let mut writer = BundleWriter::new(Vec::new());
        writer.append_manifest(&manifest).unwrap();
        for p in physical {
            writer.append_bytes(p.name, &p.data).unwrap();
        }
        writer.finish().unwrap()
    }

    /// Source reader that counts how many bytes have been pulled from it.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        consumed: Arc<AtomicU64>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.consumed.fetch_add(n as u64, Ordering::SeqCst);
            Ok(n)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    /// Incompressible bytes, so the compressed source is as large as the
    /// payload.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    fn entries_of(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = Archive::new(data);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut body = Vec::new();
                e.read_to_end(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    fn files() -> Vec<Payload> {
        vec![
            payload("a", b"always", &[]),
            payload("b", b"only x", &["x"]),
            payload("c", b"x or y", &["+x", "y"]),
            payload("d", b"debug", &["debug"]),
        ]
    }

    #[test]
    fn test_stream_contains_loose_selection_in_order() {
        let bundle = build(&files(), &files());
        let mut out = Vec::new();
        bundle
            .into_filtered_stream(TagQuery::new(["y"]))
            .read_to_end(&mut out)
            .unwrap();

        let entries = entries_of(&out);
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(entries[1].1, b"x or y");
    }

    #[test]
    fn test_stream_or_tag_matches_plain_query() {
        let bundle = build(&files(), &files());
        let mut out = Vec::new();
        bundle
            .into_filtered_stream(TagQuery::new(["x"]))
            .read_to_end(&mut out)
            .unwrap();

        let names: Vec<String> = entries_of(&out).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_stream_is_uncompressed_tar_with_trailer() {
        let bundle = build(&files(), &files());
        let mut out = Vec::new();
        bundle
            .into_filtered_stream(TagQuery::new(["nothing"]))
            .read_to_end(&mut out)
            .unwrap();

        // Header + one data block for "a", then two zero blocks.
        assert_eq!(out.len(), 512 + 512 + 1024);
        assert!(out[1024..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_stream_preserves_entry_headers() {
        let bundle = build(&files(), &files());
        let mut out = Vec::new();
        bundle
            .into_filtered_stream(TagQuery::new(["debug"]))
            .read_to_end(&mut out)
            .unwrap();

        let mut archive = Archive::new(out.as_slice());
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().mode().unwrap(), 0o644);
            assert!(entry.header().mtime().unwrap() > 0);
        }
    }

    #[test]
    fn test_permuted_payloads_fail_on_read_not_open() {
        let listed = files();
        let mut physical = files();
        physical.swap(1, 2);

        // Opening only decodes the manifest.
        let bundle = build(&listed, &physical);

        let mut out = Vec::new();
        let err = bundle
            .into_filtered_stream(TagQuery::new(["x"]))
            .read_to_end(&mut out)
            .unwrap_err();

        let bundle_err = BundleError::from_io(&err).expect("bundle error");
        assert!(bundle_err.is_corrupt(), "{bundle_err}");

        // Entry "a" was already delivered before the mismatch surfaced.
        assert!(out.len() >= 1024);
        assert_eq!(&out[..1], b"a");
    }

    #[test]
    fn test_size_mismatch_is_corrupt() {
        let listed = vec![payload("a", b"four", &[])];
        let physical = vec![payload("a", b"five!", &[])];
        let bundle = build(&listed, &physical);

        let err = bundle
            .into_filtered_stream(TagQuery::default())
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert!(BundleError::from_io(&err).is_some_and(BundleError::is_corrupt));
    }

    #[test]
    fn test_missing_payload_is_corrupt() {
        let listed = files();
        let physical = vec![payload("a", b"always", &[])];
        let bundle = build(&listed, &physical);

        let err = bundle
            .into_filtered_stream(TagQuery::new(["x"]))
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert!(BundleError::from_io(&err).is_some_and(BundleError::is_corrupt));
    }

    #[test]
    fn test_mismatch_in_skipped_entry_is_still_detected() {
        let listed = vec![payload("a", b"1", &[]), payload("d", b"debug", &["debug"])];
        let physical = vec![payload("a", b"1", &[]), payload("e", b"debug", &["debug"])];
        let bundle = build(&listed, &physical);

        let err = bundle
            .into_filtered_stream(TagQuery::new(["none"]))
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert!(BundleError::from_io(&err).is_some_and(BundleError::is_corrupt));
    }

    #[test]
    fn test_close_releases_producer() {
        let big = vec![7u8; 1 << 20];
        let listed = vec![Payload {
            name: "big",
            data: big.clone(),
            tags: &[],
        }];
        let physical = vec![Payload {
            name: "big",
            data: big,
            tags: &[],
        }];
        let bundle = build(&listed, &physical);

        let mut stream = bundle.into_filtered_stream(TagQuery::default());
        let mut head = [0u8; 16];
        stream.read_exact(&mut head).unwrap();
        assert_eq!(&head[..3], b"big");

        stream.close().unwrap();
    }

    #[test]
    fn test_producer_waits_for_reader() {
        let big = noise(1 << 20);
        let listed = vec![payload("big", &big, &[])];
        let data = build_bytes(&listed, &listed);
        assert!(data.len() > 1 << 19);

        let consumed = Arc::new(AtomicU64::new(0));
        let source = CountingReader {
            inner: Cursor::new(data),
            consumed: Arc::clone(&consumed),
        };
        let bundle = Bundle::open(source).unwrap();
        let mut stream = bundle.into_filtered_stream(TagQuery::default());

        let mut head = [0u8; 512];
        stream.read_exact(&mut head).unwrap();
        thread::sleep(Duration::from_millis(200));

        let pulled = consumed.load(Ordering::SeqCst);
        assert!(pulled < 256 * 1024, "producer read {pulled} bytes ahead");

        stream.close().unwrap();
    }

    #[test]
    fn test_drop_without_reading_does_not_hang() {
        let bundle = build(&files(), &files());
        let stream = bundle.into_filtered_stream(TagQuery::new(["x"]));
        drop(stream);
    }
}

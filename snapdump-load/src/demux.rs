//! Restore stream demultiplexer (C11): the byte-level reader that splits
//! one inbound stream into per-file artifacts, framed by `\n-- <path>\n`
//! headers.
//!
//! Implemented as a small byte-at-a-time state machine with a bounded
//! header-accumulation buffer, so arbitrarily large file payloads are
//! streamed straight to disk rather than held in memory.

use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::classify::has_recognized_suffix;
use crate::error::LoadResult;

const READ_CHUNK_SIZE: usize = 64 * 1024;
const MAX_HEADER_LEN: usize = 4096;

/// Sentinel pushed to the intermediate channel once the stream is
/// exhausted, mirroring the reference design's "END" token.
pub const END_OF_STREAM: &str = "END";

#[derive(PartialEq, Eq)]
enum State {
    Body,
    NewlineSeen,
    Header,
}

pub struct StreamDemux<R> {
    reader: R,
    directory: PathBuf,
}

impl<R: AsyncRead + Unpin> StreamDemux<R> {
    pub fn new(reader: R, directory: impl Into<PathBuf>) -> Self {
        StreamDemux {
            reader,
            directory: directory.into(),
        }
    }

    /// Drains the entire stream, writing each framed file to `directory`
    /// and invoking `on_file` with its relative path as soon as the
    /// *next* header (or EOF) closes it. Calls `on_file` with
    /// [`END_OF_STREAM`] last.
    pub async fn run<F>(mut self, mut on_file: F) -> LoadResult<()>
    where
        F: FnMut(String),
    {
        let mut state = State::Body;
        let mut header_buf: Vec<u8> = Vec::new();
        // `None` for the handle means this file already exists on disk and
        // is being skipped -- bytes are still parsed out of the stream to
        // keep the state machine in sync, just not written anywhere.
        let mut current: Option<(String, Option<File>)> = None;
        let mut read_buf = vec![0u8; READ_CHUNK_SIZE];

        'outer: loop {
            let n = self.reader.read(&mut read_buf).await?;
            if n == 0 {
                break;
            }
            for &byte in &read_buf[..n] {
                match state {
                    State::Body => {
                        if byte == b'\n' {
                            state = State::NewlineSeen;
                        } else if let Some((_, Some(handle))) = &mut current {
                            handle.write_all(&[byte]).await?;
                        }
                    }
                    State::NewlineSeen => {
                        if byte == b'-' {
                            header_buf.clear();
                            header_buf.push(b'\n');
                            header_buf.push(b'-');
                            state = State::Header;
                        } else {
                            if let Some((_, Some(handle))) = &mut current {
                                handle.write_all(b"\n").await?;
                            }
                            if byte == b'\n' {
                                state = State::NewlineSeen;
                            } else {
                                if let Some((_, Some(handle))) = &mut current {
                                    handle.write_all(&[byte]).await?;
                                }
                                state = State::Body;
                            }
                        }
                    }
                    State::Header => {
                        if byte == b'\n' {
                            if let Some(path) = parse_header(&header_buf) {
                                if let Some((name, handle)) = current.take() {
                                    if let Some(mut handle) = handle {
                                        handle.flush().await?;
                                    }
                                    on_file(name);
                                }
                                current = Some((path.clone(), self.open_output(&path).await?));
                            } else {
                                if let Some((_, Some(handle))) = &mut current {
                                    handle.write_all(&header_buf).await?;
                                }
                                // The newline that ended this non-header
                                // line might itself start the next header.
                                state = State::NewlineSeen;
                                continue;
                            }
                            state = State::Body;
                        } else {
                            header_buf.push(byte);
                            if header_buf.len() > MAX_HEADER_LEN {
                                if let Some((_, Some(handle))) = &mut current {
                                    handle.write_all(&header_buf).await?;
                                }
                                header_buf.clear();
                                state = State::Body;
                            }
                        }
                    }
                }
            }
            if n < READ_CHUNK_SIZE {
                // Short read isn't itself EOF for most AsyncRead impls,
                // but keep looping until a zero-length read confirms it.
                continue 'outer;
            }
        }

        // Anything left pending in NewlineSeen/Header state at EOF is
        // flushed as literal body content -- a stream that ends mid-header
        // was truncated, not a dependency the intermediate queue can wait
        // out.
        match state {
            State::NewlineSeen => {
                if let Some((_, Some(handle))) = &mut current {
                    handle.write_all(b"\n").await?;
                }
            }
            State::Header => {
                if let Some((_, Some(handle))) = &mut current {
                    handle.write_all(&header_buf).await?;
                }
            }
            State::Body => {}
        }

        if let Some((name, handle)) = current.take() {
            if let Some(mut handle) = handle {
                handle.flush().await?;
            }
            on_file(name);
        }
        on_file(END_OF_STREAM.to_string());
        Ok(())
    }

    /// Opens the destination for one framed file, or returns `None` if it
    /// already exists on disk -- per the restore protocol, a file already
    /// present is treated as already streamed in a prior attempt and is
    /// skipped rather than overwritten.
    async fn open_output(&self, relative_path: &str) -> LoadResult<Option<File>> {
        let full = self.directory.join(relative_path);
        if full.exists() {
            return Ok(None);
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Some(File::create(&full).await?))
    }
}

fn parse_header(header_buf: &[u8]) -> Option<String> {
    const PREFIX: &[u8] = b"\n-- ";
    if !header_buf.starts_with(PREFIX) {
        return None;
    }
    let path = std::str::from_utf8(&header_buf[PREFIX.len()..]).ok()?.trim();
    if !path.is_empty() && has_recognized_suffix(path) {
        Some(path.to_string())
    } else {
        None
    }
}

pub fn output_path(directory: &Path, relative_path: &str) -> PathBuf {
    directory.join(relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tempdir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("snapload-demux-test-{}-{:?}", tag, std::thread::current().id()));
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    #[tokio::test]
    async fn splits_two_framed_files_and_reports_both_plus_end() {
        let dir = tempdir("two-files");
        let stream = b"\n-- db-schema-create.sql\nCREATE DATABASE db;\n-- db.t-schema.sql\nCREATE TABLE t(id INT);";
        let demux = StreamDemux::new(Cursor::new(stream.to_vec()), dir.clone());
        let mut seen = Vec::new();
        demux.run(|name| seen.push(name)).await.unwrap();
        assert_eq!(
            seen,
            vec![
                "db-schema-create.sql".to_string(),
                "db.t-schema.sql".to_string(),
                END_OF_STREAM.to_string(),
            ]
        );
        let contents = std::fs::read_to_string(dir.join("db-schema-create.sql")).unwrap();
        assert_eq!(contents, "CREATE DATABASE db;");
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn a_plain_newline_in_body_is_preserved() {
        let dir = tempdir("plain-newline");
        let stream = b"\n-- db.t.00000.sql\nline one\nline two\n";
        let demux = StreamDemux::new(Cursor::new(stream.to_vec()), dir.clone());
        let mut seen = Vec::new();
        demux.run(|name| seen.push(name)).await.unwrap();
        let contents = std::fs::read_to_string(dir.join("db.t.00000.sql")).unwrap();
        assert_eq!(contents, "line one\nline two\n");
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn unrecognized_dashdash_sequence_is_kept_as_body_text() {
        let dir = tempdir("not-a-header");
        // "-- not a real path" has no recognized suffix, so it must be
        // written back out as ordinary body content.
        let stream = b"\n-- db.t.00000.sql\nSELECT 1; -- not a real path\nmore data\n";
        let demux = StreamDemux::new(Cursor::new(stream.to_vec()), dir.clone());
        let mut seen = Vec::new();
        demux.run(|name| seen.push(name)).await.unwrap();
        let contents = std::fs::read_to_string(dir.join("db.t.00000.sql")).unwrap();
        assert!(contents.contains("not a real path"));
        std::fs::remove_dir_all(dir).ok();
    }
}

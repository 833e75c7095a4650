/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use reqwest::blocking::{Client, Response};

use crate::error::BbiError;

/* -------------------------------------------------------------------------- */

// A positioned, seekable byte stream. `read_at` is the operation the query
// engine and tree readers actually drive; the default implementation goes
// through `Read + Seek`, which `File` gets for free. `HttpSeekableReader`
// overrides it so a single cached response can serve several small reads.
pub trait ByteSource: Read + Seek {
    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&mut self) -> io::Result<u64> {
        let current = self.seek(SeekFrom::Current(0))?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteSource for File {}

// In-memory byte sources (test fixtures, small pre-loaded indexes).
impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {}

/* -------------------------------------------------------------------------- */

// Wrapper for a file or HTTP stream that supports Read + Seek
#[derive(Debug)]
enum NetFileStream {
    File(File),
    Http(HttpSeekableReader),
}

#[derive(Debug)]
pub struct NetFile {
    stream: NetFileStream,
}

impl NetFile {
    fn new(stream: NetFileStream) -> Self {
        NetFile { stream }
    }

    fn open_file(filename: &str) -> Result<NetFile, BbiError> {
        let path = Path::new(filename);

        if path.exists() && path.is_file() {
            let file = File::open(path)?;
            Ok(NetFile::new(NetFileStream::File(file)))
        } else {
            Err(BbiError::IoFailure {
                offset: 0,
                source: io::Error::new(io::ErrorKind::NotFound, format!("file not found: {}", filename)),
            })
        }
    }

    fn open_http(url: &str) -> Result<NetFile, BbiError> {
        let client    = Client::new();
        let head_resp = client.head(url).send().map_err(http_err)?;

        if !head_resp.status().is_success() {
            return Err(BbiError::IoFailure {
                offset: 0,
                source: io::Error::new(io::ErrorKind::Other, format!("HEAD {} failed: {}", url, head_resp.status())),
            });
        }

        let content_length = head_resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| BbiError::IoFailure {
                offset: 0,
                source: io::Error::new(io::ErrorKind::InvalidData, "missing or invalid Content-Length header"),
            })?;

        let http_reader = HttpSeekableReader::new(client, url.to_string(), content_length);

        Ok(NetFile::new(NetFileStream::Http(http_reader)))
    }

    pub fn open(filename: &str) -> Result<NetFile, BbiError> {
        if filename.starts_with("http://") || filename.starts_with("https://") {
            NetFile::open_http(filename)
        } else {
            NetFile::open_file(filename)
        }
    }
}

fn http_err(e: reqwest::Error) -> BbiError {
    BbiError::IoFailure { offset: 0, source: io::Error::new(io::ErrorKind::Other, e) }
}

impl Read for NetFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            NetFileStream::File(file) => file.read(buf),
            NetFileStream::Http(file) => file.read(buf),
        }
    }
}

impl Seek for NetFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.stream {
            NetFileStream::File(file) => file.seek(pos),
            NetFileStream::Http(file) => file.seek(pos),
        }
    }
}

impl ByteSource for NetFile {
    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        match &mut self.stream {
            NetFileStream::File(file) => {
                file.seek(SeekFrom::Start(offset))?;
                let mut buffer = vec![0u8; len];
                file.read_exact(&mut buffer)?;
                Ok(buffer)
            }
            NetFileStream::Http(http) => http.read_at(offset, len),
        }
    }

    fn size(&mut self) -> io::Result<u64> {
        match &mut self.stream {
            NetFileStream::File(file) => {
                let current = file.seek(SeekFrom::Current(0))?;
                let end = file.seek(SeekFrom::End(0))?;
                file.seek(SeekFrom::Start(current))?;
                Ok(end)
            }
            NetFileStream::Http(http) => Ok(http.content_length),
        }
    }
}

/* -------------------------------------------------------------------------- */

// How much further than the caller asked for we pull in on each Range
// request, so that neighboring small reads (a section header, then its
// body) tend to land inside the same cached response.
const READAHEAD_FACTOR: u64 = 10;
const READAHEAD_MAX    : u64 = 4 * 1024 * 1024;

// HTTP reader that supports seeking using Range requests, with a
// single-slot read-ahead cache of the most recent response.
#[derive(Debug)]
struct HttpSeekableReader {
    client        : Client,
    url           : String,
    current_pos   : u64,
    content_length: u64,
    cache         : Option<(Range<u64>, Vec<u8>)>,
}

impl HttpSeekableReader {
    fn new(client: Client, url: String, content_length: u64) -> Self {
        HttpSeekableReader {
            client,
            url,
            current_pos: 0,
            content_length,
            cache: None,
        }
    }

    fn fetch_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let range_header = format!("bytes={}-{}", range.start, range.end.saturating_sub(1));
        let response: Response = self
            .client
            .get(&self.url)
            .header("Range", range_header)
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let status = response.status();
        if !(status.as_u16() == 206 || status.is_success()) {
            return Err(io::Error::new(io::ErrorKind::Other, format!("HTTP range request failed: {}", status)));
        }

        let bytes = response.bytes().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(bytes.to_vec())
    }

    // Cache-hit when the requested interval is fully contained in the
    // cached one; otherwise fetch a padded range and replace the slot.
    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let want = offset..(offset + len as u64).min(self.content_length);

        if let Some((cached_range, data)) = &self.cache {
            if cached_range.start <= want.start && want.end <= cached_range.end {
                let start = (want.start - cached_range.start) as usize;
                let end   = start + (want.end - want.start) as usize;
                self.current_pos = want.end;
                return Ok(data[start..end].to_vec());
            }
        }

        let padded_len   = (len as u64 * READAHEAD_FACTOR).min(READAHEAD_MAX).max(len as u64);
        let fetch_range  = offset..(offset + padded_len).min(self.content_length);
        let data         = self.fetch_range(fetch_range.clone())?;
        let want_len     = (want.end - want.start) as usize;
        let result       = data.get(..want_len).map(|s| s.to_vec()).unwrap_or_else(|| data.clone());

        self.cache       = Some((fetch_range, data));
        self.current_pos = want.end;

        Ok(result)
    }
}

impl Read for HttpSeekableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_at(self.current_pos, buf.len())?;
        let n = data.len();
        buf[..n].copy_from_slice(&data);
        Ok(n)
    }
}

impl Seek for HttpSeekableReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(p) => {
                if p >= 0 {
                    self.current_pos + p as u64
                } else {
                    self.current_pos.saturating_sub((-p) as u64)
                }
            }
            SeekFrom::End(p) => {
                if p >= 0 {
                    self.content_length + p as u64
                } else {
                    self.content_length.saturating_sub((-p) as u64)
                }
            }
        };

        // Prevent seeking beyond EOF
        if new_pos > self.content_length {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek position beyond file size"));
        }

        self.current_pos = new_pos;

        Ok(new_pos)
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_fails() {
        assert!(NetFile::open("/nonexistent/path/to/file.bw").is_err());
    }

    #[test]
    fn cache_hit_contained_interval() {
        let mut reader = HttpSeekableReader::new(Client::new(), "http://example.invalid/x.bw".into(), 1000);
        reader.cache = Some((0..500, vec![7u8; 500]));
        let data = reader.read_at(10, 20).unwrap();
        assert_eq!(data.len(), 20);
        assert!(data.iter().all(|&b| b == 7));
    }
}

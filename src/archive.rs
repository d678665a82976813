/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: archive.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 11:05:19
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-03 09:27:41
 */

//! Reader for the `.qs` archive container.
//!
//! A container is a newline separated byte stream: the first line carries
//! store metadata, the message follows, and a sentinel line marks the end of
//! the payload. Anything after the sentinel belongs to the store, not the mail.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marks the end of the message payload inside a container.
pub const SENTINEL: &[u8] = b"^^^^^^^^+_~!spacelee@$%^&!@#)_,$^^^^^^^^^^";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to read archive '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// True when the file should be gunzipped before parsing.
pub fn is_compressed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Reads a container from disk and returns the message bytes.
pub fn extract(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let io_err = |source: std::io::Error| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut raw = Vec::new();
    if is_compressed(path) {
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut raw)
            .map_err(io_err)?;
    } else {
        BufReader::new(file).read_to_end(&mut raw).map_err(io_err)?;
    }

    Ok(strip_framing(&raw))
}

/// Drops the metadata line and everything from the sentinel line onwards.
pub fn strip_framing(raw: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(raw.len());

    for line in raw.split(|&b| b == b'\n').skip(1) {
        if contains_sentinel(line) {
            break;
        }
        message.extend_from_slice(line);
        message.push(b'\n');
    }

    message
}

fn contains_sentinel(line: &[u8]) -> bool {
    line.len() >= SENTINEL.len() && line.windows(SENTINEL.len()).any(|w| w == SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn container(lines: &[&str]) -> Vec<u8> {
        lines.join("\n").into_bytes()
    }

    #[test]
    fn test_strip_framing_stops_at_sentinel() {
        let raw = container(&[
            "HEADER",
            "Subject: hi",
            "body line",
            "^^^^^^^^+_~!spacelee@$%^&!@#)_,$^^^^^^^^^^",
            "trailing",
        ]);

        assert_eq!(strip_framing(&raw), b"Subject: hi\nbody line\n".to_vec());
    }

    #[test]
    fn test_strip_framing_without_sentinel() {
        let raw = container(&["meta", "Subject: hi", "", "body"]);
        assert_eq!(strip_framing(&raw), b"Subject: hi\n\nbody\n".to_vec());
    }

    #[test]
    fn test_sentinel_embedded_in_line() {
        let raw = b"meta\nbody\nxx^^^^^^^^+_~!spacelee@$%^&!@#)_,$^^^^^^^^^^yy\nafter".to_vec();
        assert_eq!(strip_framing(&raw), b"body\n".to_vec());
    }

    #[test]
    fn test_trailing_newline_yields_empty_line() {
        let raw = b"meta\nbody\n".to_vec();
        assert_eq!(strip_framing(&raw), b"body\n\n".to_vec());
    }

    #[test]
    fn test_header_only_and_empty_input() {
        assert!(strip_framing(b"only a header").is_empty());
        assert!(strip_framing(b"").is_empty());
    }

    #[test]
    fn test_bytes_are_preserved() {
        let raw = b"meta\r\nSubject: \xc7\xd1\xb1\xdb  \r\n\tfolded\r\n".to_vec();
        assert_eq!(
            strip_framing(&raw),
            b"Subject: \xc7\xd1\xb1\xdb  \r\n\tfolded\r\n\n".to_vec()
        );
    }

    #[test]
    fn test_is_compressed() {
        assert!(is_compressed(Path::new("/store/a.qs.gz")));
        assert!(is_compressed(Path::new("/store/a.qs.GZ")));
        assert!(!is_compressed(Path::new("/store/a.qs")));
        assert!(!is_compressed(Path::new("/store/gz")));
    }

    #[test]
    fn test_extract_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.qs");
        std::fs::write(&path, container(&["meta", "Subject: plain", "body"])).unwrap();

        assert_eq!(extract(&path).unwrap(), b"Subject: plain\nbody\n".to_vec());
    }

    #[test]
    fn test_extract_gzipped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.qs.gz");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&container(&[
                "meta",
                "Subject: packed",
                "^^^^^^^^+_~!spacelee@$%^&!@#)_,$^^^^^^^^^^",
            ]))
            .unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert_eq!(extract(&path).unwrap(), b"Subject: packed\n".to_vec());
    }

    #[test]
    fn test_extract_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.qs");

        let err = extract(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(err.to_string().contains("absent.qs"));
    }

    #[test]
    fn test_extract_corrupt_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.qs.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        assert!(extract(&path).is_err());
    }
}

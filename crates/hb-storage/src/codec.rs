//! On-disk encoding of cache generations.
//!
//! A generation is a gzip stream holding one JSON header line followed by
//! the raw response bodies, concatenated in entry order. The header records
//! each body's length. Names in file paths and index files are hex encoded.

use crate::generation::Generation;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Header;
use hb_net::Method;
use hb_net::RequestKey;
use hb_net::Response;
use hb_net::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::io::Read;
use std::io::Write;

const SNAPSHOT_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct GenerationSnapshot {
    format: u32,
    name: String,
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body_len: usize,
}

/// Serialises `generation` (entries in insertion order) into a gzip blob.
pub fn encode_generation(name: &str, generation: &Generation) -> WorkerResult<Vec<u8>> {
    let snapshot = GenerationSnapshot {
        format: SNAPSHOT_FORMAT_VERSION,
        name: name.to_owned(),
        entries: generation
            .iter()
            .map(|(key, response)| StoredEntry {
                method: key.method.as_str().to_owned(),
                url: key.url.clone(),
                status: response.status.as_u16(),
                status_text: response.status_text.clone(),
                headers: response
                    .headers
                    .iter()
                    .map(|header| (header.name.clone(), header.value.clone()))
                    .collect(),
                body_len: response.body.len(),
            })
            .collect(),
    };

    let header = serde_json::to_vec(&snapshot).map_err(|error| {
        WorkerError::new(
            "storage.snapshot_encode_failed",
            format!("failed to serialise generation `{name}`: {error}"),
        )
    })?;

    let compress_failed = |error: std::io::Error| {
        WorkerError::new(
            "storage.snapshot_compress_failed",
            format!("failed to compress generation `{name}`: {error}"),
        )
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&header).map_err(compress_failed)?;
    encoder.write_all(b"\n").map_err(compress_failed)?;
    for (_, response) in generation.iter() {
        encoder.write_all(&response.body).map_err(compress_failed)?;
    }
    encoder.finish().map_err(|error| {
        WorkerError::new(
            "storage.snapshot_compress_failed",
            format!("failed to finish compressing generation `{name}`: {error}"),
        )
    })
}

/// Inverse of [`encode_generation`]; returns the stored name and entries.
pub fn decode_generation(bytes: &[u8]) -> WorkerResult<(String, Generation)> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut raw).map_err(|error| {
        WorkerError::new(
            "storage.snapshot_decompress_failed",
            format!("generation snapshot is not valid gzip: {error}"),
        )
    })?;

    // Compact JSON never contains a raw newline, so the first one ends the header.
    let header_end = raw.iter().position(|byte| *byte == b'\n').ok_or_else(|| {
        WorkerError::new(
            "storage.snapshot_format_invalid",
            "generation snapshot has no header line",
        )
    })?;
    let snapshot: GenerationSnapshot =
        serde_json::from_slice(&raw[..header_end]).map_err(|error| {
            WorkerError::new(
                "storage.snapshot_format_invalid",
                format!("generation snapshot is not valid JSON: {error}"),
            )
        })?;

    if snapshot.format != SNAPSHOT_FORMAT_VERSION {
        return Err(WorkerError::new(
            "storage.snapshot_version_unsupported",
            format!(
                "generation `{}` uses snapshot format {}, expected {SNAPSHOT_FORMAT_VERSION}",
                snapshot.name, snapshot.format
            ),
        ));
    }

    let mut bodies = &raw[header_end + 1..];
    let mut generation = Generation::default();
    for entry in snapshot.entries {
        if entry.body_len > bodies.len() {
            return Err(WorkerError::new(
                "storage.snapshot_format_invalid",
                format!(
                    "generation `{}` is truncated at `{}`",
                    snapshot.name, entry.url
                ),
            ));
        }
        let (body, rest) = bodies.split_at(entry.body_len);
        bodies = rest;

        let mut headers = Vec::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            headers.push(Header::new(name, value)?);
        }

        let key = RequestKey {
            method: Method::parse(&entry.method)?,
            url: entry.url,
        };
        let response = Response {
            status: StatusCode::new(entry.status)?,
            status_text: entry.status_text,
            headers,
            body: body.to_vec(),
        };
        generation.insert(key, response);
    }

    Ok((snapshot.name, generation))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for byte in bytes {
        out.push(hex_char(byte >> 4));
        out.push(hex_char(byte & 0x0f));
    }
    out
}

pub fn decode_hex(value: &str) -> WorkerResult<Vec<u8>> {
    if !value.len().is_multiple_of(2) {
        return Err(WorkerError::new(
            "storage.hex_invalid",
            "hex field length must be even",
        ));
    }

    let raw = value.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len() / 2);
    for pair in raw.chunks_exact(2) {
        let high = decode_hex_nibble(pair[0])?;
        let low = decode_hex_nibble(pair[1])?;
        bytes.push((high << 4) | low);
    }

    Ok(bytes)
}

pub fn decode_hex_string(value: &str) -> WorkerResult<String> {
    String::from_utf8(decode_hex(value)?).map_err(|error| {
        WorkerError::new(
            "storage.utf8_invalid",
            format!("stored field is not valid UTF-8: {error}"),
        )
    })
}

fn hex_char(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}

fn decode_hex_nibble(byte: u8) -> WorkerResult<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(WorkerError::new(
            "storage.hex_invalid",
            format!("invalid hex character `{}`", byte as char),
        )),
    }
}

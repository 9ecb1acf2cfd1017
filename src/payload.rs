// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counted message payload buffers.
//!
//! `spec.md` §9 calls for "two variants of a payload carrier — one owning a
//! contiguous byte vector, one owning a list of fixed-size chunks with a
//! last-chunk-length — behind a shared reference-counted handle." `Payload`
//! is that handle; `PayloadData` is the enum with the two variants.

use std::sync::Arc;

/// Chunk size used by the chunked representation, chosen to match the
/// kernel's page-granular memory messages (`spec.md` §3 "Message Store
/// Helpers").
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
enum PayloadData {
    Contiguous(Vec<u8>),
    Chunked { chunks: Vec<Vec<u8>>, last_chunk_len: usize },
}

/// A reference-counted, immutable payload buffer. Cloning a `Payload` takes
/// a fresh reference rather than copying bytes, matching the "take fresh
/// references to name and payload" requirement of the push protocol
/// (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct Payload(Arc<PayloadData>);

impl Payload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self { Payload(Arc::new(PayloadData::Contiguous(bytes))) }

    /// Build a payload out of page-sized chunks, the last of which may be
    /// partially filled. `chunks` must all be `CHUNK_SIZE` bytes except
    /// possibly the last, which is truncated to `last_chunk_len`.
    pub fn from_chunks(mut chunks: Vec<Vec<u8>>, last_chunk_len: usize) -> Self {
        if let Some(last) = chunks.last_mut() {
            last.truncate(last_chunk_len);
        }
        Payload(Arc::new(PayloadData::Chunked { chunks, last_chunk_len }))
    }

    pub fn len(&self) -> usize {
        match self.0.as_ref() {
            PayloadData::Contiguous(bytes) => bytes.len(),
            PayloadData::Chunked { chunks, .. } => chunks.iter().map(|c| c.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Materialize the payload as one contiguous byte vector, copying the
    /// chunked representation if necessary.
    pub fn to_vec(&self) -> Vec<u8> {
        match self.0.as_ref() {
            PayloadData::Contiguous(bytes) => bytes.clone(),
            PayloadData::Chunked { chunks, .. } => chunks.concat(),
        }
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`. Used by the
    /// streaming read buffer (`wire.rs`) to marshal a payload across many
    /// system calls without materializing the whole thing up front.
    pub fn copy_range(&self, offset: usize, out: &mut [u8]) {
        match self.0.as_ref() {
            PayloadData::Contiguous(bytes) => {
                out.copy_from_slice(&bytes[offset..offset + out.len()]);
            }
            PayloadData::Chunked { chunks, .. } => {
                let mut remaining_skip = offset;
                let mut written = 0;
                for chunk in chunks {
                    if remaining_skip >= chunk.len() {
                        remaining_skip -= chunk.len();
                        continue;
                    }
                    let start = remaining_skip;
                    remaining_skip = 0;
                    let available = chunk.len() - start;
                    let to_copy = available.min(out.len() - written);
                    out[written..written + to_copy].copy_from_slice(&chunk[start..start + to_copy]);
                    written += to_copy;
                    if written == out.len() {
                        break;
                    }
                }
            }
        }
    }
}

/// Accumulates payload bytes arriving piecemeal (one streaming write call at
/// a time) into page-sized chunks, freezing into a `Payload` once complete.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    chunks: Vec<Vec<u8>>,
    total_len: usize,
}

impl PayloadBuilder {
    pub fn with_capacity(total_len: usize) -> Self {
        PayloadBuilder { chunks: Vec::new(), total_len }
    }

    pub fn extend_from_slice(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if self.chunks.last().map(|c| c.len()).unwrap_or(CHUNK_SIZE) >= CHUNK_SIZE {
                self.chunks.push(Vec::with_capacity(CHUNK_SIZE.min(self.total_len)));
            }
            let chunk = self.chunks.last_mut().unwrap();
            let room = CHUNK_SIZE - chunk.len();
            let take = room.min(data.len());
            chunk.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
    }

    pub fn len(&self) -> usize { self.chunks.iter().map(|c| c.len()).sum() }

    pub fn finish(self) -> Payload {
        if self.chunks.len() <= 1 {
            Payload::from_bytes(self.chunks.into_iter().next().unwrap_or_default())
        } else {
            let last_len = self.chunks.last().map(|c| c.len()).unwrap_or(0);
            Payload::from_chunks(self.chunks, last_len)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_round_trips() {
        let p = Payload::from_bytes(b"hello".to_vec());
        assert_eq!(p.len(), 5);
        assert_eq!(p.to_vec(), b"hello");
        let mut out = [0u8; 3];
        p.copy_range(1, &mut out);
        assert_eq!(&out, b"ell");
    }

    #[test]
    fn chunked_copy_range_spans_chunk_boundary() {
        let p = Payload::from_chunks(vec![vec![1, 2, 3], vec![4, 5, 6]], 3);
        let mut out = [0u8; 4];
        p.copy_range(2, &mut out);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn builder_chunks_large_payload() {
        let mut b = PayloadBuilder::with_capacity(CHUNK_SIZE + 10);
        b.extend_from_slice(&vec![7u8; CHUNK_SIZE + 10]);
        let payload = b.finish();
        assert_eq!(payload.len(), CHUNK_SIZE + 10);
        assert_eq!(payload.to_vec(), vec![7u8; CHUNK_SIZE + 10]);
    }

    #[test]
    fn builder_small_payload_stays_contiguous() {
        let mut b = PayloadBuilder::with_capacity(5);
        b.extend_from_slice(b"hello");
        assert_eq!(b.finish().to_vec(), b"hello");
    }
}

//! Block compression for the binary crate form: LZ4 chunking and the
//! delta/run-length integer codec.
//!
//! Both codecs are symmetric; decode followed by encode is bit-exact for any
//! sequence this module produced, which is what the round-trip tests pin
//! down. The encoders also back the hand-built crate files used in tests —
//! there is no public USDC writer.

use std::collections::BTreeMap;

/// Decompression failure, reported against the owning section by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingError(pub String);

impl std::fmt::Display for CodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

type Result<T> = std::result::Result<T, CodingError>;

fn err(msg: impl Into<String>) -> CodingError {
    CodingError(msg.into())
}

// ---------------------------------------------------------------------------
// LZ4 chunks
// ---------------------------------------------------------------------------

/// Chunk inputs so no single LZ4 block exceeds this.
const MAX_CHUNK: usize = 1 << 20;

/// Layout: one chunk-count byte; `0` means the remainder is a single block
/// decompressing to `uncompressed_size`, otherwise each chunk is
/// `u32 compressed_size, u32 uncompressed_size, data`.
pub fn decompress_chunked(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let Some((&nchunks, rest)) = data.split_first() else {
        return Err(err("empty compressed block"));
    };

    if nchunks == 0 {
        return lz4_flex::block::decompress(rest, uncompressed_size)
            .map_err(|e| err(format!("LZ4 decompression failed: {e}")));
    }

    let mut out = Vec::with_capacity(uncompressed_size);
    let mut cursor = rest;
    for chunk_idx in 0..nchunks {
        if cursor.len() < 8 {
            return Err(err(format!("truncated chunk header in chunk {chunk_idx}")));
        }
        let comp_size = u32::from_le_bytes(cursor[0..4].try_into().unwrap()) as usize;
        let raw_size = u32::from_le_bytes(cursor[4..8].try_into().unwrap()) as usize;
        cursor = &cursor[8..];
        if cursor.len() < comp_size {
            return Err(err(format!("truncated chunk payload in chunk {chunk_idx}")));
        }
        let block = lz4_flex::block::decompress(&cursor[..comp_size], raw_size)
            .map_err(|e| err(format!("LZ4 decompression failed: {e}")))?;
        out.extend_from_slice(&block);
        cursor = &cursor[comp_size..];
    }

    if out.len() != uncompressed_size {
        return Err(err(format!(
            "decompressed size mismatch: got {}, expected {uncompressed_size}",
            out.len()
        )));
    }
    Ok(out)
}

pub fn compress_chunked(data: &[u8]) -> Vec<u8> {
    if data.len() <= MAX_CHUNK {
        let mut out = vec![0u8];
        out.extend_from_slice(&lz4_flex::block::compress(data));
        return out;
    }

    let chunks: Vec<&[u8]> = data.chunks(MAX_CHUNK).collect();
    let mut out = vec![u8::try_from(chunks.len()).expect("chunk count fits a byte")];
    for chunk in chunks {
        let block = lz4_flex::block::compress(chunk);
        out.extend_from_slice(&(block.len() as u32).to_le_bytes());
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(&block);
    }
    out
}

// ---------------------------------------------------------------------------
// Integer coding
// ---------------------------------------------------------------------------

/// Element width of an integer-coded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    /// 32-bit elements: per-delta codes select 0/8/16/32 bits.
    W32,
    /// 64-bit elements: per-delta codes select 0/16/32/64 bits.
    W64,
}

fn delta_code(width: IntWidth, delta: i64, common: i64) -> u8 {
    if delta == common {
        return 0;
    }
    match width {
        IntWidth::W32 => {
            if i8::try_from(delta).is_ok() {
                1
            } else if i16::try_from(delta).is_ok() {
                2
            } else {
                3
            }
        }
        IntWidth::W64 => {
            if i16::try_from(delta).is_ok() {
                1
            } else if i32::try_from(delta).is_ok() {
                2
            } else {
                3
            }
        }
    }
}

/// Delta + run-length coding: the most common successive delta is stored
/// once, every element gets a 2-bit width code, and only non-common deltas
/// are materialized.
pub fn encode_ints(values: &[i64], width: IntWidth) -> Vec<u8> {
    // 32-bit sequences delta in the 32-bit wrapping domain so extreme
    // element pairs still fit a coded width.
    let mut deltas = Vec::with_capacity(values.len());
    let mut prev = 0i64;
    for &v in values {
        let delta = match width {
            IntWidth::W32 => i64::from((v as i32).wrapping_sub(prev as i32)),
            IntWidth::W64 => v.wrapping_sub(prev),
        };
        deltas.push(delta);
        prev = v;
    }

    // Deterministic common-value selection: highest count, smallest value on
    // ties (BTreeMap iteration order).
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &d in &deltas {
        *counts.entry(d).or_insert(0) += 1;
    }
    let common = counts
        .iter()
        .max_by_key(|&(_, c)| c)
        .map(|(&d, _)| d)
        .unwrap_or(0);

    let mut out = Vec::new();
    match width {
        IntWidth::W32 => out.extend_from_slice(&(common as i32).to_le_bytes()),
        IntWidth::W64 => out.extend_from_slice(&common.to_le_bytes()),
    }

    let mut codes = vec![0u8; deltas.len().div_ceil(4)];
    for (i, &d) in deltas.iter().enumerate() {
        let code = delta_code(width, d, common);
        codes[i / 4] |= code << ((i % 4) * 2);
    }
    out.extend_from_slice(&codes);

    for &d in &deltas {
        match (width, delta_code(width, d, common)) {
            (_, 0) => {}
            (IntWidth::W32, 1) => out.push(d as i8 as u8),
            (IntWidth::W32, 2) => out.extend_from_slice(&(d as i16).to_le_bytes()),
            (IntWidth::W32, 3) => out.extend_from_slice(&(d as i32).to_le_bytes()),
            (IntWidth::W64, 1) => out.extend_from_slice(&(d as i16).to_le_bytes()),
            (IntWidth::W64, 2) => out.extend_from_slice(&(d as i32).to_le_bytes()),
            (IntWidth::W64, 3) => out.extend_from_slice(&d.to_le_bytes()),
            _ => unreachable!(),
        }
    }
    out
}

pub fn decode_ints(data: &[u8], count: usize, width: IntWidth) -> Result<Vec<i64>> {
    let common_len = match width {
        IntWidth::W32 => 4,
        IntWidth::W64 => 8,
    };
    if data.len() < common_len {
        return Err(err("integer block too short for common value"));
    }
    let common = match width {
        IntWidth::W32 => i64::from(i32::from_le_bytes(data[0..4].try_into().unwrap())),
        IntWidth::W64 => i64::from_le_bytes(data[0..8].try_into().unwrap()),
    };

    let codes_len = count.div_ceil(4);
    if data.len() < common_len + codes_len {
        return Err(err("integer block too short for code bits"));
    }
    let codes = &data[common_len..common_len + codes_len];
    let mut cursor = &data[common_len + codes_len..];

    let mut take = |n: usize| -> Result<&[u8]> {
        if cursor.len() < n {
            return Err(err("integer block too short for deltas"));
        }
        let (head, tail) = cursor.split_at(n);
        cursor = tail;
        Ok(head)
    };

    let mut out = Vec::with_capacity(count);
    let mut prev = 0i64;
    for i in 0..count {
        let code = (codes[i / 4] >> ((i % 4) * 2)) & 0b11;
        let delta = match (width, code) {
            (_, 0) => common,
            (IntWidth::W32, 1) => i64::from(take(1)?[0] as i8),
            (IntWidth::W32, 2) => i64::from(i16::from_le_bytes(take(2)?.try_into().unwrap())),
            (IntWidth::W32, 3) => i64::from(i32::from_le_bytes(take(4)?.try_into().unwrap())),
            (IntWidth::W64, 1) => i64::from(i16::from_le_bytes(take(2)?.try_into().unwrap())),
            (IntWidth::W64, 2) => i64::from(i32::from_le_bytes(take(4)?.try_into().unwrap())),
            (IntWidth::W64, 3) => i64::from_le_bytes(take(8)?.try_into().unwrap()),
            _ => unreachable!(),
        };
        prev = match width {
            IntWidth::W32 => i64::from((prev as i32).wrapping_add(delta as i32)),
            IntWidth::W64 => prev.wrapping_add(delta),
        };
        out.push(prev);
    }
    Ok(out)
}

/// Compressed-int block as stored inside sections:
/// `u64 compressed_size, u64 coded_size, LZ4-chunked integer-coded payload`.
/// Returns the decoded values and the total bytes consumed.
pub fn read_compressed_ints(
    data: &[u8],
    count: usize,
    width: IntWidth,
) -> Result<(Vec<i64>, usize)> {
    if data.len() < 16 {
        return Err(err("truncated compressed-int block header"));
    }
    let comp_size = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let coded_size = u64::from_le_bytes(data[8..16].try_into().unwrap()) as usize;
    if data.len() < 16 + comp_size {
        return Err(err("truncated compressed-int block payload"));
    }
    let coded = decompress_chunked(&data[16..16 + comp_size], coded_size)?;
    let values = decode_ints(&coded, count, width)?;
    Ok((values, 16 + comp_size))
}

pub fn write_compressed_ints(values: &[i64], width: IntWidth) -> Vec<u8> {
    let coded = encode_ints(values, width);
    let compressed = compress_chunked(&coded);
    let mut out = Vec::with_capacity(16 + compressed.len());
    out.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
    out.extend_from_slice(&(coded.len() as u64).to_le_bytes());
    out.extend_from_slice(&compressed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_chunk_round_trip() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|x| x.to_le_bytes()).collect();
        let compressed = compress_chunked(&data);
        let restored = decompress_chunked(&compressed, data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn lz4_multi_chunk_round_trip() {
        let data = vec![7u8; MAX_CHUNK * 2 + 123];
        let compressed = compress_chunked(&data);
        assert!(compressed[0] >= 3);
        let restored = decompress_chunked(&compressed, data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn lz4_size_mismatch_is_an_error() {
        let compressed = compress_chunked(b"hello world");
        assert!(decompress_chunked(&compressed, 5).is_err());
    }

    #[test]
    fn integer_round_trip_w32() {
        let values: Vec<i64> = vec![0, 1, 2, 3, 10, 11, 12, 400, 401, -5, 70_000];
        let coded = encode_ints(&values, IntWidth::W32);
        let decoded = decode_ints(&coded, values.len(), IntWidth::W32).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn integer_round_trip_w64() {
        let values: Vec<i64> = vec![0, i64::from(i32::MAX) + 10, 17, -9_000_000_000, 17];
        let coded = encode_ints(&values, IntWidth::W64);
        let decoded = decode_ints(&coded, values.len(), IntWidth::W64).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn reencode_is_bit_exact() {
        let values: Vec<i64> = (0..257).map(|i| i * 3 % 97).collect();
        let coded = encode_ints(&values, IntWidth::W32);
        let decoded = decode_ints(&coded, values.len(), IntWidth::W32).unwrap();
        assert_eq!(encode_ints(&decoded, IntWidth::W32), coded);
    }

    #[test]
    fn compressed_int_block_round_trip() {
        let values: Vec<i64> = (0..1000).map(|i| i * i % 1013).collect();
        let mut block = write_compressed_ints(&values, IntWidth::W32);
        block.extend_from_slice(b"trailing");
        let (decoded, consumed) = read_compressed_ints(&block, values.len(), IntWidth::W32).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(&block[consumed..], b"trailing");
    }

    #[test]
    fn truncated_integer_block_fails() {
        let values: Vec<i64> = vec![1, 500, 3];
        let coded = encode_ints(&values, IntWidth::W32);
        assert!(decode_ints(&coded[..coded.len() - 1], values.len(), IntWidth::W32).is_err());
    }
}

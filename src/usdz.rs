//! USDZ container index: a strict subset of ZIP.
//!
//! Every member must be stored (method 0), unencrypted, with its data
//! payload starting on a 64-byte boundary. The walk follows local file
//! headers only and stops at the first non-local signature (the central
//! directory). Nothing is copied; members are byte ranges into the input.

use crate::error::{Result, UsdError, Warnings};
use crate::resolver::file_extension;
use crate::stream::{Endian, StreamReader};

const SECTION: &str = "USDZ";
const LOCAL_HEADER_LEN: usize = 30;
const LOCAL_HEADER_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
/// 88-byte USDC header + one 30-byte ZIP local header.
pub const MIN_USDZ_SIZE: usize = 88 + LOCAL_HEADER_LEN;

/// One archive member: name plus the byte range of its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdzAssetInfo {
    pub filename: String,
    pub byte_begin: usize,
    pub byte_end: usize,
}

/// The scene member a USDZ resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    Usdc,
    Usda,
}

fn integrity(offset: u64, msg: impl Into<String>) -> UsdError {
    UsdError::integrity(SECTION, offset, msg)
}

/// Walk local-file headers and index every member.
pub fn parse_usdz_index(data: &[u8]) -> Result<Vec<UsdzAssetInfo>> {
    if data.len() < MIN_USDZ_SIZE {
        return Err(UsdError::Format(format!(
            "file too short for USDZ: {} byte(s), minimum is {MIN_USDZ_SIZE}",
            data.len()
        )));
    }

    let mut sr = StreamReader::new(data, Endian::Little);
    let mut assets = Vec::new();

    while (sr.tell() as usize + LOCAL_HEADER_LEN) < data.len() {
        let header_at = sr.tell();
        let sig = sr
            .read(4)
            .map_err(|e| integrity(header_at, e.to_string()))?;
        if sig != LOCAL_HEADER_SIG {
            // Central directory reached.
            break;
        }

        let _version_needed = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let flags = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let method = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let _mod_time = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let _mod_date = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let _crc32 = sr.read_u32().map_err(|e| integrity(header_at, e.to_string()))?;
        let _compressed = sr.read_u32().map_err(|e| integrity(header_at, e.to_string()))?;
        let uncompressed = sr.read_u32().map_err(|e| integrity(header_at, e.to_string()))?;
        let name_len = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;
        let extra_len = sr.read_u16().map_err(|e| integrity(header_at, e.to_string()))?;

        if flags & 0x0001 != 0 {
            return Err(integrity(header_at, "encrypted members are not allowed in USDZ"));
        }
        if method != 0 {
            return Err(integrity(
                header_at,
                format!("compressed member (method {method}) is not allowed in USDZ"),
            ));
        }

        let name_bytes = sr
            .read(name_len as usize)
            .map_err(|_| integrity(header_at, "member name extends past end of archive"))?;
        let filename = String::from_utf8_lossy(name_bytes).into_owned();

        sr.seek_from_current(i64::from(extra_len))
            .map_err(|_| integrity(header_at, "extra field extends past end of archive"))?;

        let data_begin = sr.tell() as usize;
        if data_begin % 64 != 0 {
            return Err(integrity(
                data_begin as u64,
                format!("member data for `{filename}` must start on a 64-byte boundary, got offset {data_begin}"),
            ));
        }

        let data_end = data_begin + uncompressed as usize;
        if data_end > data.len() {
            return Err(integrity(
                data_begin as u64,
                format!("member data for `{filename}` extends past end of archive"),
            ));
        }

        assets.push(UsdzAssetInfo {
            filename,
            byte_begin: data_begin,
            byte_end: data_end,
        });

        sr.seek_set(data_end as u64)
            .map_err(|e| integrity(data_begin as u64, e.to_string()))?;
    }

    Ok(assets)
}

/// Pick the primary scene member: the first `.usdc`, else the first `.usda`.
/// Duplicate scene members produce one warning naming the chosen file.
pub fn select_primary_scene(
    assets: &[UsdzAssetInfo],
    warnings: &mut Warnings,
) -> Result<(usize, SceneFormat)> {
    let mut usdc_index: Option<usize> = None;
    let mut usda_index: Option<usize> = None;
    let mut warned = false;

    for (i, asset) in assets.iter().enumerate() {
        match file_extension(&asset.filename).as_str() {
            "usdc" => {
                if let Some(first) = usdc_index {
                    if !warned {
                        warnings.push(format!(
                            "multiple USDC files in USDZ; using the first found: {}",
                            assets[first].filename
                        ));
                        warned = true;
                    }
                } else {
                    usdc_index = Some(i);
                }
            }
            "usda" => {
                if let Some(first) = usda_index {
                    if !warned {
                        warnings.push(format!(
                            "multiple USDA files in USDZ; using the first found: {}",
                            assets[first].filename
                        ));
                        warned = true;
                    }
                } else {
                    usda_index = Some(i);
                }
            }
            _ => {}
        }
    }

    match (usdc_index, usda_index) {
        (Some(c), Some(_)) => {
            warnings.push(format!(
                "both USDA and USDC found in USDZ; using USDC file {}",
                assets[c].filename
            ));
            Ok((c, SceneFormat::Usdc))
        }
        (Some(c), None) => Ok((c, SceneFormat::Usdc)),
        (None, Some(a)) => Ok((a, SceneFormat::Usda)),
        (None, None) => Err(UsdError::Format(
            "neither USDC nor USDA found in USDZ".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal store-only zip builder with 64-byte data alignment.
    pub(crate) fn build_usdz(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in members {
            let header_start = out.len();
            // Pad the *data* start to 64 via the extra field.
            let unpadded_data_start = header_start + LOCAL_HEADER_LEN + name.len();
            let extra_len = (64 - (unpadded_data_start % 64)) % 64;

            out.extend_from_slice(&LOCAL_HEADER_SIG);
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&0u16.to_le_bytes()); // method: stored
            out.extend_from_slice(&0u16.to_le_bytes()); // mod time
            out.extend_from_slice(&0u16.to_le_bytes()); // mod date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc32
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&(extra_len as u16).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend(std::iter::repeat(0u8).take(extra_len));
            debug_assert_eq!(out.len() % 64, 0);
            out.extend_from_slice(data);
        }
        // Truncated central-directory signature stops the walk.
        out.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
        out.resize(out.len().max(MIN_USDZ_SIZE), 0);
        out
    }

    #[test]
    fn indexes_members_without_copying() {
        let usda = b"#usda 1.0\n";
        let png = [0x89u8, b'P', b'N', b'G'];
        let zip = build_usdz(&[("scene.usda", usda), ("tex.png", &png)]);
        let assets = parse_usdz_index(&zip).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].filename, "scene.usda");
        assert_eq!(&zip[assets[0].byte_begin..assets[0].byte_end], usda);
        assert_eq!(assets[0].byte_begin % 64, 0);
        assert_eq!(&zip[assets[1].byte_begin..assets[1].byte_end], &png);
    }

    #[test]
    fn short_file_is_a_format_error() {
        assert!(matches!(
            parse_usdz_index(&[0u8; MIN_USDZ_SIZE - 1]),
            Err(UsdError::Format(_))
        ));
    }

    #[test]
    fn misaligned_member_is_fatal() {
        let mut zip = build_usdz(&[("scene.usda", b"#usda 1.0\n")]);
        // Shrink the extra field by one byte: data lands off-boundary.
        let extra_len = u16::from_le_bytes([zip[28], zip[29]]);
        zip[28..30].copy_from_slice(&(extra_len - 1).to_le_bytes());
        zip.remove(LOCAL_HEADER_LEN + "scene.usda".len());
        assert!(matches!(
            parse_usdz_index(&zip),
            Err(UsdError::Integrity { .. })
        ));
    }

    #[test]
    fn compressed_member_is_fatal() {
        let mut zip = build_usdz(&[("scene.usda", b"#usda 1.0\n")]);
        zip[8..10].copy_from_slice(&8u16.to_le_bytes()); // deflate
        assert!(matches!(
            parse_usdz_index(&zip),
            Err(UsdError::Integrity { .. })
        ));
    }

    #[test]
    fn scene_selection_prefers_usdc_and_warns_on_duplicates() {
        let assets = vec![
            UsdzAssetInfo {
                filename: "Primary.usda".to_string(),
                byte_begin: 0,
                byte_end: 1,
            },
            UsdzAssetInfo {
                filename: "Primary.usdc".to_string(),
                byte_begin: 64,
                byte_end: 65,
            },
        ];
        let mut warnings = Warnings::new();
        let (idx, format) = select_primary_scene(&assets, &mut warnings).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(format, SceneFormat::Usdc);
        assert_eq!(warnings.len(), 1);

        let mut warnings = Warnings::new();
        assert!(select_primary_scene(&[], &mut warnings).is_err());
    }
}

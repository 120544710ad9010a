//! Minimal ISO-BMFF box walking.

use serde::Serialize;

use crate::error::{VidlensError, VidlensResult};

const FTYP: &[u8; 4] = b"ftyp";
const STYP: &[u8; 4] = b"styp";
const MOOF: &[u8; 4] = b"moof";
const MOOV: &[u8; 4] = b"moov";

/// Boxes whose payload is a plain list of child boxes.
const CONTAINER_BOXES: [&[u8; 4]; 14] = [
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"dinf", b"edts", b"mvex", b"moof", b"traf",
    b"mfra", b"udta", b"sinf", b"schi",
];

fn box_type_at(bytes: &[u8], offset: usize) -> Option<&[u8]> {
    bytes.get(offset + 4..offset + 8)
}

pub fn is_init_segment(bytes: &[u8]) -> bool {
    box_type_at(bytes, 0) == Some(FTYP.as_slice())
}

pub fn is_mp4(bytes: &[u8]) -> bool {
    matches!(box_type_at(bytes, 0), Some(t) if t == FTYP || t == STYP || t == MOOF || t == MOOV)
}

/// Slice the leading `ftyp` + `moov` initialization segment out of a byte stream.
///
/// Returns `None` when a box declares a size below its own header or when no
/// `moov` box is found.
pub fn parse_out_init_segment(bytes: &[u8]) -> Option<&[u8]> {
    let mut offset = 0;
    while offset < bytes.len() {
        let size = read_u32(bytes, offset)? as usize;
        if size < 8 {
            return None;
        }

        let end = offset + size;
        if box_type_at(bytes, offset) == Some(MOOV.as_slice()) {
            return bytes.get(..end);
        }
        offset = end;
    }

    None
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Big-endian reader over a box payload. Reading past the end is a
/// [`VidlensError::MalformedBox`].
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn take(&mut self, len: usize) -> VidlensResult<&'a [u8]> {
        let end = self.position + len;
        let slice = self.bytes.get(self.position..end).ok_or_else(|| {
            VidlensError::MalformedBox(format!(
                "unexpected end of box at offset {} (wanted {len} bytes of {})",
                self.position,
                self.bytes.len()
            ))
        })?;
        self.position = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> VidlensResult<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> VidlensResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> VidlensResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> VidlensResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> VidlensResult<u64> {
        let b = self.take(8)?;
        let mut buf = [0; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mp4Box {
    #[serde(rename = "type")]
    pub box_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<Mp4Box>,
}

/// Recursive listing of the boxes in `bytes`.
///
/// A truncated trailing box is listed with its declared size and no children.
pub fn box_tree(bytes: &[u8]) -> VidlensResult<Vec<Mp4Box>> {
    let mut boxes = Vec::new();
    let mut cursor = ByteCursor::new(bytes);

    while cursor.remaining() >= 8 {
        let start = cursor.position;
        let size = cursor.read_u32()? as u64;
        let box_type = cursor.take(4)?;
        let (size, header) = match size {
            // Extends to the end of the buffer
            0 => ((bytes.len() - start) as u64, 8),
            1 => (cursor.read_u64()?, 16),
            size => (size, 8),
        };
        if size < header as u64 {
            return Err(VidlensError::MalformedBox(format!(
                "box {} declares size {size}",
                String::from_utf8_lossy(box_type)
            )));
        }

        let end = start.saturating_add(size as usize).min(bytes.len());
        let payload = bytes.get(start + header..end).unwrap_or_default();
        let children = if CONTAINER_BOXES.iter().any(|c| c.as_slice() == box_type) {
            box_tree(payload)?
        } else {
            Vec::new()
        };

        boxes.push(Mp4Box {
            box_type: String::from_utf8_lossy(box_type).into_owned(),
            size,
            boxes: children,
        });
        cursor.position = end;
    }

    Ok(boxes)
}

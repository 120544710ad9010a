//! Segment Index (`sidx`) box, ISO/IEC 14496-12 8.16.3.

use crate::{
    error::{VidlensError, VidlensResult},
    mp4::ByteCursor,
    util::short_url,
    ByteRange, ResourceKey,
};

use super::DashSegment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidxReference {
    /// 1 when the reference points at another `sidx` box.
    pub reference_type: u8,
    pub referenced_size: u32,
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
    pub sap_type: u8,
    pub sap_delta_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidx {
    pub version: u8,
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    pub first_offset: u64,
    pub references: Vec<SidxReference>,
}

/// Parse a complete `sidx` box, header included.
pub fn parse_sidx(bytes: &[u8]) -> VidlensResult<Sidx> {
    let mut cursor = ByteCursor::new(bytes);
    let size = cursor.read_u32()? as usize;
    let box_type = cursor.take(4)?;
    if box_type != b"sidx" {
        return Err(VidlensError::MalformedBox(format!(
            "expected sidx box, found {}",
            String::from_utf8_lossy(box_type)
        )));
    }
    if size < 8 || size > bytes.len() {
        return Err(VidlensError::MalformedBox(format!(
            "sidx box declares size {size} but {} bytes are available",
            bytes.len()
        )));
    }

    let version = cursor.read_u8()?;
    cursor.skip(3)?; // flags
    let reference_id = cursor.read_u32()?;
    let timescale = cursor.read_u32()?;
    if timescale == 0 {
        return Err(VidlensError::MalformedBox("sidx timescale is 0".to_string()));
    }

    let (earliest_presentation_time, first_offset) = if version == 0 {
        (cursor.read_u32()? as u64, cursor.read_u32()? as u64)
    } else {
        (cursor.read_u64()?, cursor.read_u64()?)
    };
    cursor.skip(2)?; // reserved
    let reference_count = cursor.read_u16()?;

    let mut references = Vec::with_capacity(reference_count as usize);
    for _ in 0..reference_count {
        let size_word = cursor.read_u32()?;
        let subsegment_duration = cursor.read_u32()?;
        let sap_word = cursor.read_u32()?;
        references.push(SidxReference {
            reference_type: (size_word >> 31) as u8,
            referenced_size: size_word & 0x7fff_ffff,
            subsegment_duration,
            starts_with_sap: sap_word >> 31 == 1,
            sap_type: ((sap_word >> 28) & 0x7) as u8,
            sap_delta_time: sap_word & 0x0fff_ffff,
        });
    }

    Ok(Sidx {
        version,
        reference_id,
        timescale,
        earliest_presentation_time,
        first_offset,
        references,
    })
}

impl Sidx {
    /// Media segments described by this index.
    ///
    /// `index_range` is where the box itself was read from; the first
    /// referenced byte follows it after `first_offset` bytes. References to
    /// other index boxes are skipped, and so are empty references, whose
    /// duration still advances the presentation time.
    pub fn segments(
        &self,
        url: &str,
        index_range: ByteRange,
        period_start: f64,
        offset_seconds: f64,
    ) -> Vec<DashSegment> {
        let timescale = self.timescale as f64;
        let mut presentation_time = period_start + offset_seconds;
        let mut offset = index_range.end + 1 + self.first_offset;

        self.references
            .iter()
            .filter(|reference| reference.reference_type != 1)
            .filter_map(|reference| {
                let duration = reference.subsegment_duration as f64 / timescale;
                let start = presentation_time;
                let end = start + duration;
                presentation_time = end;

                if reference.referenced_size == 0 {
                    tracing::debug!("Skipping empty sidx reference of {url} at {start}s");
                    return None;
                }
                let byterange =
                    ByteRange::from_offset_length(offset, reference.referenced_size as u64);
                offset = byterange.end + 1;

                Some(DashSegment {
                    timeline: period_start,
                    url: url.to_string(),
                    short_url: short_url(url).unwrap_or_else(|| url.to_string()),
                    byterange: Some(byterange),
                    duration: Some(duration),
                    start,
                    end,
                    init_segment: None,
                    key: ResourceKey::new(url, Some(&byterange)),
                    manifest_attributes: None,
                })
            })
            .collect()
    }
}

use std::borrow::Cow;

use crate::{
    details::{ManifestAttributes, Resolution},
    util::short_url,
    ResourceKey, VidlensResult,
};

use super::{
    url::{manifest_base_url, merge_baseurls},
    DashSegment,
};

/// Values read through the structured `dash-mpd` model of an MPD.
#[derive(Debug, Clone, Default)]
pub struct DashModel {
    pub minimum_update_period: Option<f64>,
    /// One record per Representation. The URL is the manifest itself, since a
    /// DASH rendition is not a separately requestable document.
    pub rendition_attributes: Vec<ManifestAttributes>,
    /// Whole-resource segments of Representations addressed only by `BaseURL`.
    pub segments: Vec<DashSegment>,
}

impl DashModel {
    pub fn parse(text: &str, url: &str) -> VidlensResult<Self> {
        let mpd = dash_mpd::parse(text)?;

        let mut model = Self {
            minimum_update_period: mpd.minimumUpdatePeriod.map(|d| d.as_secs_f64()),
            ..Default::default()
        };

        let mut base_url = manifest_base_url(url)?;
        if let Some(mpd_base_url) = mpd.base_url.first() {
            base_url = merge_baseurls(&base_url, &mpd_base_url.base)?;
        }
        let media_duration = mpd.mediaPresentationDuration.map(|d| d.as_secs_f64());

        let mut last_period_end = 0.0;
        for period in mpd.periods.iter() {
            let base_url = match period.BaseURL.first() {
                Some(period_base_url) => Cow::Owned(merge_baseurls(&base_url, &period_base_url.base)?),
                None => Cow::Borrowed(&base_url),
            };
            let period_start = period
                .start
                .map(|d| d.as_secs_f64())
                .unwrap_or(last_period_end);
            let period_duration = period.duration.map(|d| d.as_secs_f64()).or(media_duration);

            for adaptation in period.adaptations.iter() {
                let base_url = match adaptation.BaseURL.first() {
                    Some(adaptation_base_url) => {
                        Cow::Owned(merge_baseurls(&base_url, &adaptation_base_url.base)?)
                    }
                    None => base_url.clone(),
                };
                let adaptation_addressed = adaptation.SegmentTemplate.is_some()
                    || adaptation.SegmentBase.is_some()
                    || adaptation.SegmentList.is_some();

                for representation in adaptation.representations.iter() {
                    let resolution = representation
                        .width
                        .zip(representation.height)
                        .or(adaptation.width.zip(adaptation.height))
                        .map(|(width, height)| Resolution { width, height });
                    let attributes = ManifestAttributes {
                        url: Some(url.to_string()),
                        bandwidth: representation.bandwidth,
                        resolution,
                    };
                    model.rendition_attributes.push(attributes.clone());

                    let addressed = adaptation_addressed
                        || representation.SegmentTemplate.is_some()
                        || representation.SegmentBase.is_some()
                        || representation.SegmentList.is_some();
                    let Some(representation_base_url) = representation.BaseURL.first() else {
                        continue;
                    };
                    if addressed {
                        continue;
                    }

                    let segment_url =
                        merge_baseurls(&base_url, &representation_base_url.base)?.to_string();
                    model.segments.push(DashSegment {
                        timeline: period_start,
                        short_url: short_url(&segment_url).unwrap_or_else(|| segment_url.clone()),
                        key: ResourceKey::new(&segment_url, None),
                        url: segment_url,
                        byterange: None,
                        duration: period_duration,
                        start: period_start,
                        end: period_start + period_duration.unwrap_or(0.0),
                        init_segment: None,
                        manifest_attributes: Some(ManifestAttributes {
                            url: None,
                            ..attributes
                        }),
                    });
                }
            }

            last_period_end = period_start + period_duration.unwrap_or(0.0);
        }

        Ok(model)
    }
}

use std::collections::HashMap;

use url::Url;

use crate::{
    details::{InitSegmentRef, ManifestAttributes, Resolution},
    fetch::Fetcher,
    manifest::ManifestLine,
    mime::is_webm_mime_type,
    VidlensError, VidlensResult,
};

use super::{
    duration::parse_xsd_duration,
    sidx::parse_sidx,
    template::Template,
    timeline::{expand_segment_timeline, TimelineReference},
    url::{manifest_base_url, merge_baseurls, parse_media_range, resolve_url},
    xml::{parse_xml, to_xml_string, XmlElement},
    DashManifestLines, DashSegment, SegmentDerivation, UnsupportedAddressing, UnsupportedNode,
};

/// Marks the element owning a derived segment list while the tree is written out.
pub const SEGMENTS_ID_ATTRIBUTE: &str = "vidlensSegmentsId";

/// Inherited state of one element: its base URL and the addressing
/// declarations of its ancestors and itself, most specific last.
#[derive(Clone)]
struct Scope<'a> {
    base_url: Url,
    segment_lists: Vec<&'a XmlElement>,
    segment_templates: Vec<&'a XmlElement>,
    segment_bases: Vec<&'a XmlElement>,
}

impl<'a> Scope<'a> {
    fn root(base_url: Url) -> Self {
        Self {
            base_url,
            segment_lists: Vec::new(),
            segment_templates: Vec::new(),
            segment_bases: Vec::new(),
        }
    }

    fn enter(&self, element: &'a XmlElement) -> VidlensResult<Self> {
        let mut scope = self.clone();

        // Alternative BaseURLs are ignored
        if let Some(base_url) = element.child("BaseURL") {
            let base = base_url.text();
            let base = base.trim();
            if !base.is_empty() {
                scope.base_url = merge_baseurls(&scope.base_url, base)?;
            }
        }
        if let Some(list) = element.child("SegmentList") {
            scope.segment_lists.push(list);
        }
        if let Some(template) = element.child("SegmentTemplate") {
            scope.segment_templates.push(template);
        }
        if let Some(base) = element.child("SegmentBase") {
            scope.segment_bases.push(base);
        }

        Ok(scope)
    }
}

/// Per-element values the addressing derivation needs.
struct NodeContext<'a> {
    representation_id: Option<&'a str>,
    period_start: f64,
    period_duration: Option<f64>,
    mime_type: Option<&'a str>,
    manifest_attributes: Option<ManifestAttributes>,
}

fn last_attribute<'a>(nodes: &[&'a XmlElement], attribute: &str) -> Option<&'a str> {
    nodes
        .iter()
        .rev()
        .find_map(|node| node.attribute(attribute).filter(|value| !value.is_empty()))
}

fn parse_attribute<T: std::str::FromStr>(nodes: &[&XmlElement], attribute: &str) -> Option<T> {
    last_attribute(nodes, attribute).and_then(|value| value.trim().parse().ok())
}

fn resolution_of(element: &XmlElement) -> Option<Resolution> {
    let width = element.attribute("width")?.parse().ok()?;
    let height = element.attribute("height")?.parse().ok()?;
    Some(Resolution { width, height })
}

fn segments_from_template(scope: &Scope, context: &NodeContext) -> SegmentDerivation {
    let templates = &scope.segment_templates;
    let Some(media) = last_attribute(templates, "media") else {
        tracing::debug!("SegmentTemplate without a media template");
        return SegmentDerivation::Missing;
    };

    let timescale = parse_attribute::<u64>(templates, "timescale")
        .filter(|t| *t > 0)
        .unwrap_or(1) as f64;
    let presentation_time_offset = parse_attribute::<u64>(templates, "presentationTimeOffset")
        .or_else(|| parse_attribute(&scope.segment_bases, "presentationTimeOffset"))
        .unwrap_or(0) as f64;
    let start_number = parse_attribute::<u64>(templates, "startNumber").unwrap_or(1);

    let mut template = Template::new();
    if let Some(representation_id) = context.representation_id {
        template.insert(Template::REPRESENTATION_ID, representation_id.to_string());
    }
    if let Some(bandwidth) = context
        .manifest_attributes
        .as_ref()
        .and_then(|attributes| attributes.bandwidth)
    {
        template.insert(Template::BANDWIDTH, bandwidth.to_string());
    }

    // Byte ranges on template initialization segments are not supported
    let init_segment = last_attribute(templates, "initialization").map(|initialization| {
        InitSegmentRef {
            url: resolve_url(&scope.base_url, &template.resolve(initialization)),
            byterange: None,
        }
    });

    // $Number$ and $Time$ are exclusive, a timeline always drives $Time$
    let references = match templates.iter().rev().find_map(|t| t.child("SegmentTimeline")) {
        Some(timeline) => expand_segment_timeline(timeline),
        None => {
            let Some(duration) = parse_attribute::<u64>(templates, "duration").filter(|d| *d > 0)
            else {
                tracing::debug!("SegmentTemplate has neither a duration nor a timeline");
                return SegmentDerivation::Missing;
            };
            let Some(period_duration) = context.period_duration else {
                tracing::warn!("Unable to count template segments without a period duration");
                return SegmentDerivation::Missing;
            };

            let count = (period_duration / (duration as f64 / timescale)).ceil() as u64;
            (0..count)
                .map(|i| TimelineReference {
                    time: i * duration,
                    duration,
                })
                .collect()
        }
    };

    let segments = references
        .into_iter()
        .enumerate()
        .map(|(index, reference)| {
            template.insert(Template::NUMBER, (start_number + index as u64).to_string());
            template.insert(Template::TIME, reference.time.to_string());

            let short_url = template.resolve(media);
            let url = resolve_url(&scope.base_url, &short_url);
            let start = reference.time as f64 / timescale - presentation_time_offset / timescale
                + context.period_start;
            let duration = reference.duration as f64 / timescale;

            DashSegment {
                timeline: context.period_start,
                key: crate::make_key(&url, None),
                url,
                short_url,
                byterange: None,
                duration: Some(duration),
                start,
                end: start + duration,
                init_segment: init_segment.clone(),
                manifest_attributes: context.manifest_attributes.clone(),
            }
        })
        .collect();

    SegmentDerivation::Segments(segments)
}

async fn segments_from_base<F>(
    fetcher: &F,
    scope: &Scope<'_>,
    context: &NodeContext<'_>,
) -> SegmentDerivation
where
    F: Fetcher,
{
    let Some(segment_base) = scope.segment_bases.last() else {
        return SegmentDerivation::Missing;
    };

    if context.mime_type.is_some_and(is_webm_mime_type) {
        return SegmentDerivation::Unsupported(UnsupportedAddressing::WebM);
    }

    let Some(index_range) = segment_base.attribute("indexRange") else {
        tracing::debug!("SegmentBase without an indexRange");
        return SegmentDerivation::Missing;
    };
    let index_range = match parse_media_range(index_range) {
        Ok(range) => range,
        Err(e) => {
            tracing::warn!("{e}");
            return SegmentDerivation::Missing;
        }
    };

    let timescale = segment_base
        .attribute("timescale")
        .and_then(|t| t.parse::<u64>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(1) as f64;
    let offset_seconds = segment_base
        .attribute("presentationTimeOffset")
        .and_then(|t| t.parse::<u64>().ok())
        .map(|offset| offset as f64 / timescale)
        .unwrap_or(0.0);

    let url = scope.base_url.to_string();
    let init_segment = segment_base.child("Initialization").map(|initialization| {
        InitSegmentRef {
            url: initialization
                .attribute("sourceURL")
                .map(|source| resolve_url(&scope.base_url, source))
                .unwrap_or_else(|| url.clone()),
            byterange: initialization
                .attribute("range")
                .and_then(|range| parse_media_range(range).ok()),
        }
    });

    let segments = match fetcher.fetch(&url, Some(&index_range)).await {
        Ok(response) => parse_sidx(&response.bytes)
            .map(|sidx| sidx.segments(&url, index_range, context.period_start, offset_seconds)),
        Err(e) => Err(e),
    };

    match segments {
        Ok(segments) => SegmentDerivation::Segments(
            segments
                .into_iter()
                .map(|segment| DashSegment {
                    init_segment: init_segment.clone(),
                    manifest_attributes: context.manifest_attributes.clone(),
                    ..segment
                })
                .collect(),
        ),
        Err(e) => {
            tracing::error!("Unable to get segments from SIDX for {url}: {e}");
            SegmentDerivation::Missing
        }
    }
}

async fn get_segments<F>(fetcher: &F, scope: &Scope<'_>, context: &NodeContext<'_>) -> SegmentDerivation
where
    F: Fetcher,
{
    let derivation = if !scope.segment_lists.is_empty() {
        SegmentDerivation::Unsupported(UnsupportedAddressing::SegmentList)
    } else if !scope.segment_templates.is_empty() {
        segments_from_template(scope, context)
    } else if !scope.segment_bases.is_empty() {
        segments_from_base(fetcher, scope, context).await
    } else {
        SegmentDerivation::Missing
    };

    match derivation {
        SegmentDerivation::Segments(segments) if segments.is_empty() => SegmentDerivation::Missing,
        derivation => derivation,
    }
}

/// Collects what the walk derived, keyed by element id.
#[derive(Default)]
struct Derived {
    segments: HashMap<String, Vec<DashSegment>>,
    /// Child index path from the MPD element to each element owning segments.
    owners: Vec<(Vec<usize>, String)>,
    unsupported: Vec<UnsupportedNode>,
}

impl Derived {
    /// Whether the element got segments.
    fn record(&mut self, path: Vec<usize>, node_id: String, derivation: SegmentDerivation) -> bool {
        match derivation {
            SegmentDerivation::Segments(segments) => {
                self.segments.insert(node_id.clone(), segments);
                self.owners.push((path, node_id));
                true
            }
            SegmentDerivation::Unsupported(addressing) => {
                tracing::debug!(node_id = %node_id, ?addressing, "Unsupported segment addressing");
                self.unsupported.push(UnsupportedNode {
                    node_id,
                    addressing,
                });
                false
            }
            SegmentDerivation::Missing => false,
        }
    }
}

async fn derive_segments<F>(fetcher: &F, mpd: &XmlElement, manifest_url: &str) -> VidlensResult<Derived>
where
    F: Fetcher,
{
    let mut derived = Derived::default();

    let root_scope = Scope::root(manifest_base_url(manifest_url)?).enter(mpd)?;
    let media_duration = mpd
        .attribute("mediaPresentationDuration")
        .and_then(parse_xsd_duration);
    let mut last_period_end = 0.0;

    for (period_index, (period_position, period)) in mpd.children_named("Period").enumerate() {
        let period_id = format!("Period-{period_index}");
        let period_scope = root_scope.enter(period)?;
        let period_start = period
            .attribute("start")
            .and_then(parse_xsd_duration)
            .unwrap_or(last_period_end);
        let period_duration = period
            .attribute("duration")
            .and_then(parse_xsd_duration)
            .or(media_duration);
        let mut period_has_segments = false;

        for (adaptation_set_index, (adaptation_set_position, adaptation_set)) in
            period.children_named("AdaptationSet").enumerate()
        {
            let adaptation_set_id = format!("AdaptationSet-{adaptation_set_index}-{period_id}");
            let adaptation_set_scope = period_scope.enter(adaptation_set)?;
            let adaptation_set_attributes = ManifestAttributes {
                resolution: resolution_of(adaptation_set),
                ..Default::default()
            };
            let mut adaptation_set_has_segments = false;

            for (representation_index, (representation_position, representation)) in
                adaptation_set.children_named("Representation").enumerate()
            {
                let node_id = format!("Representation-{representation_index}-{adaptation_set_id}");
                let scope = adaptation_set_scope.enter(representation)?;
                let manifest_attributes = ManifestAttributes {
                    resolution: resolution_of(representation)
                        .or(adaptation_set_attributes.resolution),
                    bandwidth: representation
                        .attribute("bandwidth")
                        .and_then(|b| b.parse().ok()),
                    url: None,
                };
                let context = NodeContext {
                    representation_id: representation.attribute("id"),
                    period_start,
                    period_duration,
                    mime_type: representation
                        .attribute("mimeType")
                        .or_else(|| adaptation_set.attribute("mimeType")),
                    manifest_attributes: Some(manifest_attributes),
                };

                let derivation = get_segments(fetcher, &scope, &context).await;
                let path = vec![period_position, adaptation_set_position, representation_position];
                adaptation_set_has_segments |= derived.record(path, node_id, derivation);
            }

            if !adaptation_set_has_segments {
                let context = NodeContext {
                    representation_id: None,
                    period_start,
                    period_duration,
                    mime_type: adaptation_set.attribute("mimeType"),
                    manifest_attributes: (adaptation_set_attributes != ManifestAttributes::default())
                        .then_some(adaptation_set_attributes),
                };
                let derivation = get_segments(fetcher, &adaptation_set_scope, &context).await;
                let path = vec![period_position, adaptation_set_position];
                adaptation_set_has_segments = derived.record(path, adaptation_set_id, derivation);
            }
            period_has_segments |= adaptation_set_has_segments;
        }

        if !period_has_segments {
            let context = NodeContext {
                representation_id: None,
                period_start,
                period_duration,
                mime_type: None,
                manifest_attributes: None,
            };
            let derivation = get_segments(fetcher, &period_scope, &context).await;
            derived.record(vec![period_position], period_id, derivation);
        }

        last_period_end = period_start + period_duration.unwrap_or(0.0);
    }

    Ok(derived)
}

/// Remove ` attribute="value"` from a serialized line, returning the value.
fn cut_attribute_from_line(line: &str, attribute: &str) -> Option<(String, String)> {
    let search = format!(" {attribute}=\"");
    let property_start = line.find(&search)?;
    let value_start = property_start + search.len();
    let value_len = line[value_start..].find('"')?;
    let value = line[value_start..value_start + value_len].to_string();
    let cut_line = format!("{}{}", &line[..property_start], &line[value_start + value_len + 1..]);
    Some((value, cut_line))
}

/// Walk an MPD, derive the segments of every element that declares
/// addressing, and return the re-serialized document as lines with the
/// segments attached to their owning element's line.
pub async fn get_dash_manifest_lines<F>(
    fetcher: &F,
    manifest: &str,
    url: &str,
) -> VidlensResult<DashManifestLines>
where
    F: Fetcher,
{
    let mut mpd = parse_xml(manifest)?;
    if mpd.local_name() != "MPD" {
        return Err(VidlensError::MpdParsing(format!(
            "root element is {}, not MPD",
            mpd.name
        )));
    }

    let Derived {
        mut segments,
        owners,
        unsupported,
    } = derive_segments(fetcher, &mpd, url).await?;

    for (path, node_id) in owners {
        if let Some(element) = mpd.descendant_mut(&path) {
            element.set_attribute(SEGMENTS_ID_ATTRIBUTE, node_id);
        }
    }

    let xml = to_xml_string(&mpd)?;
    let lines = xml
        .lines()
        .map(|line| match cut_attribute_from_line(line, SEGMENTS_ID_ATTRIBUTE) {
            Some((node_id, cut_line)) => ManifestLine {
                raw: cut_line,
                segments: segments.remove(&node_id).unwrap_or_default(),
                ..Default::default()
            },
            None => ManifestLine::raw(line),
        })
        .collect();

    Ok(DashManifestLines { lines, unsupported })
}

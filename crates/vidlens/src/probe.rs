//! Timing derived from the streams and frames a media prober reports.
//!
//! Probing itself is done by a collaborator implementing [`Prober`]; this
//! module only folds its typed result into per-segment times and continuous
//! per-stream time ranges.

use std::{future::Future, path::Path};

use serde::{Deserialize, Serialize};

/// Samples per frame assumed for audio when the prober does not report it.
const AUDIO_SAMPLES_PER_FRAME: f64 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    #[serde(other)]
    Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStream {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub codec_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    /// Seconds per tick of the stream's time base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_base: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFrame {
    pub media_type: MediaType,
    pub stream_index: u32,
    pub pts_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dts_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_samples: Option<u64>,
    /// Subtitle display duration in time base ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_display_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub streams: Vec<ProbeStream>,
    /// Frames sorted by presentation time.
    pub frames: Vec<ProbeFrame>,
}

/// Media introspection of a persisted segment.
pub trait Prober: Send + Sync + 'static {
    /// `None` means the file could not be probed, and the segment stays unresolved.
    fn probe(&self, path: &Path) -> impl Future<Output = Option<ProbeResult>> + Send;
}

/// Reports no streams, so segments are emitted without timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl Prober for NoProbe {
    async fn probe(&self, _path: &Path) -> Option<ProbeResult> {
        Some(ProbeResult::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentTimes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_frame_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_frame_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles_end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
    pub is_gap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTimeRanges {
    pub stream_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    pub time_ranges: Vec<TimeRange>,
}

fn first_stream(streams: &[ProbeStream], media_type: MediaType) -> Option<&ProbeStream> {
    streams.iter().find(|s| s.codec_type == media_type)
}

fn first_and_last(frames: &[ProbeFrame], media_type: MediaType) -> Option<(&ProbeFrame, &ProbeFrame)> {
    let mut frames = frames.iter().filter(|f| f.media_type == media_type);
    let first = frames.next()?;
    Some((first, frames.last().unwrap_or(first)))
}

/// Start, end and duration per media type, and combined over audio and video.
///
/// Returns `None` when there are no frames.
pub fn segment_times(result: &ProbeResult) -> Option<SegmentTimes> {
    if result.frames.is_empty() {
        return None;
    }

    let mut times = SegmentTimes::default();

    let video = first_stream(&result.streams, MediaType::Video)
        .zip(first_and_last(&result.frames, MediaType::Video));
    if let Some((stream, (first, last))) = video {
        let frame_seconds = stream.framerate.filter(|r| *r > 0.0).map(|r| 1.0 / r).unwrap_or(0.0);
        let end = last.pts_time + frame_seconds;
        times.video_start = Some(first.pts_time);
        times.video_end = Some(end);
        times.video_duration = Some(end - first.pts_time);
        times.video_frame_seconds = Some(frame_seconds);
    }

    let audio = first_stream(&result.streams, MediaType::Audio)
        .zip(first_and_last(&result.frames, MediaType::Audio));
    if let Some((stream, (first, last))) = audio {
        let frame_seconds = stream
            .sample_rate
            .filter(|r| *r > 0.0)
            .map(|r| AUDIO_SAMPLES_PER_FRAME / r)
            .unwrap_or(0.0);
        let end = last.pts_time + frame_seconds;
        times.audio_start = Some(first.pts_time);
        times.audio_end = Some(end);
        times.audio_duration = Some(end - first.pts_time);
        times.audio_frame_seconds = Some(frame_seconds);
    }

    let subtitles = first_stream(&result.streams, MediaType::Subtitle)
        .zip(first_and_last(&result.frames, MediaType::Subtitle));
    if let Some((stream, (first, last))) = subtitles {
        let display = stream.time_base.unwrap_or(0.0) * last.end_display_time.unwrap_or(0.0);
        let end = last.pts_time + display;
        times.subtitles_start = Some(first.pts_time);
        times.subtitles_end = Some(end);
        times.subtitles_duration = Some(end - first.pts_time);
    }

    let (start, end) = match (video.is_some(), audio.is_some()) {
        (true, true) => (
            times.audio_start.zip(times.video_start).map(|(a, v)| a.min(v)),
            times.audio_end.zip(times.video_end).map(|(a, v)| a.max(v)),
        ),
        (true, false) => (times.video_start, times.video_end),
        (false, true) => (times.audio_start, times.audio_end),
        (false, false) => (times.subtitles_start, times.subtitles_end),
    };
    times.start = start;
    times.end = end;
    times.duration = start.zip(end).map(|(start, end)| end - start);

    Some(times)
}

/// Continuous presented ranges of every stream.
///
/// A frame starting at least half a frame after the previous range ended
/// opens a new range, with a gap range in between.
pub fn stream_time_ranges(result: &ProbeResult) -> Vec<StreamTimeRanges> {
    result
        .streams
        .iter()
        .map(|stream| {
            let mut time_ranges: Vec<TimeRange> = Vec::new();

            for frame in result.frames.iter().filter(|f| f.stream_index == stream.index) {
                let duration = match stream.codec_type {
                    MediaType::Audio => {
                        let samples = frame
                            .num_samples
                            .map(|n| n as f64)
                            .unwrap_or(AUDIO_SAMPLES_PER_FRAME);
                        stream.sample_rate.filter(|r| *r > 0.0).map(|r| samples / r)
                    }
                    _ => stream.framerate.filter(|r| *r > 0.0).map(|r| 1.0 / r),
                }
                .unwrap_or(0.0);
                let start = frame.pts_time;
                let end = start + duration;

                match time_ranges.last_mut() {
                    None => time_ranges.push(TimeRange {
                        start,
                        end,
                        is_gap: false,
                    }),
                    Some(last) if start - last.end < duration / 2.0 => last.end = end,
                    Some(last) => {
                        let gap_start = last.end;
                        time_ranges.push(TimeRange {
                            start: gap_start,
                            end: start,
                            is_gap: true,
                        });
                        time_ranges.push(TimeRange {
                            start,
                            end,
                            is_gap: false,
                        });
                    }
                }
            }

            StreamTimeRanges {
                stream_index: stream.index,
                stream_id: stream.id.clone(),
                time_ranges,
            }
        })
        .collect()
}

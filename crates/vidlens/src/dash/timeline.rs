use super::xml::XmlElement;

/// One `S` repetition in timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineReference {
    pub time: u64,
    pub duration: u64,
}

/// Expand the `S` nodes of a `SegmentTimeline`.
///
/// A node without `t` starts where the previous reference ended. Negative
/// repeat counts are treated as no repeat.
pub fn expand_segment_timeline(timeline: &XmlElement) -> Vec<TimelineReference> {
    let mut references: Vec<TimelineReference> = Vec::new();

    for (_, s) in timeline.children_named("S") {
        let t = s.attribute("t").and_then(|t| t.parse::<u64>().ok());
        let Some(d) = s.attribute("d").and_then(|d| d.parse::<u64>().ok()) else {
            tracing::warn!("Ignored S node without a duration");
            continue;
        };
        let r = s
            .attribute("r")
            .and_then(|r| r.parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);

        for i in 0..=r {
            let time = match (t, references.last()) {
                (Some(t), _) if i == 0 => t,
                (_, Some(last)) => last.time + last.duration,
                _ => 0,
            };
            references.push(TimelineReference { time, duration: d });
        }
    }

    references
}

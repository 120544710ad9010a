/// Seconds of an `xs:duration` value such as `PT1M30.5S`.
pub fn parse_xsd_duration(value: &str) -> Option<f64> {
    let duration = iso8601_duration::Duration::parse(value.trim()).ok()?;
    duration.to_std().map(|d| d.as_secs_f64())
}

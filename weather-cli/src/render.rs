use weathercache_core::{Units, WeatherRecord};

const ICON_URL_BASE: &str = "https://openweathermap.org/img/wn";

pub fn icon_url(icon: &str) -> String {
    format!("{ICON_URL_BASE}/{icon}@4x.png")
}

fn unit_suffix(units: Units) -> &'static str {
    match units {
        Units::Metric => "\u{00B0}C",
        Units::Imperial => "\u{00B0}F",
        Units::Standard => " K",
    }
}

/// Human-readable summary of a record.
pub fn summary(record: &WeatherRecord, units: Units) -> String {
    let mut out = format!(
        "{}\n  {}{}",
        record.city_name,
        record.temperature.round() as i64,
        unit_suffix(units)
    );

    if let Some(condition) = record.primary_condition() {
        out.push_str(&format!("  {} ({})", condition.label, condition.description));
        out.push_str(&format!("\n  icon: {}", icon_url(&condition.icon)));
    }

    out
}

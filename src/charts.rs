use plotly::common::{Mode, Title};
use plotly::layout::{Axis, Layout};
use plotly::{Plot, Scatter};
use chrono::{FixedOffset, TimeZone, Utc};
use crate::series::SeriesSet;

///"UTC" or a fixed offset like "+02:00"; anything unparseable falls back to UTC
fn zone_offset(timezone: &str) -> FixedOffset {
    let utc = FixedOffset::east_opt(0).unwrap();
    if timezone.eq_ignore_ascii_case("utc") || timezone == "Z" {
        return utc;
    }
    timezone.parse::<FixedOffset>().unwrap_or(utc)
}

fn axis_label(timestamp_ms: i64, offset: FixedOffset) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

///Renders every series of the set as one line on a shared time axis and writes
///a standalone HTML file. The title carries the per-series averages so the
///chart reads without opening the dataset.
pub fn save_series_chart(
    set: &SeriesSet,
    title: &str,
    y_label: &str,
    path: &str,
    timezone: &str,
) {
    let offset = zone_offset(timezone);
    let mut plot = Plot::new();
    for (key, series) in set.iter() {
        let x_vals: Vec<String> = series.points.keys().map(|t| axis_label(*t, offset)).collect();
        let y_vals: Vec<f64> = series.points.values().cloned().collect();
        let trace = Scatter::new(x_vals, y_vals)
                                .mode(Mode::Lines)
                                .name(key);
        plot.add_trace(trace);
    }

    let averages = set
        .iter()
        .map(|(key, series)| format!("{}: {:.2}", key, series.mean()))
        .collect::<Vec<String>>()
        .join(", ");
    let full_title = format!(
        "{} (Time: {})<br><sub>Average Values: {}</sub>",
        title, timezone, averages
    );

    let layout = Layout::new()
        .title(Title::new(&full_title))
        .x_axis(Axis::new().title(Title::new("Time")))
        .y_axis(Axis::new().title(Title::new(y_label)));
    plot.set_layout(layout);
    plot.write_html(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeSeries;

    #[test]
    fn axis_labels_are_minute_resolution() {
        let utc = zone_offset("UTC");
        assert_eq!(axis_label(0, utc), "1970-01-01 00:00");
        assert_eq!(axis_label(1_735_689_600_000, utc), "2025-01-01 00:00");
    }

    #[test]
    fn configured_offset_shifts_the_labels() {
        assert_eq!(axis_label(0, zone_offset("+02:00")), "1970-01-01 02:00");
        assert_eq!(axis_label(0, zone_offset("-05:00")), "1969-12-31 19:00");
        // unknown zone names degrade to UTC instead of breaking the chart
        assert_eq!(axis_label(0, zone_offset("Mars/Olympus")), "1970-01-01 00:00");
    }

    #[test]
    fn chart_file_is_written() {
        let mut set = SeriesSet::new();
        let mut s = TimeSeries::default();
        s.upsert(0, 41.5);
        s.upsert(60_000, 43.5);
        set.series.insert("CPU Utilization".to_string(), s);

        let path = std::env::temp_dir().join(format!("chart_test_{}.html", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        save_series_chart(&set, "RDS CPU", "Percent", &path_str, "UTC");
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("CPU Utilization"));
        let _ = std::fs::remove_file(&path);
    }
}

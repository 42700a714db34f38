// Unit-aware value formatting used by Y axis labels and tooltips
use super::time_series::{CUSTOM_UNIT_PREFIX, DAY, HOUR, MINUTE, MONTH, StandardUnit};
use serde_json::Value;

const METRIC_SUFFIXES: [&str; 8] = ["K", "M", "G", "T", "P", "E", "Z", "Y"];
const IEC_BYTE_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
const SI_BYTE_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
const IEC_BIT_UNITS: [&str; 7] = ["b", "Kib", "Mib", "Gib", "Tib", "Pib", "Eib"];
const SI_BIT_UNITS: [&str; 7] = ["b", "kb", "Mb", "Gb", "Tb", "Pb", "Eb"];

// Durations count a year as twelve 30-day months.
const DURATION_UNITS: [(i64, &str, &str); 6] = [
    (12 * MONTH, "year", "years"),
    (MONTH, "mo", "mo"),
    (DAY, "day", "days"),
    (HOUR, "hr", "hr"),
    (MINUTE, "min", "min"),
    (1, "s", "s"),
];

/// Formats `value` according to `unit_name`. Unknown units render the bare
/// number. Returns `None` for non-finite values.
pub fn format_value_with_unit(
    value: f64,
    unit_name: Option<&str>,
    unit_options: Option<&Value>,
) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let Some(unit_name) = unit_name else {
        return Some(format_number(value));
    };
    let Some(unit) = StandardUnit::from_name(unit_name) else {
        return Some(format_number(value));
    };

    let formatted = match unit {
        StandardUnit::None => format_number(value),
        StandardUnit::Milliseconds => format_duration(value / 1000.0),
        StandardUnit::Seconds => format_duration(value),
        StandardUnit::Bits | StandardUnit::Bytes | StandardUnit::BitsPerSec | StandardUnit::BytesPerSec => {
            let si = option_str(unit_options, "format") == Some("si");
            let units = match (unit, si) {
                (StandardUnit::Bits | StandardUnit::BitsPerSec, true) => &SI_BIT_UNITS,
                (StandardUnit::Bits | StandardUnit::BitsPerSec, false) => &IEC_BIT_UNITS,
                (_, true) => &SI_BYTE_UNITS,
                (_, false) => &IEC_BYTE_UNITS,
            };
            let formatted = format_data_size(value, if si { 1000.0 } else { 1024.0 }, units);
            match unit {
                StandardUnit::BitsPerSec | StandardUnit::BytesPerSec => format!("{}/s", formatted),
                _ => formatted,
            }
        }
        StandardUnit::Hertz => {
            let (number, suffix) = metric_suffix(value);
            let prefix = if suffix == "K" { "k" } else { suffix };
            format!("{} {}Hz", format_number(round_to_tenth(number)), prefix)
        }
        StandardUnit::Percent => format!("{}%", format_number(value)),
        StandardUnit::PercentNormalized => format!("{}%", format_number(value * 100.0)),
        StandardUnit::Boolean => {
            if value == 0.0 {
                "False".to_string()
            } else {
                "True".to_string()
            }
        }
        StandardUnit::Custom => {
            let number = if option_bool(unit_options, "useMetricSuffix") {
                format_with_metric_suffix(value)
            } else {
                format_number(value)
            };
            let custom_name = option_str(unit_options, "customName")
                .or_else(|| unit_name.strip_prefix(CUSTOM_UNIT_PREFIX))
                .filter(|name| !name.is_empty());
            match custom_name {
                Some(name) => format!("{} {}", number, name),
                None => number,
            }
        }
        // Remaining units are per-second counters
        other => match other.suffix() {
            Some(suffix) => format!("{} {}", format_with_metric_suffix(value), suffix),
            None => format_number(value),
        },
    };
    Some(formatted)
}

fn option_str<'a>(options: Option<&'a Value>, key: &str) -> Option<&'a str> {
    options?.get(key)?.as_str()
}

fn option_bool(options: Option<&Value>, key: &str) -> bool {
    options
        .and_then(|options| options.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Shortest decimal representation, without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn metric_suffix(value: f64) -> (f64, &'static str) {
    let mut multiplier = 1.0;
    let mut suffix = "";
    for candidate in METRIC_SUFFIXES {
        let next = multiplier * 1000.0;
        if value.abs() < next {
            break;
        }
        multiplier = next;
        suffix = candidate;
    }
    (value / multiplier, suffix)
}

fn format_with_metric_suffix(value: f64) -> String {
    let (number, suffix) = metric_suffix(value);
    format!("{}{}", format_number(round_to_tenth(number)), suffix)
}

fn format_data_size(value: f64, base: f64, units: &[&str; 7]) -> String {
    let mut number = value;
    let mut unit_index = 0;
    while number.abs() >= base && unit_index < units.len() - 1 {
        number /= base;
        unit_index += 1;
    }
    format!("{} {}", format_number(round_to_tenth(number)), units[unit_index])
}

fn format_duration(seconds: f64) -> String {
    if seconds.abs() < 1.0 {
        return format!("{} ms", format_number((seconds * 1000.0).floor()));
    }
    if seconds.abs() < 60.0 {
        return format!("{} sec", format_number((seconds * 10.0).floor() / 10.0));
    }

    let mut remaining = seconds.abs().floor() as i64;
    let mut parts = Vec::new();
    for (unit_seconds, singular, plural) in DURATION_UNITS {
        let count = remaining / unit_seconds;
        if count > 0 {
            parts.push(format!("{} {}", count, if count == 1 { singular } else { plural }));
            remaining -= count * unit_seconds;
        }
    }

    let duration = parts.join(" ");
    if seconds < 0.0 {
        format!("-{}", duration)
    } else {
        duration
    }
}

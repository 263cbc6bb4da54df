//! Format handlers.
//!
//! Unknown formats always pass, per every draft. Known formats are validated
//! only when the validator runs with `assert_formats`; otherwise they are
//! recorded as annotations.

use chrono::{DateTime, NaiveDate, NaiveTime};
use url::Url;

use crate::pattern::PatternCache;

/// Check `value` against `format`. `None` means the format is unknown (and
/// therefore passes as an annotation either way).
pub fn check(format: &str, value: &str, patterns: &PatternCache) -> Option<bool> {
    let ok = match format {
        "email" => is_email(value, false),
        "idn-email" => is_email(value, true),
        "uri" | "url" => Url::parse(value).is_ok(),
        "uri-reference" | "iri-reference" => is_uri_reference(value),
        "iri" => Url::parse(value).is_ok() || (!value.is_empty() && !value.contains(char::is_whitespace) && value.contains(':')),
        "uri-template" => is_uri_template(value),
        "date" => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        "time" => is_time(value),
        "date-time" => DateTime::parse_from_rfc3339(value).is_ok(),
        "duration" => is_duration(value),
        "hostname" => is_hostname(value, false),
        "idn-hostname" => is_hostname(value, true),
        "ipv4" => value.parse::<std::net::Ipv4Addr>().is_ok(),
        "ipv6" => value.parse::<std::net::Ipv6Addr>().is_ok(),
        "uuid" => value.len() == 36 && uuid::Uuid::try_parse(value).is_ok(),
        "regex" => patterns.compile(value).is_ok(),
        "json-pointer" => is_json_pointer(value),
        "relative-json-pointer" => is_relative_json_pointer(value),
        _ => return None,
    };
    Some(ok)
}

fn is_email(value: &str, allow_unicode: bool) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if !allow_unicode && !value.is_ascii() {
        return false;
    }
    !local.contains(char::is_whitespace) && is_hostname(domain, allow_unicode)
}

fn is_hostname(value: &str, allow_unicode: bool) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    let value = value.strip_suffix('.').unwrap_or(value);
    value.split('.').all(|label| {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        label.chars().all(|c| {
            c.is_ascii_alphanumeric() || c == '-' || (allow_unicode && !c.is_ascii())
        })
    })
}

fn is_uri_reference(value: &str) -> bool {
    // A relative reference is valid as long as it resolves against some base
    // and contains no raw whitespace or fragment-breaking characters.
    if value.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(value).is_ok() || Url::parse("http://example.com/").unwrap().join(value).is_ok()
}

fn is_uri_template(value: &str) -> bool {
    // Balanced, non-nested {...} groups with non-empty bodies.
    let mut depth = 0usize;
    let mut body_len = 0usize;
    for c in value.chars() {
        match c {
            '{' => {
                if depth > 0 {
                    return false;
                }
                depth = 1;
                body_len = 0;
            }
            '}' => {
                if depth == 0 || body_len == 0 {
                    return false;
                }
                depth = 0;
            }
            _ if depth > 0 => body_len += 1,
            _ => {}
        }
    }
    depth == 0
}

fn is_time(value: &str) -> bool {
    // HH:MM:SS[.fff] followed by Z or ±HH:MM
    let (clock, offset) = if let Some(stripped) = value.strip_suffix('Z') {
        (stripped, None)
    } else if let Some(position) = value.rfind(['+', '-']) {
        if position < 8 {
            return false; // the sign belongs to the clock part
        }
        (&value[..position], Some(&value[position..]))
    } else {
        return false; // offset is mandatory for the `time` format
    };

    if NaiveTime::parse_from_str(clock, "%H:%M:%S%.f").is_err()
        && NaiveTime::parse_from_str(clock, "%H:%M:%S").is_err()
    {
        return false;
    }

    match offset {
        None => true,
        Some(offset) => {
            let rest = &offset[1..];
            let Some((hours, minutes)) = rest.split_once(':') else {
                return false;
            };
            matches!(hours.parse::<u32>(), Ok(h) if h <= 23)
                && matches!(minutes.parse::<u32>(), Ok(m) if m <= 59)
                && hours.len() == 2
                && minutes.len() == 2
        }
    }
}

/// ISO 8601 duration: `P` then date components, optionally `T` then time
/// components; at least one component overall; weeks stand alone.
fn is_duration(value: &str) -> bool {
    let Some(rest) = value.strip_prefix('P') else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if let Some(time) = time_part {
        if time.is_empty() {
            return false;
        }
    }

    let date_ok = consume_components(date_part, &['Y', 'M', 'W', 'D'], false);
    let time_ok = match time_part {
        None => Some(0),
        Some(time) => consume_components(time, &['H', 'M', 'S'], true),
    };

    match (date_ok, time_ok) {
        (Some(d), Some(t)) => d + t > 0,
        _ => false,
    }
}

/// Parse `<number><designator>` runs in designator order; returns how many
/// components were consumed, or `None` on malformed input.
fn consume_components(mut input: &str, order: &[char], allow_fraction: bool) -> Option<usize> {
    let mut count = 0;
    let mut next_designator = 0;
    while !input.is_empty() {
        let digits_end = input
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(input.len());
        if digits_end == 0 {
            return None;
        }
        let number = &input[..digits_end];
        if number.is_empty() || number.starts_with('.') || number.ends_with('.') {
            return None;
        }
        if number.contains('.') && !allow_fraction {
            return None;
        }
        let designator = input[digits_end..].chars().next()?;
        let position = order[next_designator..]
            .iter()
            .position(|d| *d == designator)?;
        next_designator += position + 1;
        count += 1;
        input = &input[digits_end + 1..];
    }
    Some(count)
}

fn is_json_pointer(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    if !value.starts_with('/') {
        return false;
    }
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.peek(), Some('0' | '1')) {
            return false;
        }
    }
    true
}

fn is_relative_json_pointer(value: &str) -> bool {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return false;
    }
    let prefix = &value[..digits_end];
    if prefix.len() > 1 && prefix.starts_with('0') {
        return false;
    }
    let rest = &value[digits_end..];
    rest.is_empty() || rest == "#" || is_json_pointer(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_format(format: &str, valid: &[&str], invalid: &[&str]) {
        let patterns = PatternCache::new();
        for value in valid {
            assert_eq!(
                check(format, value, &patterns),
                Some(true),
                "{format}: expected '{value}' to pass"
            );
        }
        for value in invalid {
            assert_eq!(
                check(format, value, &patterns),
                Some(false),
                "{format}: expected '{value}' to fail"
            );
        }
    }

    #[test]
    fn unknown_formats_are_unhandled() {
        let patterns = PatternCache::new();
        assert_eq!(check("zip-code", "90210", &patterns), None);
    }

    #[test]
    fn email() {
        assert_format(
            "email",
            &["a@example.com", "first.last@sub.domain.org"],
            &["not-an-email", "@missing.local", "trailing@", "sp ace@x.com"],
        );
    }

    #[test]
    fn dates_and_times() {
        assert_format("date", &["2026-07-31", "2024-02-29"], &["2023-02-29", "26-01-01", "2026/01/01"]);
        assert_format(
            "date-time",
            &["2026-07-31T10:30:00Z", "2026-07-31T10:30:00.123+02:00"],
            &["2026-07-31 10:30:00", "2026-07-31T25:00:00Z"],
        );
        assert_format(
            "time",
            &["10:30:00Z", "23:59:60Z", "10:30:00.5+02:00"],
            &["10:30", "10:30:00", "24:00:00Z"],
        );
    }

    #[test]
    fn durations() {
        assert_format(
            "duration",
            &["P1Y2M3DT4H5M6S", "PT0.5S", "P3W", "P1D", "PT1H"],
            &["P", "PT", "1Y", "P1S", "P1YT", "PY"],
        );
    }

    #[test]
    fn hostnames_and_addresses() {
        assert_format(
            "hostname",
            &["example.com", "a-b.c-d.e", "localhost"],
            &["-leading.com", "trailing-.com", "", "ex ample.com"],
        );
        assert_format("ipv4", &["127.0.0.1", "255.255.255.255"], &["256.0.0.1", "1.2.3", "01.2.3.4"]);
        assert_format("ipv6", &["::1", "2001:db8::8a2e:370:7334"], &["::g", "1:2:3:4:5:6:7:8:9"]);
    }

    #[test]
    fn identifiers() {
        assert_format(
            "uuid",
            &["c72f4bae-9a4e-4d1e-8c3b-6f2f6a1f0c3d"],
            &["c72f4bae9a4e4d1e8c3b6f2f6a1f0c3d", "not-a-uuid"],
        );
        assert_format("json-pointer", &["", "/a/b", "/a~0b/~1c"], &["a/b", "/~2"]);
        assert_format("relative-json-pointer", &["0", "1/foo", "2#"], &["", "01", "-1", "#"]);
    }

    #[test]
    fn uris_and_templates() {
        assert_format("uri", &["https://example.com/x?y=1"], &["not a uri"]);
        assert_format("uri-reference", &["/relative/path", "https://a.com"], &["spa ce"]);
        assert_format(
            "uri-template",
            &["/users/{id}", "/search{?q,page}", "/plain"],
            &["/broken{", "/empty{}", "/nested{a{b}}"],
        );
    }

    #[test]
    fn regex_format_uses_the_cache_rules() {
        assert_format("regex", &["^a+$"], &["(unclosed", "(x+)+"]);
    }
}

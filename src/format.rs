//! Pure display helpers: durations, timestamps, and the addresses derived
//! from a device's management IP and console port.

use chrono::{DateTime, NaiveDateTime, Utc};

pub const PLACEHOLDER: &str = "NA";
pub const NO_LINKS: &str = "—";
pub const OPEN_ENDED: &str = "Inf";

pub const AV_PORT_BASE: u32 = 60000;
pub const OLD_MAIN_PORT_BASE: u32 = 50000;
pub const NEW_MAIN_PORT_BASE: u32 = 51000;

/// Added to a device's raw `port_id` to get the terminal server port.
pub const CONSOLE_PORT_OFFSET: u32 = 10000;

/// Seconds as `HH:MM`. Negative input clamps to zero; hours are not capped.
pub fn secs_to_hhmm(secs: i64) -> String {
    let s = secs.max(0);
    format!("{:02}:{:02}", s / 3600, (s % 3600) / 60)
}

pub fn secs_to_hhmmss(secs: i64) -> String {
    let s = secs.max(0);
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

pub fn opt_hhmm(secs: Option<i64>) -> String {
    secs.map(secs_to_hhmm)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// ISO 8601 timestamp as `YYYY-MM-DD HH:MM` in UTC. Naive timestamps are
/// taken as UTC, anything unparsable becomes the placeholder.
pub fn format_timestamp(raw: Option<&str>) -> String {
    raw.and_then(parse_timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub label: &'static str,
    pub port: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLinks {
    pub av: Link,
    pub old_main: Link,
    pub new_main: Link,
}

impl UiLinks {
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        [&self.av, &self.old_main, &self.new_main].into_iter()
    }
}

/// Last dotted-decimal octet of an IPv4-ish string.
pub fn last_octet(ip: &str) -> Option<u8> {
    let ip = ip.trim();
    if ip.is_empty() {
        return None;
    }
    ip.rsplit('.').next()?.trim().parse().ok()
}

pub fn ui_links(mgmt_ip: Option<&str>, host: &str) -> Option<UiLinks> {
    let n = u32::from(last_octet(mgmt_ip?)?);
    let link = |label: &'static str, base: u32| {
        let port = base + n;
        Link {
            label,
            port,
            url: format!("http://{}:{}/", host, port),
        }
    };
    Some(UiLinks {
        av: link("AV", AV_PORT_BASE),
        old_main: link("Main(old)", OLD_MAIN_PORT_BASE),
        new_main: link("Main(new)", NEW_MAIN_PORT_BASE),
    })
}

pub fn ssh_command(mgmt_ip: Option<&str>) -> Option<String> {
    let ip = mgmt_ip.map(str::trim).filter(|ip| !ip.is_empty())?;
    Some(format!("ssh admin@{}", ip))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleTarget {
    pub host: String,
    pub port: u32,
}

impl ConsoleTarget {
    pub fn telnet_command(&self) -> String {
        format!("telnet {} {}", self.host, self.port)
    }
}

/// Terminal-server address for a device. The raw `port_id` is offset by
/// [`CONSOLE_PORT_OFFSET`]; a missing console IP falls back to `default_host`.
pub fn console_target(
    console_ip: Option<&str>,
    port_id: Option<&str>,
    default_host: &str,
) -> Option<ConsoleTarget> {
    let raw: u32 = port_id?.trim().parse().ok()?;
    let host = console_ip
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(default_host);
    Some(ConsoleTarget {
        host: host.to_string(),
        port: raw.checked_add(CONSOLE_PORT_OFFSET)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn zero_durations() {
        assert_eq!(secs_to_hhmm(0), "00:00");
        assert_eq!(secs_to_hhmmss(0), "00:00:00");
    }

    #[test]
    fn durations_clamp_and_overflow_hours() {
        assert_eq!(secs_to_hhmm(-30), "00:00");
        assert_eq!(secs_to_hhmm(5400), "01:30");
        assert_eq!(secs_to_hhmmss(3661), "01:01:01");
        assert_eq!(secs_to_hhmm(100 * 3600), "100:00");
        assert_eq!(opt_hhmm(None), "NA");
    }

    #[test]
    fn timestamps() {
        assert_eq!(
            format_timestamp(Some("2026-10-18T10:30:00+02:00")),
            "2026-10-18 08:30"
        );
        assert_eq!(
            format_timestamp(Some("2026-10-18T10:30:00.123456")),
            "2026-10-18 10:30"
        );
        assert_eq!(format_timestamp(Some("yesterday")), "NA");
        assert_eq!(format_timestamp(None), "NA");
    }

    #[test]
    fn links_from_mgmt_ip() {
        let links = ui_links(Some(" 10.1.2.34 "), "localhost").unwrap();
        assert_eq!(links.av.url, "http://localhost:60034/");
        assert_eq!(links.old_main.port, 50034);
        assert_eq!(links.new_main.port, 51034);
        assert_eq!(ui_links(Some(""), "localhost"), None);
        assert_eq!(ui_links(Some("10.1.2.x"), "localhost"), None);
        assert_eq!(ui_links(Some("10.1.2.256"), "localhost"), None);
        assert_eq!(ui_links(None, "localhost"), None);
    }

    #[test]
    fn copy_commands() {
        assert_eq!(ssh_command(Some("10.0.0.5")).as_deref(), Some("ssh admin@10.0.0.5"));
        assert_eq!(ssh_command(Some("  ")), None);

        let target = console_target(None, Some("7"), "192.168.1.102").unwrap();
        assert_eq!(target.telnet_command(), "telnet 192.168.1.102 10007");
        let target = console_target(Some("10.9.9.9"), Some("12"), "192.168.1.102").unwrap();
        assert_eq!(target.telnet_command(), "telnet 10.9.9.9 10012");
        assert_eq!(console_target(Some("10.9.9.9"), Some("abc"), "h"), None);
        assert_eq!(console_target(None, None, "h"), None);
    }

    proptest! {
        #[test]
        fn link_ports_follow_last_octet(a in 0u8..=255, b in 0u8..=255, n in 0u8..=255) {
            let ip = format!("{}.{}.0.{}", a, b, n);
            let links = ui_links(Some(ip.as_str()), "localhost").unwrap();
            let n = u32::from(n);
            prop_assert_eq!(links.av.port, 60000 + n);
            prop_assert_eq!(links.old_main.port, 50000 + n);
            prop_assert_eq!(links.new_main.port, 51000 + n);
        }

        #[test]
        fn duration_formatting_is_monotonic(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let key = |s: &str| -> Vec<i64> { s.split(':').map(|p| p.parse().unwrap()).collect() };
            prop_assert!(key(&secs_to_hhmm(lo)) <= key(&secs_to_hhmm(hi)));
            prop_assert!(key(&secs_to_hhmmss(lo)) <= key(&secs_to_hhmmss(hi)));
        }
    }
}

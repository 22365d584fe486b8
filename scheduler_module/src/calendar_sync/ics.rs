use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ical::parser::ical::component::IcalEvent;
use ical::property::Property;
use ical::IcalParser;
use tracing::{debug, info};

use crate::scheduler::{TaskStore, TaskUpsert};

use super::{is_red_alert, CalendarSync, SyncError, DEFAULT_RED_ALERT_KEYWORDS};

const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";

/// Reads `VEVENT`s from a local iCalendar file (a calendar export or a
/// subscribed `.ics` kept on disk).
///
/// `DTEND` defaults to `DTSTART`; events without a `UID` are keyed by
/// their start and summary. Floating times are read as local time, and
/// `TZID` parameters are honored when the zone is known.
#[derive(Debug, Clone)]
pub struct IcsFileSync {
    path: PathBuf,
    keywords: Vec<String>,
}

impl IcsFileSync {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keywords: DEFAULT_RED_ALERT_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn to_upsert(&self, event: &IcalEvent) -> TaskUpsert {
        let title = property(event, "SUMMARY")
            .and_then(|prop| prop.value.as_deref())
            .map(unescape_text)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "No title".to_string());
        let start = property(event, "DTSTART").and_then(event_time);
        let end = property(event, "DTEND").and_then(event_time);

        let uid = property(event, "UID")
            .and_then(|prop| prop.value.as_deref())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                let begin = start.map(|value| value.to_rfc3339()).unwrap_or_default();
                format!("{}-{}", begin, title)
            });

        let start_ts = start.map(|value| value.timestamp()).unwrap_or(0);
        let end_ts = match (start, end) {
            (Some(_), Some(end)) => Some(end.timestamp()),
            (Some(_), None) => None,
            // Without a usable start the record stays untimed.
            (None, _) => Some(0),
        };
        let red = is_red_alert(&title, &self.keywords);
        TaskUpsert::new(uid, title, start_ts, end_ts, red)
    }
}

impl CalendarSync for IcsFileSync {
    fn name(&self) -> &str {
        "ics-file"
    }

    fn sync(&self, store: &TaskStore) -> Result<usize, SyncError> {
        if !self.path.exists() {
            debug!("ics file does not exist: {}", self.path.display());
            return Ok(0);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut processed = 0usize;
        for calendar in IcalParser::new(reader) {
            let calendar = calendar.map_err(|err| SyncError::Ics(err.to_string()))?;
            for event in &calendar.events {
                store.upsert(&self.to_upsert(event))?;
                processed += 1;
            }
        }
        info!(
            "ics sync processed {} event(s) from {}",
            processed,
            self.path.display()
        );
        Ok(processed)
    }
}

fn property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a Property> {
    event
        .properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
}

fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn event_time(prop: &Property) -> Option<DateTime<Utc>> {
    parse_ics_time(prop.value.as_deref()?, param(prop, "TZID"))
}

/// Parses `DATE-TIME` (UTC, zoned or floating) and all-day `DATE` values.
pub(crate) fn parse_ics_time(value: &str, tzid: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, DATE_TIME_FORMAT).ok()?;
        return Some(Utc.from_utc_datetime(&naive));
    }
    let naive = match NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT) {
        Ok(naive) => naive,
        Err(_) => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .ok()?
            .and_hms_opt(0, 0, 0)?,
    };
    match tzid.and_then(|name| name.trim_matches('"').parse::<Tz>().ok()) {
        Some(zone) => zone
            .from_local_datetime(&naive)
            .earliest()
            .map(|value| value.with_timezone(&Utc)),
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|value| value.with_timezone(&Utc)),
    }
}

fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

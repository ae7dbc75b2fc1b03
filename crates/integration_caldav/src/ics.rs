//! iCalendar (RFC 5545) codec for VEVENT resources
//!
//! Decoding goes through the `icalendar` parser and maps the parsed tree onto
//! [`Event`]. Absent optional properties become empty lists and `None`.
//! Encoding writes the document line by line, escaping TEXT values and
//! folding lines longer than 75 octets.
//!
//! Times keep the form they arrived in: `VALUE=DATE`, UTC (`Z`), `TZID=` or
//! floating. Absolute alarm triggers keep their TZID as well, so a reminder
//! written for 13:45 Europe/Berlin is read back as 13:45 Europe/Berlin.

use std::collections::BTreeSet;

use application::DavError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use domain::{
    AlarmAction, Attendee, AttendeeRole, CalendarUserType, Classification, DomainError, Event,
    EventStatus, EventTime, ParticipationStatus, Reminder, ReminderTrigger, TriggerRelation,
    format_iso_duration, parse_iso_duration,
};
use icalendar::parser;
use tracing::{debug, warn};

/// Product identifier written into every document
pub const PRODID: &str = "-//davbridge//CalDAV Integration//EN";

/// MIME type of encoded documents
pub const CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";
const MAX_LINE_OCTETS: usize = 75;

// =============================================================================
// Decoding
// =============================================================================

/// Decode the first VEVENT of an iCalendar document
///
/// When the resource holds a recurring series with overridden instances the
/// master (the VEVENT without `RECURRENCE-ID`) is returned.
pub fn decode_event(document: &str) -> Result<Event, DavError> {
    let unfolded = parser::unfold(document);
    let calendar = parser::read_calendar(&unfolded)
        .map_err(|e| DavError::Codec(format!("iCalendar parse error: {e}")))?;
    let nodes: Vec<Node> = calendar.components.iter().map(Node::from_component).collect();

    let mut vevents = Vec::new();
    collect_vevents(&nodes, &mut vevents);
    let vevent = vevents
        .iter()
        .find(|node| node.line("RECURRENCE-ID").is_none())
        .or_else(|| vevents.first())
        .ok_or_else(|| DavError::Codec("document contains no VEVENT".to_string()))?;

    event_from_node(vevent)
}

fn event_from_node(vevent: &Node) -> Result<Event, DavError> {
    let uid = vevent
        .text("UID")
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| DavError::Codec("VEVENT without UID".to_string()))?;

    let start = vevent
        .line("DTSTART")
        .ok_or_else(|| DavError::Codec(format!("VEVENT '{uid}' without DTSTART")))
        .and_then(decode_time)?;
    let end = match vevent.line("DTEND") {
        Some(line) => decode_time(line)?,
        None => implied_end(vevent, &start)?,
    };

    let attendees: Vec<Attendee> = vevent.lines_named("ATTENDEE").map(decode_attendee).collect();
    let categories: BTreeSet<String> = vevent
        .lines_named("CATEGORIES")
        .flat_map(|line| split_text_list(&line.value))
        .filter(|category| !category.is_empty())
        .collect();
    let reminders: Vec<Reminder> = vevent
        .children
        .iter()
        .filter(|child| child.name == "VALARM")
        .filter_map(decode_alarm)
        .collect();

    let recurrence_id = vevent.line("RECURRENCE-ID").map(decode_time).transpose()?;

    Ok(Event {
        uid,
        summary: vevent.text("SUMMARY").unwrap_or_default(),
        description: vevent.text("DESCRIPTION"),
        location: vevent.text("LOCATION"),
        all_day: start.is_date(),
        start,
        end,
        created: vevent.line("CREATED").and_then(|l| parse_stamp(&l.value)),
        last_modified: vevent.line("LAST-MODIFIED").and_then(|l| parse_stamp(&l.value)),
        status: vevent
            .line("STATUS")
            .and_then(|l| EventStatus::from_ical(&l.value))
            .unwrap_or_default(),
        organizer: vevent
            .line("ORGANIZER")
            .map(|l| strip_mailto(&l.value).to_string())
            .filter(|email| !email.is_empty()),
        categories,
        attendees,
        reminders,
        recurrence_rule: vevent
            .line("RRULE")
            .map(|l| l.value.trim().to_string())
            .filter(|rule| !rule.is_empty()),
        recurrence_id,
        // RFC 5545 asks for unrecognised classes to be treated as PRIVATE
        classification: vevent.line("CLASS").map_or(Classification::Public, |l| {
            Classification::from_ical(&l.value).unwrap_or(Classification::Private)
        }),
        etag: None,
        url: None,
    })
}

/// End of an event that has no DTEND: start + DURATION, else one day for
/// dates and zero length for date-times
fn implied_end(vevent: &Node, start: &EventTime) -> Result<EventTime, DavError> {
    if let Some(line) = vevent.line("DURATION") {
        let duration = parse_iso_duration(&line.value).map_err(codec_error)?;
        return Ok(start.shifted(duration));
    }
    Ok(match start {
        EventTime::Date(date) => EventTime::Date(date.succ_opt().unwrap_or(*date)),
        other => other.clone(),
    })
}

fn decode_time(line: &ContentLine) -> Result<EventTime, DavError> {
    let value = line.value.trim();
    let invalid = || DavError::Codec(format!("invalid {} value '{value}'", line.name));

    let is_date = line
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;
    if is_date {
        return NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(EventTime::Date)
            .map_err(|_| invalid());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let local = NaiveDateTime::parse_from_str(utc, LOCAL_FORMAT).map_err(|_| invalid())?;
        return Ok(EventTime::utc(Utc.from_utc_datetime(&local)));
    }

    let local = NaiveDateTime::parse_from_str(value, LOCAL_FORMAT).map_err(|_| invalid())?;
    match line.param("TZID") {
        Some(tzid) => Ok(zoned(local, tzid)),
        None => Ok(EventTime::Floating(local)),
    }
}

/// Resolve a TZID, keeping unknown identifiers verbatim so they round-trip
fn zoned(local: NaiveDateTime, tzid: &str) -> EventTime {
    let tzid = tzid.trim().trim_start_matches('/');
    EventTime::zoned(local, tzid).unwrap_or_else(|err| {
        warn!(tzid = %tzid, error = %err, "Unresolvable TZID, times read as UTC");
        EventTime::Zoned {
            local,
            tzid: tzid.to_string(),
        }
    })
}

fn parse_stamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, UTC_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, LOCAL_FORMAT))
        .ok()
        .map(|local| Utc.from_utc_datetime(&local))
}

fn decode_attendee(line: &ContentLine) -> Attendee {
    Attendee {
        email: strip_mailto(&line.value).to_string(),
        name: line
            .param("CN")
            .map(str::to_string)
            .filter(|name| !name.is_empty()),
        role: line.param("ROLE").and_then(AttendeeRole::from_ical),
        status: line.param("PARTSTAT").and_then(ParticipationStatus::from_ical),
        kind: line.param("CUTYPE").and_then(CalendarUserType::from_ical),
    }
}

fn decode_alarm(valarm: &Node) -> Option<Reminder> {
    let line = valarm.line("TRIGGER")?;
    let absolute = line
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE-TIME") || v.eq_ignore_ascii_case("DATE"));

    let trigger = if absolute {
        decode_time(line)
            .map(|fire_time| ReminderTrigger::Absolute { fire_time })
            .ok()
    } else {
        parse_iso_duration(&line.value)
            .map(|offset| ReminderTrigger::Relative {
                offset,
                related: match line.param("RELATED") {
                    Some(related) if related.eq_ignore_ascii_case("END") => TriggerRelation::End,
                    _ => TriggerRelation::Start,
                },
            })
            .ok()
    };

    let Some(trigger) = trigger else {
        debug!(trigger = %line.value, "Skipping VALARM with unreadable trigger");
        return None;
    };

    Some(Reminder {
        action: valarm
            .line("ACTION")
            .map_or_else(AlarmAction::default, |l| AlarmAction::from_ical(&l.value)),
        trigger,
        description: valarm.text("DESCRIPTION"),
    })
}

fn strip_mailto(value: &str) -> &str {
    let value = value.trim();
    match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
        _ => value,
    }
}

fn codec_error(err: DomainError) -> DavError {
    DavError::Codec(err.to_string())
}

// =============================================================================
// Parsed tree
// =============================================================================

/// Owned copy of a parsed component with upper-cased names
#[derive(Debug)]
struct Node {
    name: String,
    lines: Vec<ContentLine>,
    children: Vec<Node>,
}

#[derive(Debug)]
struct ContentLine {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl Node {
    fn from_component(component: &parser::Component<'_>) -> Self {
        Self {
            name: component.name.to_string().to_ascii_uppercase(),
            lines: component
                .properties
                .iter()
                .map(ContentLine::from_property)
                .collect(),
            children: component
                .components
                .iter()
                .map(Self::from_component)
                .collect(),
        }
    }

    fn line(&self, name: &str) -> Option<&ContentLine> {
        self.lines.iter().find(|line| line.name == name)
    }

    fn lines_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContentLine> + 'a {
        self.lines.iter().filter(move |line| line.name == name)
    }

    /// Unescaped TEXT value of the first `name` property
    fn text(&self, name: &str) -> Option<String> {
        self.line(name).map(|line| unescape_text(&line.value))
    }
}

impl ContentLine {
    fn from_property(property: &parser::Property<'_>) -> Self {
        Self {
            name: property.name.to_string().to_ascii_uppercase(),
            params: property
                .params
                .iter()
                .map(|param| {
                    (
                        param.key.to_string().to_ascii_uppercase(),
                        param.val.as_ref().map(ToString::to_string).unwrap_or_default(),
                    )
                })
                .collect(),
            value: property.val.to_string(),
        }
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.trim_matches('"'))
    }
}

fn collect_vevents<'n>(nodes: &'n [Node], out: &mut Vec<&'n Node>) {
    for node in nodes {
        if node.name == "VEVENT" {
            out.push(node);
        } else {
            collect_vevents(&node.children, out);
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode an event as a complete VCALENDAR document
///
/// `ORGANIZER` is only written for events with attendees; a personal event
/// has no one to organise. `DTSTAMP` is the last-modified time, or now.
#[must_use]
pub fn encode_event(event: &Event) -> String {
    let mut ics = String::new();
    push_line(&mut ics, "BEGIN:VCALENDAR");
    push_line(&mut ics, "VERSION:2.0");
    push_line(&mut ics, &format!("PRODID:{PRODID}"));
    push_line(&mut ics, "CALSCALE:GREGORIAN");
    push_line(&mut ics, "BEGIN:VEVENT");

    push_line(&mut ics, &format!("UID:{}", escape_text(&event.uid)));
    let stamp = event.last_modified.unwrap_or_else(Utc::now);
    push_line(&mut ics, &format!("DTSTAMP:{}", stamp.format(UTC_FORMAT)));
    if let Some(created) = event.created {
        push_line(&mut ics, &format!("CREATED:{}", created.format(UTC_FORMAT)));
    }
    if let Some(modified) = event.last_modified {
        push_line(&mut ics, &format!("LAST-MODIFIED:{}", modified.format(UTC_FORMAT)));
    }

    push_time(&mut ics, "DTSTART", &event.start);
    push_time(&mut ics, "DTEND", &event.end);
    push_line(&mut ics, &format!("SUMMARY:{}", escape_text(&event.summary)));
    if let Some(description) = &event.description {
        push_line(&mut ics, &format!("DESCRIPTION:{}", escape_text(description)));
    }
    if let Some(location) = &event.location {
        push_line(&mut ics, &format!("LOCATION:{}", escape_text(location)));
    }
    push_line(&mut ics, &format!("STATUS:{}", event.status.as_ical()));
    push_line(&mut ics, &format!("CLASS:{}", event.classification.as_ical()));

    if !event.categories.is_empty() {
        let categories: Vec<String> = event.categories.iter().map(|c| escape_text(c)).collect();
        push_line(&mut ics, &format!("CATEGORIES:{}", categories.join(",")));
    }
    if let Some(rule) = &event.recurrence_rule {
        push_line(&mut ics, &format!("RRULE:{rule}"));
    }
    if let Some(recurrence_id) = &event.recurrence_id {
        push_time(&mut ics, "RECURRENCE-ID", recurrence_id);
    }

    if !event.attendees.is_empty() {
        if let Some(organizer) = &event.organizer {
            push_line(&mut ics, &format!("ORGANIZER:mailto:{organizer}"));
        }
        for attendee in &event.attendees {
            push_line(&mut ics, &encode_attendee(attendee));
        }
    }

    for reminder in &event.reminders {
        push_alarm(&mut ics, reminder);
    }

    push_line(&mut ics, "END:VEVENT");
    push_line(&mut ics, "END:VCALENDAR");
    ics
}

/// `;VALUE=DATE` / `;TZID=..` parameters and the value for a time
fn time_parts(time: &EventTime) -> (String, String) {
    match time {
        EventTime::Date(date) => (";VALUE=DATE".to_string(), date.format(DATE_FORMAT).to_string()),
        EventTime::Utc(instant) => (String::new(), instant.format(UTC_FORMAT).to_string()),
        EventTime::Zoned { local, tzid } => (
            format!(";TZID={}", param_value(tzid)),
            local.format(LOCAL_FORMAT).to_string(),
        ),
        EventTime::Floating(local) => (String::new(), local.format(LOCAL_FORMAT).to_string()),
    }
}

fn push_time(ics: &mut String, name: &str, time: &EventTime) {
    let (params, value) = time_parts(time);
    push_line(ics, &format!("{name}{params}:{value}"));
}

fn encode_attendee(attendee: &Attendee) -> String {
    let mut line = String::from("ATTENDEE");
    if let Some(name) = &attendee.name {
        line.push_str(&format!(";CN={}", param_value(name)));
    }
    if let Some(role) = attendee.role {
        line.push_str(&format!(";ROLE={}", role.as_ical()));
    }
    if let Some(status) = attendee.status {
        line.push_str(&format!(";PARTSTAT={}", status.as_ical()));
    }
    if let Some(kind) = attendee.kind {
        line.push_str(&format!(";CUTYPE={}", kind.as_ical()));
    }
    line.push_str(&format!(":mailto:{}", attendee.email));
    line
}

fn push_alarm(ics: &mut String, reminder: &Reminder) {
    push_line(ics, "BEGIN:VALARM");
    push_line(ics, &format!("ACTION:{}", reminder.action.as_ical()));
    match &reminder.trigger {
        ReminderTrigger::Relative { offset, related } => {
            let related = match related {
                TriggerRelation::Start => "",
                TriggerRelation::End => ";RELATED=END",
            };
            push_line(
                ics,
                &format!("TRIGGER{related}:{}", format_iso_duration(*offset)),
            );
        },
        ReminderTrigger::Absolute { fire_time } => {
            let (params, value) = time_parts(fire_time);
            if fire_time.is_date() {
                push_line(ics, &format!("TRIGGER{params}:{value}"));
            } else {
                push_line(ics, &format!("TRIGGER;VALUE=DATE-TIME{params}:{value}"));
            }
        },
    }
    if let Some(description) = &reminder.description {
        push_line(ics, &format!("DESCRIPTION:{}", escape_text(description)));
    }
    push_line(ics, "END:VALARM");
}

/// Append a content line, folded at 75 octets, with CRLF
fn push_line(ics: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            ics.push_str("\r\n ");
            width = 1;
        }
        ics.push(ch);
        width += len;
    }
    ics.push_str("\r\n");
}

/// Parameter value, quoted when it contains separators
fn param_value(value: &str) -> String {
    let value: String = value.chars().filter(|c| *c != '"' && !c.is_control()).collect();
    if value.contains([':', ';', ',']) {
        format!("\"{value}\"")
    } else {
        value
    }
}

// =============================================================================
// TEXT escaping
// =============================================================================

/// TEXT escaping; CRLF and lone CR are written as a line break
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push_str("\\n");
            },
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a comma-separated TEXT list, honouring `\,`
fn split_text_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ',' {
            items.push(unescape_text(current.trim()));
            current.clear();
        } else {
            current.push(ch);
        }
    }
    items.push(unescape_text(current.trim()));
    items
}

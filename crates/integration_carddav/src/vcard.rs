//! vCard 3.0 codec (RFC 2426)
//!
//! Maps FN, N, EMAIL, TEL, ADR, BDAY, NOTE, CATEGORIES and UID to a
//! [`Contact`]. Property groups (`item1.EMAIL`) and bare type parameters
//! (`TEL;CELL:`) written by older clients are accepted on decode.

use std::collections::BTreeSet;

use application::DavError;
use chrono::{NaiveDate, Utc};
use domain::{Contact, ContactAddress, ContactEmail, ContactPhone};
use tracing::debug;

/// `PRODID` written into every card
pub const PRODID: &str = "-//davbridge//CardDAV Integration//EN";

/// MIME type of a vCard body
pub const CONTENT_TYPE: &str = "text/vcard; charset=utf-8";

const MAX_LINE_OCTETS: usize = 75;

/// Type values that say nothing about which address this is
const GENERIC_TYPES: [&str; 2] = ["internet", "pref"];

// =============================================================================
// Decoding
// =============================================================================

/// Decode the first card of a vCard document
pub fn decode_contact(data: &str) -> Result<Contact, DavError> {
    let lines = unfold_vcard_lines(data);
    let mut properties = lines
        .iter()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(Property::parse)
        .skip_while(|p| !(p.name == "BEGIN" && p.value.eq_ignore_ascii_case("VCARD")));

    if properties.next().is_none() {
        return Err(DavError::Codec("document contains no VCARD".to_string()));
    }

    let mut uid = None;
    let mut full_name = None;
    let mut structured_name = None;
    let mut emails = Vec::new();
    let mut phones = Vec::new();
    let mut addresses = Vec::new();
    let mut birthday = None;
    let mut notes = None;
    let mut groups = BTreeSet::new();

    for property in properties {
        match property.name.as_str() {
            "END" => break,
            "UID" => uid = Some(property.value.trim().to_string()),
            "FN" => full_name = Some(unescape_text(&property.value)),
            "N" => structured_name = Some(name_from_components(&property.value)),
            "EMAIL" => emails.push(ContactEmail {
                tag: property.type_tag(),
                email: unescape_text(property.value.trim()),
            }),
            "TEL" => phones.push(ContactPhone {
                tag: property.type_tag(),
                number: unescape_text(property.value.trim()),
            }),
            "ADR" => {
                let address = decode_address(&property);
                if !address.is_empty() {
                    addresses.push(address);
                }
            },
            "BDAY" => {
                birthday = parse_vcard_date(property.value.trim());
                if birthday.is_none() {
                    debug!(value = %property.value, "Ignoring unreadable BDAY");
                }
            },
            "NOTE" => notes = Some(unescape_text(&property.value)),
            "CATEGORIES" => groups.extend(split_text_list(&property.value)),
            "X-ADDRESSBOOKSERVER-GROUP" => {
                groups.insert(unescape_text(property.value.trim()));
            },
            "X-ADDRESSBOOKSERVER-MEMBER" => {
                let value = property.value.trim();
                let group = value.rsplit_once("urn:uuid:").map_or(value, |(_, id)| id);
                groups.insert(group.to_string());
            },
            _ => {},
        }
    }

    let uid = uid
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| DavError::Codec("VCARD without UID".to_string()))?;
    groups.retain(|group| !group.is_empty());

    Ok(Contact {
        uid,
        full_name: full_name
            .filter(|name| !name.trim().is_empty())
            .or(structured_name)
            .unwrap_or_default(),
        emails,
        phones,
        addresses,
        birthday,
        notes: notes.filter(|note| !note.is_empty()),
        groups,
        url: None,
        etag: None,
    })
}

/// Display name from `N:Family;Given;Additional;Prefix;Suffix`
fn name_from_components(value: &str) -> String {
    let parts = split_structured(value);
    let part = |i: usize| parts.get(i).map(String::as_str).unwrap_or_default();
    [part(3), part(1), part(2), part(0), part(4)]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ADR:PO Box;Extended;Street;City;Region;Postal code;Country`
fn decode_address(property: &Property) -> ContactAddress {
    let parts = split_structured(&property.value);
    let part = |i: usize| parts.get(i).filter(|s| !s.is_empty()).cloned();
    ContactAddress {
        tag: property.type_tag(),
        street: part(2),
        city: part(3),
        state: part(4),
        postal_code: part(5),
        country: part(6),
    }
}

/// Parse a vCard date (BDAY)
fn parse_vcard_date(value: &str) -> Option<NaiveDate> {
    let date = value.split_once('T').map_or(value, |(date, _)| date);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"))
        .ok()
}

/// Unfold continuation lines (RFC 2425 line folding)
fn unfold_vcard_lines(data: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for line in data.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Drop the single folding whitespace
            current.push_str(&line[1..]);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = line.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// One content line split into name, parameters and raw value
#[derive(Debug)]
struct Property {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl Property {
    fn parse(line: &str) -> Option<Self> {
        let colon = find_unquoted(line, ':')?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);

        let mut segments = split_unquoted(head, ';').into_iter();
        let name = segments.next()?;
        // Apple clients prefix grouped properties: `item1.EMAIL`
        let name = name.rsplit_once('.').map_or(name, |(_, name)| name);

        let params = segments
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (key.trim().to_ascii_uppercase(), value.to_string()),
                // vCard 2.1 style bare type: `TEL;CELL:`
                None => ("TYPE".to_string(), segment.to_string()),
            })
            .collect();

        Some(Self {
            name: name.trim().to_ascii_uppercase(),
            params,
            value: value.to_string(),
        })
    }

    /// First specific TYPE value, lower-cased
    ///
    /// Generic values (`pref`, `internet`) count only when nothing more
    /// specific is present.
    fn type_tag(&self) -> Option<String> {
        let values: Vec<String> = self
            .params
            .iter()
            .filter(|(key, _)| key == "TYPE")
            .flat_map(|(_, value)| {
                if value.starts_with('"') {
                    vec![value.trim_matches('"').to_string()]
                } else {
                    value.split(',').map(ToString::to_string).collect()
                }
            })
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect();
        values
            .iter()
            .find(|value| !GENERIC_TYPES.contains(&value.as_str()))
            .or_else(|| values.first())
            .cloned()
    }
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    text.char_indices().find_map(|(i, ch)| {
        if ch == '"' {
            quoted = !quoted;
        }
        (ch == needle && !quoted).then_some(i)
    })
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(at) = find_unquoted(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + 1..];
    }
    parts.push(rest);
    parts
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a contact as a vCard 3.0 document
///
/// `N` is derived from the display name (last word as family name) since
/// the record only carries the formatted name. `REV` is the encode time.
#[must_use]
pub fn encode_contact(contact: &Contact) -> String {
    let mut vcard = String::with_capacity(512);
    push_line(&mut vcard, "BEGIN:VCARD");
    push_line(&mut vcard, "VERSION:3.0");
    push_line(&mut vcard, &format!("PRODID:{PRODID}"));
    push_line(&mut vcard, &format!("UID:{}", contact.uid));
    push_line(&mut vcard, &format!("FN:{}", escape_text(&contact.full_name)));

    let name = contact.full_name.trim();
    let (family, given) = match name.rsplit_once(' ') {
        Some((given, family)) => (family.trim(), given.trim()),
        None => ("", name),
    };
    push_line(
        &mut vcard,
        &format!("N:{};{};;;", escape_text(family), escape_text(given)),
    );

    for email in &contact.emails {
        push_line(
            &mut vcard,
            &format!(
                "EMAIL{}:{}",
                type_param(email.tag.as_deref()),
                escape_text(&email.email)
            ),
        );
    }
    for phone in &contact.phones {
        push_line(
            &mut vcard,
            &format!(
                "TEL{}:{}",
                type_param(phone.tag.as_deref()),
                escape_text(&phone.number)
            ),
        );
    }
    for address in &contact.addresses {
        let part = |value: &Option<String>| escape_text(value.as_deref().unwrap_or_default());
        push_line(
            &mut vcard,
            &format!(
                "ADR{}:;;{};{};{};{};{}",
                type_param(address.tag.as_deref()),
                part(&address.street),
                part(&address.city),
                part(&address.state),
                part(&address.postal_code),
                part(&address.country),
            ),
        );
    }

    if let Some(birthday) = contact.birthday {
        push_line(&mut vcard, &format!("BDAY:{}", birthday.format("%Y-%m-%d")));
    }
    if let Some(notes) = &contact.notes {
        push_line(&mut vcard, &format!("NOTE:{}", escape_text(notes)));
    }
    if !contact.groups.is_empty() {
        let groups: Vec<String> = contact.groups.iter().map(|g| escape_text(g)).collect();
        push_line(&mut vcard, &format!("CATEGORIES:{}", groups.join(",")));
    }

    push_line(
        &mut vcard,
        &format!("REV:{}", Utc::now().format("%Y%m%dT%H%M%SZ")),
    );
    push_line(&mut vcard, "END:VCARD");
    vcard
}

fn type_param(tag: Option<&str>) -> String {
    let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) else {
        return String::new();
    };
    let tag: String = tag
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect::<String>()
        .to_lowercase();
    if tag.contains([':', ';', ',']) {
        format!(";TYPE=\"{tag}\"")
    } else {
        format!(";TYPE={tag}")
    }
}

/// Append a content line, folded at 75 octets, with CRLF
fn push_line(vcard: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            vcard.push_str("\r\n ");
            width = 1;
        }
        vcard.push(ch);
        width += len;
    }
    vcard.push_str("\r\n");
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

/// Split on unescaped `separator`, unescaping each piece
fn split_escaped(value: &str, separator: char) -> Vec<String> {
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
        } else if ch == separator {
            items.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(ch);
        }
    }
    items.push(unescape_text(&current));
    items
}

/// Components of a structured value (`N`, `ADR`)
fn split_structured(value: &str) -> Vec<String> {
    split_escaped(value, ';')
}

/// Items of a comma-separated TEXT list
fn split_text_list(value: &str) -> Vec<String> {
    split_escaped(value, ',')
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect()
}

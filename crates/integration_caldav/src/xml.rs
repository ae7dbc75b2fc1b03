//! CalDAV XML bodies and multistatus parsing

use application::DavError;
use domain::{EntityTag, TimeRange};
use quick_xml::{Reader, events::Event as XmlEvent};

/// MIME type of REPORT bodies
pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// One `<D:response>` carrying calendar data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarResource {
    /// Resource path or URL as the server wrote it
    pub href: String,
    /// `getetag` property
    pub etag: Option<EntityTag>,
    /// `calendar-data` property (an iCalendar document)
    pub data: String,
}

/// calendar-query REPORT selecting VEVENTs that overlap `range`
#[must_use]
pub fn calendar_query(range: &TimeRange) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <D:getetag/>
    <C:calendar-data/>
  </D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="{}" end="{}"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>"#,
        range.start().format("%Y%m%dT%H%M%SZ"),
        range.end().format("%Y%m%dT%H%M%SZ"),
    )
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    Etag,
    Data,
}

#[derive(Default)]
struct PartialResource {
    href: String,
    etag: String,
    data: String,
}

impl PartialResource {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Href => self.href.push_str(text),
            Field::Etag => self.etag.push_str(text),
            Field::Data => self.data.push_str(text),
        }
    }

    /// Responses without calendar data (e.g. a 404 propstat) are dropped
    fn finish(self) -> Option<CalendarResource> {
        if self.data.trim().is_empty() {
            return None;
        }
        Some(CalendarResource {
            href: self.href.trim().to_string(),
            etag: EntityTag::from_header(Some(self.etag.trim())),
            data: self.data,
        })
    }
}

/// Extract every response with calendar data from a 207 multistatus body
///
/// Element names are matched on their local part, so any namespace prefix
/// (`D:`, `d:`, `C:`, `cal:` or none) is accepted.
pub fn parse_multistatus(body: &str) -> Result<Vec<CalendarResource>, DavError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<PartialResource> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(PartialResource::default()),
                b"href" => field = Some(Field::Href),
                b"getetag" => field = Some(Field::Etag),
                b"calendar-data" => field = Some(Field::Data),
                _ => {},
            },
            Ok(XmlEvent::Text(e)) => {
                if let (Some(field), Some(resource)) = (field, current.as_mut()) {
                    let text = e
                        .unescape()
                        .map_err(|e| DavError::Codec(format!("invalid multistatus text: {e}")))?;
                    resource.push(field, &text);
                }
            },
            Ok(XmlEvent::CData(e)) => {
                if let (Some(field), Some(resource)) = (field, current.as_mut()) {
                    resource.push(field, &String::from_utf8_lossy(&e.into_inner()));
                }
            },
            Ok(XmlEvent::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(resource) = current.take().and_then(PartialResource::finish) {
                        resources.push(resource);
                    }
                    field = None;
                },
                b"href" | b"getetag" | b"calendar-data" => field = None,
                _ => {},
            },
            Ok(XmlEvent::Eof) => break,
            Err(e) => {
                return Err(DavError::Codec(format!("invalid multistatus XML: {e}")));
            },
            _ => {},
        }
        buf.clear();
    }

    Ok(resources)
}

/// Absolute URL for an href, resolved against the collection it came from
#[must_use]
pub fn resolve_href(collection_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with('/') {
        let origin_end = collection_url
            .find("://")
            .and_then(|scheme| {
                collection_url[scheme + 3..]
                    .find('/')
                    .map(|path| scheme + 3 + path)
            })
            .unwrap_or(collection_url.len());
        return format!("{}{href}", &collection_url[..origin_end]);
    }
    format!("{collection_url}{href}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/remote.php/dav/calendars/alice/personal/evt-1.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>&quot;etag-1&quot;</d:getetag>
        <cal:calendar-data>BEGIN:VCALENDAR&#13;
VERSION:2.0&#13;
END:VCALENDAR</cal:calendar-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/calendars/alice/personal/gone.ics</d:href>
    <d:propstat>
      <d:prop><d:getetag/><cal:calendar-data/></d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/calendars/alice/personal/evt-2.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"etag-2"</d:getetag>
        <cal:calendar-data><![CDATA[BEGIN:VCALENDAR
END:VCALENDAR]]></cal:calendar-data>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn query_carries_utc_time_range() {
        let range = TimeRange::parse("2025-04-21T00:00:00Z", "2025-04-28T00:00:00Z").unwrap();
        let body = calendar_query(&range);
        assert!(body.contains(r#"<C:time-range start="20250421T000000Z" end="20250428T000000Z"/>"#));
        assert!(body.contains(r#"<C:comp-filter name="VEVENT">"#));
        assert!(body.contains("<D:getetag/>"));
    }

    #[test]
    fn parses_responses_with_data_only() {
        let resources = parse_multistatus(MULTISTATUS).unwrap();
        assert_eq!(resources.len(), 2);

        assert_eq!(
            resources[0].href,
            "/remote.php/dav/calendars/alice/personal/evt-1.ics"
        );
        assert_eq!(resources[0].etag.as_ref().unwrap().as_str(), "\"etag-1\"");
        assert!(resources[0].data.starts_with("BEGIN:VCALENDAR"));
        assert!(resources[0].data.contains("VERSION:2.0"));

        assert_eq!(resources[1].etag.as_ref().unwrap().as_str(), "\"etag-2\"");
        assert!(resources[1].data.contains("END:VCALENDAR"));
    }

    #[test]
    fn unprefixed_elements_are_accepted() {
        let body = r#"<multistatus xmlns="DAV:"><response><href>/a.ics</href><propstat><prop>
            <calendar-data xmlns="urn:ietf:params:xml:ns:caldav">BEGIN:VCALENDAR</calendar-data>
            </prop></propstat></response></multistatus>"#;
        let resources = parse_multistatus(body).unwrap();
        assert_eq!(resources.len(), 1);
        assert!(resources[0].etag.is_none());
    }

    #[test]
    fn empty_multistatus_yields_nothing() {
        let body = r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#;
        assert!(parse_multistatus(body).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_a_codec_error() {
        let body = "<d:multistatus><d:response></d:multistatus>";
        assert!(matches!(parse_multistatus(body), Err(DavError::Codec(_))));
    }

    #[test]
    fn hrefs_resolve_against_collection_origin() {
        let collection = "https://cloud.example.com/remote.php/dav/calendars/alice/personal/";
        assert_eq!(
            resolve_href(collection, "/remote.php/dav/calendars/alice/personal/x.ics"),
            "https://cloud.example.com/remote.php/dav/calendars/alice/personal/x.ics"
        );
        assert_eq!(
            resolve_href(collection, "x.ics"),
            "https://cloud.example.com/remote.php/dav/calendars/alice/personal/x.ics"
        );
        assert_eq!(
            resolve_href(collection, "https://other.example.com/x.ics"),
            "https://other.example.com/x.ics"
        );
    }
}

//! CardDAV XML bodies and multistatus parsing

use application::{ContactSearch, DavError};
use domain::EntityTag;
use quick_xml::{Reader, escape::escape, events::Event as XmlEvent};

/// MIME type of REPORT bodies
pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// One `<d:response>` carrying address data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResource {
    /// Resource path or URL as the server wrote it
    pub href: String,
    /// `getetag` property
    pub etag: Option<EntityTag>,
    /// `address-data` property (a vCard)
    pub data: String,
}

/// addressbook-query REPORT, filtered when a search is given
///
/// Every criterion becomes a `prop-filter` with a case-insensitive
/// `contains` text match; the search mode picks the filter's `test`.
#[must_use]
pub fn addressbook_query(search: Option<&ContactSearch>) -> String {
    let filter = search.map(search_filter).unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:prop>
    <D:getetag/>
    <C:address-data/>
  </D:prop>{filter}
</C:addressbook-query>"#
    )
}

fn search_filter(search: &ContactSearch) -> String {
    let mut filter = format!("\n  <C:filter test=\"{}\">", search.mode.as_str());
    for criterion in &search.criteria {
        filter.push_str(&format!(
            r#"
    <C:prop-filter name="{}">
      <C:text-match collation="i;unicode-casemap" match-type="contains">{}</C:text-match>
    </C:prop-filter>"#,
            criterion.field.vcard_property(),
            escape(criterion.value.trim()),
        ));
    }
    filter.push_str("\n  </C:filter>");
    filter
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

    fn finish(self) -> Option<AddressResource> {
        if self.data.trim().is_empty() {
            return None;
        }
        Some(AddressResource {
            href: self.href.trim().to_string(),
            etag: EntityTag::from_header(Some(self.etag.trim())),
            data: self.data,
        })
    }
}

/// Extract every response with address data from a 207 multistatus body
pub fn parse_multistatus(body: &str) -> Result<Vec<AddressResource>, DavError> {
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
                b"address-data" => field = Some(Field::Data),
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
                b"href" | b"getetag" | b"address-data" => field = None,
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

/// Absolute URL for an href, resolved against the address book it came from
#[must_use]
pub fn resolve_href(addressbook_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with('/') {
        let origin_end = addressbook_url
            .find("://")
            .and_then(|scheme| {
                addressbook_url[scheme + 3..]
                    .find('/')
                    .map(|path| scheme + 3 + path)
            })
            .unwrap_or(addressbook_url.len());
        return format!("{}{href}", &addressbook_url[..origin_end]);
    }
    format!("{addressbook_url}{href}")
}

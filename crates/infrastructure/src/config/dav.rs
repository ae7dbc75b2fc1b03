//! Upstream server addressing

use serde::{Deserialize, Serialize};

/// Location of the DAV server and of per-user collections
///
/// Collection paths are templates relative to `base_url`; `{user}` is
/// replaced with the forwarded username and `{collection}` with the
/// calendar or address book name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DavConfig {
    /// Server root, e.g. `https://cloud.example.com`
    #[serde(default)]
    pub base_url: String,

    /// Calendar collection template
    #[serde(default = "default_calendar_path")]
    pub calendar_path: String,

    /// Address book collection template
    #[serde(default = "default_addressbook_path")]
    pub addressbook_path: String,

    /// Calendar used when a request names none
    #[serde(default = "default_calendar")]
    pub default_calendar: String,

    /// Address book used when a request names none
    #[serde(default = "default_addressbook")]
    pub default_addressbook: String,
}

fn default_calendar_path() -> String {
    "remote.php/dav/calendars/{user}/{collection}/".to_string()
}

fn default_addressbook_path() -> String {
    "remote.php/dav/addressbooks/users/{user}/{collection}/".to_string()
}

fn default_calendar() -> String {
    "personal".to_string()
}

fn default_addressbook() -> String {
    "contacts".to_string()
}

impl Default for DavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            calendar_path: default_calendar_path(),
            addressbook_path: default_addressbook_path(),
            default_calendar: default_calendar(),
            default_addressbook: default_addressbook(),
        }
    }
}

impl DavConfig {
    /// Config pointing at `base_url` with default paths
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Absolute calendar collection template, `{user}` and `{collection}` kept
    #[must_use]
    pub fn calendar_template(&self) -> String {
        self.absolute(&self.calendar_path)
    }

    /// Absolute address book collection template, `{user}` and `{collection}` kept
    #[must_use]
    pub fn addressbook_template(&self) -> String {
        self.absolute(&self.addressbook_path)
    }

    fn absolute(&self, template: &str) -> String {
        format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            template.trim_matches('/')
        )
    }
}

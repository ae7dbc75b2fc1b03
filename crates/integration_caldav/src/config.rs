//! Calendar collection addressing

/// Where a user's calendars live
///
/// `collection_template` is an absolute URL containing `{user}` and
/// `{collection}` placeholders, e.g.
/// `https://cloud.example.com/remote.php/dav/calendars/{user}/{collection}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalDavConfig {
    /// Collection URL template
    pub collection_template: String,
    /// Calendar used when a call names none
    pub default_calendar: String,
}

impl CalDavConfig {
    /// Create a config
    #[must_use]
    pub fn new(collection_template: impl Into<String>, default_calendar: impl Into<String>) -> Self {
        Self {
            collection_template: collection_template.into(),
            default_calendar: default_calendar.into(),
        }
    }

    /// URL of a user's calendar collection, always ending in `/`
    #[must_use]
    pub fn collection_url(&self, user: &str, calendar: Option<&str>) -> String {
        let calendar = calendar
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.default_calendar);
        let url = self
            .collection_template
            .replace("{user}", user)
            .replace("{collection}", calendar);
        if url.ends_with('/') {
            url
        } else {
            format!("{url}/")
        }
    }

    /// URL of the `.ics` resource holding `uid`
    #[must_use]
    pub fn event_url(&self, user: &str, calendar: Option<&str>, uid: &str) -> String {
        format!("{}{uid}.ics", self.collection_url(user, calendar))
    }
}

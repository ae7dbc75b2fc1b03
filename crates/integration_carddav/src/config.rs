//! Address book addressing

/// Where a user's address books live
///
/// `collection_template` is an absolute URL with `{user}` and `{collection}`
/// placeholders, e.g.
/// `https://cloud.example.com/remote.php/dav/addressbooks/users/{user}/{collection}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDavConfig {
    /// Address book URL template
    pub collection_template: String,
    /// Address book used when a call names none
    pub default_addressbook: String,
}

impl CardDavConfig {
    #[must_use]
    pub fn new(
        collection_template: impl Into<String>,
        default_addressbook: impl Into<String>,
    ) -> Self {
        Self {
            collection_template: collection_template.into(),
            default_addressbook: default_addressbook.into(),
        }
    }

    /// URL of a user's address book, always ending in `/`
    #[must_use]
    pub fn addressbook_url(&self, user: &str, addressbook: Option<&str>) -> String {
        let addressbook = addressbook
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.default_addressbook);
        let url = self
            .collection_template
            .replace("{user}", user)
            .replace("{collection}", addressbook);
        if url.ends_with('/') { url } else { format!("{url}/") }
    }

    /// URL of the `.vcf` resource holding `uid`
    #[must_use]
    pub fn contact_url(&self, user: &str, addressbook: Option<&str>, uid: &str) -> String {
        format!("{}{uid}.vcf", self.addressbook_url(user, addressbook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CardDavConfig {
        CardDavConfig::new(
            "https://cloud.example.com/remote.php/dav/addressbooks/users/{user}/{collection}/",
            "contacts",
        )
    }

    #[test]
    fn addressbook_url_uses_default() {
        assert_eq!(
            config().addressbook_url("alice", None),
            "https://cloud.example.com/remote.php/dav/addressbooks/users/alice/contacts/"
        );
    }

    #[test]
    fn contact_url_builds_correctly() {
        assert_eq!(
            config().contact_url("alice", Some("family"), "c-1"),
            "https://cloud.example.com/remote.php/dav/addressbooks/users/alice/family/c-1.vcf"
        );
    }

    #[test]
    fn blank_addressbook_name_falls_back() {
        let config = CardDavConfig::new("http://dav.local/{user}/{collection}", "contacts");
        assert_eq!(
            config.addressbook_url("bob", Some(" ")),
            "http://dav.local/bob/contacts/"
        );
    }
}

//! Query parameter normalisation
//!
//! The v1 surface is dispatched on query parameters as much as on the
//! method. This module flattens the raw query string into a typed struct
//! and fixes the precedence rules: singular `version` beats singular
//! `revision`, and `meta` beats the pluralised `revisions`/`versions`.

use std::collections::HashMap;

/// Parsed and precedence-resolved query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiQuery {
    /// Metadata requested instead of bytes
    pub meta: bool,
    /// Revision listing requested (`revisions` or `versions`)
    pub revisions: bool,
    /// A specific version's bytes (`version` wins over `revision`)
    pub version: Option<String>,
    /// ZIP archive of a folder
    pub zip: bool,
    /// Force the gateway to proxy bytes instead of redirecting
    pub direct: bool,
    /// `kind=file|folder` for PUT
    pub kind: Option<String>,
    /// New entity name for PUT into a folder
    pub name: Option<String>,
    /// Content-Disposition filename override
    pub display_name: Option<String>,
    /// Root deletion confirmation
    pub confirm_delete: bool,
    /// Conflict policy for PUT
    pub conflict: Option<String>,
    /// Relayed cookie credential
    pub cookie: Option<String>,
    /// Relayed view-only capability
    pub view_only: Option<String>,
}

impl ApiQuery {
    /// Parses a raw query string (no leading `?`).
    ///
    /// Flag parameters count as set when present with any value, including
    /// empty (`?meta=` and `?meta` both set `meta`).
    pub fn parse(raw: Option<&str>) -> Self {
        let mut present: HashMap<String, String> = HashMap::new();
        if let Some(raw) = raw {
            for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
                present.entry(key.into_owned()).or_insert(value.into_owned());
            }
        }

        let meta = present.contains_key("meta");
        // `meta` wins over a revision listing.
        let revisions =
            !meta && (present.contains_key("revisions") || present.contains_key("versions"));
        // Singular `version` wins over singular `revision`.
        let version = present
            .get("version")
            .or_else(|| present.get("revision"))
            .filter(|v| !v.is_empty())
            .cloned();

        let truthy = |key: &str| {
            present
                .get(key)
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        Self {
            meta,
            revisions,
            version,
            zip: present.contains_key("zip"),
            direct: present.contains_key("direct"),
            kind: present.get("kind").cloned(),
            name: present.get("name").cloned(),
            display_name: present.get("displayName").cloned(),
            confirm_delete: truthy("confirm_delete"),
            conflict: present.get("conflict").filter(|v| !v.is_empty()).cloned(),
            cookie: present.get("cookie").filter(|v| !v.is_empty()).cloned(),
            view_only: present.get("view_only").filter(|v| !v.is_empty()).cloned(),
        }
    }
}

//! Descriptive tags attached to a dispatch request and forwarded, unmodified
//! and in order, to the remote backend.

use serde::{Deserialize, Serialize};

/// Tag name. Well-known names have a variant; anything else is carried
/// verbatim in [`MetaName::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetaName {
    /// KMS grant token authorizing the call.
    GrantToken,
    /// Any other backend-specific tag.
    Custom(String),
}

impl MetaName {
    /// Wire name of the tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::GrantToken => "grant-token",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for MetaName {
    fn from(s: String) -> Self {
        match s.as_str() {
            "grant-token" => Self::GrantToken,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for MetaName {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<MetaName> for String {
    fn from(name: MetaName) -> Self {
        match name {
            MetaName::GrantToken => "grant-token".to_string(),
            MetaName::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for MetaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single name/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Tag name.
    pub name: MetaName,
    /// Tag value.
    pub value: String,
}

impl Meta {
    /// Create a tag.
    pub fn new(name: impl Into<MetaName>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A grant-token tag.
    pub fn grant_token(token: impl Into<String>) -> Self {
        Self::new(MetaName::GrantToken, token)
    }

    /// Values of every tag named `name`, in order.
    pub fn values_of<'a>(tags: &'a [Meta], name: &'a MetaName) -> impl Iterator<Item = &'a str> {
        tags.iter()
            .filter(move |m| &m.name == name)
            .map(|m| m.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names_parse() {
        assert_eq!(MetaName::from("grant-token"), MetaName::GrantToken);
        assert_eq!(
            MetaName::from("tenant"),
            MetaName::Custom("tenant".to_string())
        );
    }

    #[test]
    fn tag_serde_uses_wire_names() {
        let tag = Meta::grant_token("gt-1");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, r#"{"name":"grant-token","value":"gt-1"}"#);
        let back: Meta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn values_of_preserves_order() {
        let tags = vec![
            Meta::grant_token("a"),
            Meta::new("tenant", "acme"),
            Meta::grant_token("b"),
        ];
        let tokens: Vec<&str> = Meta::values_of(&tags, &MetaName::GrantToken).collect();
        assert_eq!(tokens, vec!["a", "b"]);
    }
}

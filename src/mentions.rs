use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    Roles,
    Users,
    Everyone,
}

impl FromStr for MentionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roles" => Ok(Self::Roles),
            "users" => Ok(Self::Users),
            "everyone" => Ok(Self::Everyone),
            other => Err(
                ErrorKind::InvalidArgument(format!("unknown mention kind {:?}", other)).into(),
            ),
        }
    }
}

impl Display for MentionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            Self::Roles => f.write_str("roles"),
            Self::Users => f.write_str("users"),
            Self::Everyone => f.write_str("everyone"),
        }
    }
}

/// Structured mention suppression rules.
///
/// An empty `parse` list is meaningful: it suppresses every mention that is
/// not explicitly listed in `roles` or `users`, so it is always serialized.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AllowedMentions {
    #[serde(default)]
    pub parse: Vec<MentionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replied_user: bool,
}

impl AllowedMentions {
    /// Suppresses every mention.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_parse(kinds: impl IntoIterator<Item = MentionKind>) -> Self {
        Self {
            parse: kinds.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Normalizes the older flat list form, e.g. `["users", "roles"]`.
    pub fn from_legacy<I, S>(kinds: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parse = Vec::new();
        for kind in kinds {
            let kind = kind.as_ref().parse::<MentionKind>()?;
            if !parse.contains(&kind) {
                parse.push(kind);
            }
        }
        Ok(Self::with_parse(parse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_none_keeps_empty_parse() {
        let value = serde_json::to_value(AllowedMentions::none()).unwrap();
        assert_eq!(value, json!({"parse": []}));
    }

    #[test]
    fn test_structured_form() {
        let mentions = AllowedMentions {
            parse: vec![MentionKind::Users],
            roles: vec!["123".to_string()],
            users: vec![],
            replied_user: true,
        };
        assert_eq!(
            serde_json::to_value(mentions).unwrap(),
            json!({"parse": ["users"], "roles": ["123"], "replied_user": true})
        );
    }

    #[test]
    fn test_legacy_list_is_normalized() {
        let mentions = AllowedMentions::from_legacy(["users", "everyone", "users"]).unwrap();
        assert_eq!(mentions.parse, vec![MentionKind::Users, MentionKind::Everyone]);
        assert!(mentions.roles.is_empty());

        let err = AllowedMentions::from_legacy(["channels"]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn test_mention_kind_display_round_trips_through_from_str() {
        for kind in [MentionKind::Roles, MentionKind::Users, MentionKind::Everyone] {
            assert_eq!(kind.to_string().parse::<MentionKind>().unwrap(), kind);
        }
    }
}

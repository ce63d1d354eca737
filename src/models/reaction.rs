//! Reaction model
//!
//! A reaction is a signed vote (+1 like, -1 dislike) by one user on one
//! post or comment. At most one exists per (user, target type, target id).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity a reaction points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            _ => Err(format!("Invalid reaction target: {}", s)),
        }
    }
}

/// A reacted-to entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReactionTarget {
    pub target_type: TargetType,
    pub target_id: i64,
}

impl ReactionTarget {
    pub fn new(target_type: TargetType, target_id: i64) -> Self {
        Self {
            target_type,
            target_id,
        }
    }

    pub fn post(id: i64) -> Self {
        Self::new(TargetType::Post, id)
    }

    pub fn comment(id: i64) -> Self {
        Self::new(TargetType::Comment, id)
    }
}

/// Like or dislike, stored as +1 / -1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionValue {
    Like,
    Dislike,
}

impl ReactionValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Like => 1,
            Self::Dislike => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Like => Self::Dislike,
            Self::Dislike => Self::Like,
        }
    }
}

impl TryFrom<i64> for ReactionValue {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Like),
            -1 => Ok(Self::Dislike),
            _ => Err(format!("Invalid reaction value: {}", value)),
        }
    }
}

/// Stored reaction row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: i64,
    pub target: ReactionTarget,
    pub value: ReactionValue,
    pub created_at: DateTime<Utc>,
}

/// What a toggle did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionOutcome {
    /// No row existed; one was inserted
    Added,
    /// The same value was stored; the row was deleted
    Removed,
    /// The opposite value was stored; the row was updated
    Switched,
}

impl ReactionOutcome {
    /// Decide the toggle action from the stored and requested values
    pub fn decide(stored: Option<ReactionValue>, requested: ReactionValue) -> Self {
        match stored {
            None => Self::Added,
            Some(current) if current == requested => Self::Removed,
            Some(_) => Self::Switched,
        }
    }

    /// Value stored after applying this outcome
    pub fn resulting_value(&self, requested: ReactionValue) -> Option<ReactionValue> {
        match self {
            Self::Added | Self::Switched => Some(requested),
            Self::Removed => None,
        }
    }
}

/// Aggregated counts for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub likes: i64,
    pub dislikes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_target_type_parse() {
        assert_eq!(TargetType::from_str("post").unwrap(), TargetType::Post);
        assert_eq!(TargetType::from_str(" Comment ").unwrap(), TargetType::Comment);
        assert!(TargetType::from_str("user").is_err());
        assert!(TargetType::from_str("").is_err());
        assert_eq!(TargetType::Comment.to_string(), "comment");
    }

    #[test]
    fn test_reaction_value_conversion() {
        assert_eq!(ReactionValue::try_from(1).unwrap(), ReactionValue::Like);
        assert_eq!(ReactionValue::try_from(-1).unwrap(), ReactionValue::Dislike);
        assert!(ReactionValue::try_from(0).is_err());
        assert!(ReactionValue::try_from(2).is_err());
        assert_eq!(ReactionValue::Dislike.as_i64(), -1);
        assert_eq!(ReactionValue::Like.opposite(), ReactionValue::Dislike);
    }

    #[test]
    fn test_decision_table() {
        use ReactionValue::*;

        assert_eq!(ReactionOutcome::decide(None, Like), ReactionOutcome::Added);
        assert_eq!(ReactionOutcome::decide(None, Dislike), ReactionOutcome::Added);
        assert_eq!(ReactionOutcome::decide(Some(Like), Like), ReactionOutcome::Removed);
        assert_eq!(ReactionOutcome::decide(Some(Dislike), Dislike), ReactionOutcome::Removed);
        assert_eq!(ReactionOutcome::decide(Some(Like), Dislike), ReactionOutcome::Switched);
        assert_eq!(ReactionOutcome::decide(Some(Dislike), Like), ReactionOutcome::Switched);
    }

    #[test]
    fn test_resulting_value() {
        assert_eq!(
            ReactionOutcome::Switched.resulting_value(ReactionValue::Dislike),
            Some(ReactionValue::Dislike)
        );
        assert_eq!(ReactionOutcome::Removed.resulting_value(ReactionValue::Like), None);
    }
}

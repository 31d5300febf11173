//! Saved search (search folder) model and rule evaluation.
//!
//! # Responsibility
//! - Describe persisted saved searches as typed rule lists.
//! - Evaluate item membership against compiled rules.
//!
//! # Invariants
//! - A folder without rules matches no item.
//! - Title patterns are validated when compiled, never at match time.

use crate::model::item::Item;
use crate::model::node::NodeId;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned saved search identifier.
pub type SearchFolderId = i64;

/// One membership predicate over item state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchRule {
    Unread,
    Flagged,
    Updated,
    Feed { node_id: NodeId },
    TitleMatches { pattern: String },
}

/// Persisted saved search definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFolder {
    pub id: SearchFolderId,
    pub name: String,
    pub rules: Vec<SearchRule>,
    /// `true`: every rule must match. `false`: any rule may match.
    pub match_all: bool,
}

impl SearchFolder {
    /// Compiles rules into a matcher. Fails on blank names or bad patterns.
    pub fn compile(&self) -> Result<CompiledSearchFolder, SearchRuleError> {
        if self.name.trim().is_empty() {
            return Err(SearchRuleError::BlankName);
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            rules.push(compile_rule(rule)?);
        }

        Ok(CompiledSearchFolder {
            id: self.id,
            match_all: self.match_all,
            rules,
        })
    }
}

/// Saved search ready for per-item evaluation.
#[derive(Debug, Clone)]
pub struct CompiledSearchFolder {
    id: SearchFolderId,
    match_all: bool,
    rules: Vec<CompiledRule>,
}

impl CompiledSearchFolder {
    pub fn id(&self) -> SearchFolderId {
        self.id
    }

    /// Returns whether `item` belongs to this saved search.
    pub fn matches(&self, item: &Item) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        if self.match_all {
            self.rules.iter().all(|rule| rule.matches(item))
        } else {
            self.rules.iter().any(|rule| rule.matches(item))
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledRule {
    Unread,
    Flagged,
    Updated,
    Feed(NodeId),
    TitleMatches(Regex),
}

impl CompiledRule {
    fn matches(&self, item: &Item) -> bool {
        match self {
            Self::Unread => !item.read_status,
            Self::Flagged => item.flag_status,
            Self::Updated => item.update_status,
            Self::Feed(node_id) => item.node_id == *node_id,
            Self::TitleMatches(pattern) => pattern.is_match(&item.title),
        }
    }
}

fn compile_rule(rule: &SearchRule) -> Result<CompiledRule, SearchRuleError> {
    match rule {
        SearchRule::Unread => Ok(CompiledRule::Unread),
        SearchRule::Flagged => Ok(CompiledRule::Flagged),
        SearchRule::Updated => Ok(CompiledRule::Updated),
        SearchRule::Feed { node_id } => {
            let trimmed = node_id.trim();
            if trimmed.is_empty() {
                return Err(SearchRuleError::BlankNodeId);
            }
            Ok(CompiledRule::Feed(trimmed.to_string()))
        }
        SearchRule::TitleMatches { pattern } => RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(CompiledRule::TitleMatches)
            .map_err(|err| SearchRuleError::InvalidPattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            }),
    }
}

/// Saved search definition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRuleError {
    BlankName,
    BlankNodeId,
    InvalidPattern { pattern: String, message: String },
}

impl Display for SearchRuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "search folder name must not be blank"),
            Self::BlankNodeId => write!(f, "feed rule must name a node id"),
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid title pattern `{pattern}`: {message}")
            }
        }
    }
}

impl Error for SearchRuleError {}

#[cfg(test)]
mod tests {
    use super::{SearchFolder, SearchRule, SearchRuleError};
    use crate::model::item::Item;

    fn folder(rules: Vec<SearchRule>, match_all: bool) -> SearchFolder {
        SearchFolder {
            id: 1,
            name: "Saved".to_string(),
            rules,
            match_all,
        }
    }

    #[test]
    fn empty_rule_list_matches_nothing() {
        let compiled = folder(vec![], true).compile().unwrap();
        assert!(!compiled.matches(&Item::new("feed-a", "anything")));
    }

    #[test]
    fn match_all_requires_every_rule() {
        let compiled = folder(vec![SearchRule::Unread, SearchRule::Flagged], true)
            .compile()
            .unwrap();
        let mut item = Item::new("feed-a", "x");
        assert!(!compiled.matches(&item));
        item.flag_status = true;
        assert!(compiled.matches(&item));
        item.read_status = true;
        assert!(!compiled.matches(&item));
    }

    #[test]
    fn match_any_accepts_one_rule() {
        let compiled = folder(
            vec![
                SearchRule::Flagged,
                SearchRule::TitleMatches {
                    pattern: "^rust".to_string(),
                },
            ],
            false,
        )
        .compile()
        .unwrap();
        assert!(compiled.matches(&Item::new("feed-a", "Rust 2024 released")));
        assert!(!compiled.matches(&Item::new("feed-a", "Go 1.23 released")));
    }

    #[test]
    fn feed_rule_matches_owning_node() {
        let compiled = folder(
            vec![SearchRule::Feed {
                node_id: " feed-a ".to_string(),
            }],
            true,
        )
        .compile()
        .unwrap();
        assert!(compiled.matches(&Item::new("feed-a", "x")));
        assert!(!compiled.matches(&Item::new("feed-b", "x")));
    }

    #[test]
    fn compile_rejects_bad_pattern_and_blank_name() {
        let err = folder(
            vec![SearchRule::TitleMatches {
                pattern: "(".to_string(),
            }],
            true,
        )
        .compile()
        .unwrap_err();
        assert!(matches!(err, SearchRuleError::InvalidPattern { .. }));

        let mut unnamed = folder(vec![SearchRule::Unread], true);
        unnamed.name = "  ".to_string();
        assert_eq!(unnamed.compile().unwrap_err(), SearchRuleError::BlankName);
    }

    #[test]
    fn rules_use_tagged_json_shape() {
        let json = serde_json::to_string(&SearchRule::Feed {
            node_id: "n1".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"feed","node_id":"n1"}"#);
    }
}

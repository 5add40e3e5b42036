use std::collections::BTreeMap;

use crate::error::{AppError, Result};

const OR_SEPARATOR: &str = " OR ";

/// Immutable mapping of interest category to search keywords, most specific
/// keyword first.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    entries: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryQuery {
    pub category: String,
    pub query: String,
}

impl CategoryTable {
    pub fn new(categories: &BTreeMap<String, Vec<String>>) -> Self {
        let entries = categories
            .iter()
            .map(|(name, keywords)| {
                let keywords = keywords
                    .iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                (name.trim().to_string(), keywords)
            })
            .collect();
        Self { entries }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Canonical category name, matched case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(known, _)| known.as_str())
    }

    pub fn keywords(&self, name: &str) -> Option<&[String]> {
        let canonical = self.resolve(name)?;
        self.entries
            .iter()
            .find(|(known, _)| known == canonical)
            .map(|(_, keywords)| keywords.as_slice())
    }

    /// Canonicalize a selection, dropping duplicates but keeping the order of
    /// first appearance. Unknown names are a configuration error.
    pub fn normalize_selection(&self, selected: &[String]) -> Result<Vec<String>> {
        let mut normalized: Vec<String> = Vec::with_capacity(selected.len());
        for name in selected {
            let canonical = self.resolve(name).ok_or_else(|| {
                AppError::Config(format!(
                    "unknown category '{}' (known: {})",
                    name.trim(),
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })?;
            if !normalized.iter().any(|n| n == canonical) {
                normalized.push(canonical.to_string());
            }
        }
        Ok(normalized)
    }
}

/// Build one OR-joined query per distinct selected category, in selection
/// order. Trailing keywords are dropped until the query fits `max_len`.
pub fn build_queries(
    table: &CategoryTable,
    selected: &[String],
    max_len: usize,
) -> Result<Vec<CategoryQuery>> {
    let categories = table.normalize_selection(selected)?;

    categories
        .into_iter()
        .map(|category| {
            let keywords = table.keywords(&category).unwrap_or_default();
            let query = join_within(keywords, max_len).ok_or_else(|| {
                AppError::Config(format!(
                    "category '{}' has no keyword that fits the {}-character query limit",
                    category, max_len
                ))
            })?;
            Ok(CategoryQuery { category, query })
        })
        .collect()
}

fn join_within(keywords: &[String], max_len: usize) -> Option<String> {
    let mut query = String::new();
    for keyword in keywords {
        let term = quote_term(keyword);
        let extra = if query.is_empty() {
            term.len()
        } else {
            OR_SEPARATOR.len() + term.len()
        };
        if query.len() + extra > max_len {
            break;
        }
        if !query.is_empty() {
            query.push_str(OR_SEPARATOR);
        }
        query.push_str(&term);
    }
    (!query.is_empty()).then_some(query)
}

// Multi-word keywords are searched as exact phrases.
fn quote_term(keyword: &str) -> String {
    if keyword.contains(char::is_whitespace) {
        format!("\"{}\"", keyword.replace('"', ""))
    } else {
        keyword.to_string()
    }
}

//! Category model

use serde::{Deserialize, Serialize};

/// Category a post can be filed under. Created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Trim names, drop blanks and repeats, keep first-seen order
pub fn normalize_category_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || out.iter().any(|existing| existing == name) {
            continue;
        }
        out.push(name.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_category_names() {
        let names = normalize_category_names(["  rust ", "", "go", "rust", "   "]);
        assert_eq!(names, vec!["rust".to_string(), "go".to_string()]);
    }

    #[test]
    fn test_normalize_is_case_sensitive() {
        let names = normalize_category_names(vec!["Rust".to_string(), "rust".to_string()]);
        assert_eq!(names.len(), 2);
    }
}

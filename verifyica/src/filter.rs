// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Class-definition filtering: the filter-file grammar (spec. §6) and
//! tag/class-name regex evaluation (spec. §4.1 step 5).

use crate::errors::DiscoveryError;
use regex::Regex;

/// One parsed filter-file record.
#[derive(Debug, Clone)]
enum Rule {
    Include(Regex),
    Exclude(Regex),
}

/// A class filter assembled from a filter file and/or an explicit tag
/// filter.
///
/// A class is kept iff it matches at least one include (or no
/// includes exist) and matches no exclude; the tag filter is
/// evaluated the same way, over the class's tag set instead of its
/// name.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    name_rules: Vec<Rule>,
    tag_rules: Vec<Rule>,
}

impl ClassFilter {
    /// An empty filter: every class is kept.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the `INCLUDE CLASS_NAME <regex>` / `EXCLUDE CLASS_NAME
    /// <regex>` filter-file grammar.
    ///
    /// Blank lines and `#`-prefixed lines are comments. Every other
    /// line must be exactly `(INCLUDE|EXCLUDE) CLASS_NAME <regex>`.
    pub fn parse_filter_file(path: &str, contents: &str) -> Result<Self, DiscoveryError> {
        let mut filter = ClassFilter::default();
        for (index, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, char::is_whitespace);
            let verb = parts.next().unwrap_or_default();
            let rest = line[verb.len()..].trim_start();
            let mut rest_parts = rest.splitn(2, char::is_whitespace);
            let subject = rest_parts.next().unwrap_or_default();
            let pattern = rest_parts.next().unwrap_or_default().trim();

            if subject != "CLASS_NAME" || pattern.is_empty() {
                return Err(DiscoveryError::FilterParse {
                    path: path.to_string(),
                    line: index + 1,
                    message: format!("expected `INCLUDE CLASS_NAME <regex>` or `EXCLUDE CLASS_NAME <regex>`, got `{line}`"),
                });
            }
            let regex = Regex::new(pattern).map_err(|source| DiscoveryError::InvalidFilterRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            match verb {
                "INCLUDE" => filter.name_rules.push(Rule::Include(regex)),
                "EXCLUDE" => filter.name_rules.push(Rule::Exclude(regex)),
                other => {
                    return Err(DiscoveryError::FilterParse {
                        path: path.to_string(),
                        line: index + 1,
                        message: format!("unknown verb `{other}` (expected INCLUDE or EXCLUDE)"),
                    });
                }
            }
        }
        Ok(filter)
    }

    /// Adds a tag-based include/exclude pair evaluated against a
    /// class's tag set, using the same keep-iff rule as class-name
    /// filtering.
    pub fn with_tag_patterns(
        mut self,
        include: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<Self, DiscoveryError> {
        if let Some(pattern) = include {
            let regex = Regex::new(pattern).map_err(|source| DiscoveryError::InvalidFilterRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            self.tag_rules.push(Rule::Include(regex));
        }
        if let Some(pattern) = exclude {
            let regex = Regex::new(pattern).map_err(|source| DiscoveryError::InvalidFilterRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            self.tag_rules.push(Rule::Exclude(regex));
        }
        Ok(self)
    }

    /// Evaluates the keep-iff-included-and-not-excluded rule for `name`.
    pub fn keeps_class_name(&self, name: &str) -> bool {
        Self::evaluate(&self.name_rules, name)
    }

    /// Evaluates the keep-iff rule for a class's tag set: kept iff at
    /// least one tag matches an include pattern (or no include
    /// patterns exist) and no tag matches an exclude pattern.
    pub fn keeps_tags(&self, tags: &[String]) -> bool {
        let includes: Vec<_> = self.tag_rules.iter().filter_map(Rule::as_include).collect();
        let excludes: Vec<_> = self.tag_rules.iter().filter_map(Rule::as_exclude).collect();

        let included = includes.is_empty() || tags.iter().any(|t| includes.iter().any(|r| r.is_match(t)));
        let excluded = tags.iter().any(|t| excludes.iter().any(|r| r.is_match(t)));
        included && !excluded
    }

    fn evaluate(rules: &[Rule], subject: &str) -> bool {
        let includes: Vec<_> = rules.iter().filter_map(Rule::as_include).collect();
        let excludes: Vec<_> = rules.iter().filter_map(Rule::as_exclude).collect();
        let included = includes.is_empty() || includes.iter().any(|r| r.is_match(subject));
        let excluded = excludes.iter().any(|r| r.is_match(subject));
        included && !excluded
    }
}

impl Rule {
    fn as_include(&self) -> Option<&Regex> {
        match self {
            Rule::Include(r) => Some(r),
            Rule::Exclude(_) => None,
        }
    }

    fn as_exclude(&self) -> Option<&Regex> {
        match self {
            Rule::Exclude(r) => Some(r),
            Rule::Include(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = ClassFilter::empty();
        assert!(filter.keeps_class_name("anything.AtAll"));
    }

    #[test]
    fn parses_include_and_exclude_records_ignoring_comments_and_blanks() {
        let contents = "\n# a comment\nINCLUDE CLASS_NAME .*Test\nEXCLUDE CLASS_NAME .*Slow.*\n";
        let filter = ClassFilter::parse_filter_file("filters.txt", contents).unwrap();
        assert!(filter.keeps_class_name("com.example.FooTest"));
        assert!(!filter.keeps_class_name("com.example.SlowTest"));
        assert!(!filter.keeps_class_name("com.example.Foo"));
    }

    #[test]
    fn malformed_record_reports_line_number() {
        let contents = "INCLUDE CLASS_NAME .*Test\nBOGUS LINE HERE\n";
        let err = ClassFilter::parse_filter_file("filters.txt", contents).unwrap_err();
        match err {
            DiscoveryError::FilterParse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected FilterParse, got {other:?}"),
        }
    }

    #[test]
    fn tag_filter_keeps_iff_included_and_not_excluded() {
        let filter = ClassFilter::empty()
            .with_tag_patterns(Some("^fast$"), Some("^flaky$"))
            .unwrap();
        assert!(filter.keeps_tags(&["fast".to_string()]));
        assert!(!filter.keeps_tags(&["slow".to_string()]));
        assert!(!filter.keeps_tags(&["fast".to_string(), "flaky".to_string()]));
    }
}

//! Call-site scanner.
//!
//! Recognises translation calls of the shape
//! `_t('Namespace.Name', "Value"[, PRIORITY[, 'comment']])` in code and template
//! text alike. Quoting may use either quote character; whitespace and newlines
//! are allowed around every comma and parenthesis. Anything that does not fit
//! the grammar is skipped without error.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::ops::Range;

/// Double- or single-quoted literal allowing backslash escapes inside
const VALUE_LITERAL: &str = r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#;

/// Keys never contain escaped quotes
const KEY_LITERAL: &str = r#""[^"]*"|'[^']*'"#;

/// One call site as it appears in the text, quotes and separators included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch<'a> {
    /// Quoted key literal, e.g. `'MyModule.TITLE'`
    pub key: &'a str,
    /// Quoted value literal
    pub value: &'a str,
    /// Priority token with its leading comma, e.g. `, PR_MEDIUM`
    pub priority: Option<&'a str>,
    /// Quoted comment literal
    pub comment: Option<&'a str>,
    /// Byte range of the whole call site
    pub span: Range<usize>,
}

/// Matcher for call sites of one translation function
#[derive(Debug, Clone)]
pub struct CallSiteScanner {
    regex: Regex,
}

impl CallSiteScanner {
    /// Build a scanner for the given function name (e.g. `_t`)
    pub fn new(function: &str) -> Result<Self> {
        let pattern = format!(
            r#"(?s){name}\s*\(\s*({key})\s*,\s*({value})(\s*,\s*[^,)]*)?(\s*,\s*({value}))?\s*\)"#,
            name = regex::escape(function),
            key = KEY_LITERAL,
            value = VALUE_LITERAL,
        );
        let regex = Regex::new(&pattern)
            .with_context(|| format!("Invalid call-site pattern for function `{}`", function))?;
        Ok(Self { regex })
    }

    /// Lazily yield every non-overlapping call site in `text`, left to right.
    /// Once a call site is matched its span is never looked at again.
    pub fn scan<'t>(&'t self, text: &'t str) -> impl Iterator<Item = RawMatch<'t>> + 't {
        self.regex.captures_iter(text).filter_map(raw_match)
    }
}

fn raw_match(caps: Captures<'_>) -> Option<RawMatch<'_>> {
    let whole = caps.get(0)?;
    Some(RawMatch {
        key: caps.get(1)?.as_str(),
        value: caps.get(2)?.as_str(),
        priority: caps.get(3).map(|m| m.as_str()),
        comment: caps.get(5).map(|m| m.as_str()),
        span: whole.range(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scanner() -> CallSiteScanner {
        CallSiteScanner::new("_t").unwrap()
    }

    #[test]
    fn test_simple_call() {
        let s = scanner();
        let text = r#"<?php $title = _t('Page.TITLE', 'Title'); ?>"#;
        let matches: Vec<_> = s.scan(text).collect();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "'Page.TITLE'");
        assert_eq!(matches[0].value, "'Title'");
        assert_eq!(matches[0].priority, None);
        assert_eq!(matches[0].comment, None);
        assert_eq!(&text[matches[0].span.clone()], "_t('Page.TITLE', 'Title')");
    }

    #[test]
    fn test_priority_and_comment() {
        let s = scanner();
        let text = "_t(\n  \"CMSMain.SAVE\" ,\n  \"Save\",\n  PR_HIGH ,\n  'Button label'\n)";
        let m = s.scan(text).next().unwrap();

        assert_eq!(m.key, "\"CMSMain.SAVE\"");
        assert_eq!(m.value, "\"Save\"");
        assert_eq!(m.priority, Some(",\n  PR_HIGH "));
        assert_eq!(m.comment, Some("'Button label'"));
    }

    #[test]
    fn test_escaped_quotes_in_values() {
        let s = scanner();
        let text = r#"_t('A.B', 'It\'s here'); _t("A.C", "Say \"hi\"");"#;
        let values: Vec<_> = s.scan(text).map(|m| m.value).collect();

        assert_eq!(values, vec![r#"'It\'s here'"#, r#""Say \"hi\"""#]);
    }

    #[test]
    fn test_value_with_comma_and_paren() {
        let s = scanner();
        let m = s.scan("_t('A.B', 'one, two (three)')").next().unwrap();
        assert_eq!(m.value, "'one, two (three)'");
        assert_eq!(m.priority, None);
    }

    #[test]
    fn test_multiple_calls_in_order() {
        let s = scanner();
        let text = "_t('A.ONE','1') foo _t( 'A.TWO' , '2' ) bar _t('A.THREE', '3', 10)";
        let keys: Vec<_> = s.scan(text).map(|m| m.key).collect();
        assert_eq!(keys, vec!["'A.ONE'", "'A.TWO'", "'A.THREE'"]);
    }

    #[test]
    fn test_malformed_calls_are_skipped() {
        let s = scanner();
        let text = "_t('A.B', 'unterminated) _t('A.C') _t(A.D, 'x') _t('A.E', 'ok')";
        let keys: Vec<_> = s.scan(text).map(|m| m.key).collect();
        assert_eq!(keys, vec!["'A.E'"]);
    }

    #[test]
    fn test_custom_function_name_is_escaped() {
        let s = CallSiteScanner::new("i18n.t").unwrap();
        assert_eq!(s.scan("i18n.t('A.B', 'x')").count(), 1);
        assert_eq!(s.scan("i18nXt('A.B', 'x')").count(), 0);
    }

    #[test]
    fn test_template_syntax() {
        let s = scanner();
        let text = "<h1><% _t('TITLE', 'Welcome') %></h1>\n<p>$_t('Layout.INTRO',\"Intro\")</p>";
        let keys: Vec<_> = s.scan(text).map(|m| m.key).collect();
        assert_eq!(keys, vec!["'TITLE'", "'Layout.INTRO'"]);
    }
}

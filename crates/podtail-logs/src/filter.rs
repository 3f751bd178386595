use crossterm::style::ContentStyle;
use regex::Regex;

/// Line level include, exclude and highlight rules
#[derive(Clone, Default)]
pub struct LineFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,

    /// Include and highlight patterns joined into one alternation
    highlight: Option<Regex>,
}

impl LineFilter {
    /// Build a filter. Matches of `include` are highlighted as well as
    /// matches of `highlight`.
    pub fn new(
        include: Vec<Regex>,
        exclude: Vec<Regex>,
        highlight: Vec<Regex>,
    ) -> Result<Self, regex::Error> {
        let mut patterns: Vec<&str> = include
            .iter()
            .chain(highlight.iter())
            .map(Regex::as_str)
            .collect();

        let highlight = if patterns.is_empty() {
            None
        } else {
            // Prefer the longest match when patterns overlap
            patterns.sort_by_key(|p| std::cmp::Reverse(p.len()));
            Some(Regex::new(&format!("({})", patterns.join("|")))?)
        };

        Ok(Self {
            include,
            exclude,
            highlight,
        })
    }

    pub fn is_excluded(&self, line: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(line))
    }

    /// True when no include pattern is set or one of them matches
    pub fn is_included(&self, line: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(line))
    }

    pub fn accepts(&self, line: &str) -> bool {
        !self.is_excluded(line) && self.is_included(line)
    }

    /// Wrap every match in `style`
    pub fn highlight(&self, line: &str, style: ContentStyle) -> String {
        match &self.highlight {
            Some(re) => re
                .replace_all(line, |caps: &regex::Captures<'_>| {
                    style.apply(&caps[0]).to_string()
                })
                .into_owned(),
            None => line.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.highlight.is_none()
    }
}

fn patterns(res: &[Regex]) -> Vec<&str> {
    res.iter().map(Regex::as_str).collect()
}

impl std::fmt::Debug for LineFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFilter")
            .field("include", &patterns(&self.include))
            .field("exclude", &patterns(&self.exclude))
            .field("highlight", &self.highlight.as_ref().map(Regex::as_str))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::{Attribute, Color};

    fn regexes(patterns: &[&str]) -> Vec<Regex> {
        patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
    }

    fn red_bold() -> ContentStyle {
        let mut style = ContentStyle::new();
        style.foreground_color = Some(Color::DarkRed);
        style.attributes.set(Attribute::Bold);
        style
    }

    #[test]
    fn test_exclude() {
        let filter = LineFilter::new(vec![], regexes(&["DEBUG"]), vec![]).unwrap();
        assert!(filter.is_excluded("DEBUG connecting"));
        assert!(!filter.is_excluded("INFO connected"));
        assert!(!filter.accepts("DEBUG connecting"));
    }

    #[test]
    fn test_include_any() {
        let filter = LineFilter::new(regexes(&["error", "panic"]), vec![], vec![]).unwrap();
        assert!(filter.is_included("an error occurred"));
        assert!(filter.is_included("panic: oops"));
        assert!(!filter.is_included("all good"));

        let empty = LineFilter::default();
        assert!(empty.is_included("anything"));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = LineFilter::new(regexes(&["error"]), regexes(&["ignored"]), vec![]).unwrap();
        assert!(!filter.accepts("ignored error"));
        assert!(filter.accepts("real error"));
    }

    #[test]
    fn test_highlight_prefers_longer_pattern() {
        let style = red_bold();
        let filter = LineFilter::new(vec![], vec![], regexes(&["err", "error"])).unwrap();
        let out = filter.highlight("an error here", style);
        let expected = format!("an {} here", style.apply("error"));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_highlight_covers_include_patterns() {
        let style = red_bold();
        let filter = LineFilter::new(regexes(&["warn"]), vec![], regexes(&["disk"])).unwrap();
        let out = filter.highlight("warn: disk full", style);
        let expected = format!("{}: {} full", style.apply("warn"), style.apply("disk"));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_debug_lists_patterns() {
        let filter = LineFilter::new(regexes(&["ERROR"]), regexes(&["DEBUG", "TRACE"]), vec![])
            .unwrap();
        let debug = format!("{filter:?}");
        assert!(debug.contains(r#"include: ["ERROR"]"#), "{debug}");
        assert!(debug.contains(r#"exclude: ["DEBUG", "TRACE"]"#), "{debug}");
    }

    #[test]
    fn test_highlight_without_patterns_is_identity() {
        let filter = LineFilter::default();
        assert_eq!(filter.highlight("plain line", red_bold()), "plain line");
    }
}

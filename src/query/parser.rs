use super::filters::{Span, parse_date, parse_size};
use super::options::MatchOptions;
use crate::error::SyntaxError;
use crate::store::{Attributes, EntryKind};

/// How a term's text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    /// Substring match
    Plain,
    /// Quoted text: no wildcards, operators or spaces interpreted
    Phrase,
    /// Contains `*` or `?`; matches the whole subject
    Wildcard,
    Regex,
}

/// A text predicate with the options in force where it appeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub text: String,
    pub kind: TermKind,
    pub options: MatchOptions,
    /// Character offset of the term in the query
    pub position: usize,
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    /// Matches every entry (`*` or an empty query)
    All,
    Term(Term),
    /// `ext:a;b`
    Extension { exts: Vec<String>, match_case: bool },
    Size(Span<u64>),
    Modified(Span<i64>),
    Created(Span<i64>),
    Kind(EntryKind),
    /// Direct children of the folder at this path
    Parent(String),
    /// Entries carrying every one of these attributes
    Attrib(Attributes),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

/// Recursion limit shared by groups, `!` chains and modifiers
const MAX_NESTING: usize = 256;

/// Parse a search string. `now` (Unix seconds) anchors relative dates.
pub fn parse_query(input: &str, options: &MatchOptions, now: i64) -> Result<QueryNode, SyntaxError> {
    QueryParser::new(input, *options, now).parse()
}

struct QueryParser {
    chars: Vec<char>,
    pos: usize,
    /// Options for the term being parsed; modifiers change them temporarily
    options: MatchOptions,
    /// Operator rules follow the query-wide regex switch
    regex_mode: bool,
    depth: usize,
    /// Active `parse_unary`/`parse_primary` frames
    nesting: usize,
    now: i64,
}

impl QueryParser {
    fn new(input: &str, options: MatchOptions, now: i64) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            options,
            regex_mode: options.regex,
            depth: 0,
            nesting: 0,
            now,
        }
    }

    fn parse(&mut self) -> Result<QueryNode, SyntaxError> {
        let node = self.parse_and()?;
        self.skip_whitespace();
        if !self.is_eof() {
            return Err(self.error("unbalanced parenthesis"));
        }
        Ok(node)
    }

    /// Whitespace-separated sequence; binds loosest
    fn parse_and(&mut self) -> Result<QueryNode, SyntaxError> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            if self.is_eof() || self.at_group_close() {
                break;
            }
            if self.at_or() {
                return Err(self.error("'|' has no left operand"));
            }
            nodes.push(self.parse_or()?);
        }

        match nodes.len() {
            0 if self.depth > 0 && self.is_eof() => Err(self.error("unbalanced parenthesis")),
            0 if self.depth > 0 => Err(self.error("empty group")),
            0 => Ok(QueryNode::All),
            1 => Ok(nodes.remove(0)),
            _ => Ok(QueryNode::And(nodes)),
        }
    }

    fn parse_or(&mut self) -> Result<QueryNode, SyntaxError> {
        let mut nodes = vec![self.parse_unary()?];

        loop {
            let save = self.pos;
            self.skip_whitespace();
            if !self.at_or() {
                self.pos = save;
                break;
            }
            self.advance();
            self.skip_whitespace();
            if self.is_eof() || self.at_group_close() || self.at_or() {
                return Err(self.error("'|' has no right operand"));
            }
            nodes.push(self.parse_unary()?);
        }

        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(QueryNode::Or(nodes))
        }
    }

    fn parse_unary(&mut self) -> Result<QueryNode, SyntaxError> {
        self.nested(Self::unary)
    }

    fn parse_primary(&mut self) -> Result<QueryNode, SyntaxError> {
        self.nested(Self::primary)
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<QueryNode, SyntaxError>,
    ) -> Result<QueryNode, SyntaxError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.nesting += 1;
        let node = parse(self);
        self.nesting -= 1;
        node
    }

    fn unary(&mut self) -> Result<QueryNode, SyntaxError> {
        if self.at_not() {
            self.advance();
            if self.regex_mode {
                self.skip_whitespace();
            }
            if self.missing_operand() {
                return Err(self.error("'!' has no operand"));
            }
            let inner = self.parse_unary()?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn primary(&mut self) -> Result<QueryNode, SyntaxError> {
        if !self.regex_mode {
            match self.peek_char() {
                Some('(') => {
                    self.advance();
                    self.depth += 1;
                    let node = self.parse_and()?;
                    self.skip_whitespace();
                    if self.peek_char() != Some(')') {
                        return Err(self.error("unbalanced parenthesis"));
                    }
                    self.advance();
                    self.depth -= 1;
                    return Ok(node);
                }
                Some(')') => return Err(self.error("unbalanced parenthesis")),
                _ => {}
            }
        }

        if self.peek_char() == Some('"') {
            let start = self.pos;
            let text = self.read_quoted();
            let kind = if self.options.regex { TermKind::Regex } else { TermKind::Phrase };
            return Ok(self.term(text, kind, start));
        }

        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<QueryNode, SyntaxError> {
        let start = self.pos;

        // Property prefix
        while self.peek_char().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
        if self.pos > start && self.peek_char() == Some(':') {
            let key: String = self.chars[start..self.pos].iter().collect();
            let is_drive = key.len() == 1 && matches!(self.char_at(self.pos + 1), Some('\\' | '/'));
            if !is_drive {
                self.advance();
                match self.parse_property(&key.to_ascii_lowercase())? {
                    Some(node) => return Ok(node),
                    None if self.options.regex => {}
                    None => {
                        return Err(SyntaxError::new(start, format!("unknown property '{key}:'")));
                    }
                }
            }
        }

        self.pos = start;
        let text = self.read_word();
        let kind = if self.options.regex {
            TermKind::Regex
        } else if text.contains(['*', '?']) {
            TermKind::Wildcard
        } else {
            TermKind::Plain
        };
        Ok(self.term(text, kind, start))
    }

    /// `None` for an unknown key
    fn parse_property(&mut self, key: &str) -> Result<Option<QueryNode>, SyntaxError> {
        let node = match key {
            "ext" => {
                let (value, at) = self.read_value()?;
                let exts: Vec<String> = value
                    .split([';', ','])
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(|e| e.trim_start_matches('.').to_string())
                    .collect();
                if exts.is_empty() {
                    return Err(SyntaxError::new(at, "missing extension"));
                }
                QueryNode::Extension {
                    exts,
                    match_case: self.options.match_case,
                }
            }
            "size" => {
                let (value, at) = self.read_value()?;
                QueryNode::Size(parse_size(&value).map_err(|r| SyntaxError::new(at, r))?)
            }
            "dm" | "datemodified" => {
                let (value, at) = self.read_value()?;
                QueryNode::Modified(parse_date(&value, self.now).map_err(|r| SyntaxError::new(at, r))?)
            }
            "dc" | "datecreated" => {
                let (value, at) = self.read_value()?;
                QueryNode::Created(parse_date(&value, self.now).map_err(|r| SyntaxError::new(at, r))?)
            }
            "file" | "files" => self.kind_filter(EntryKind::File)?,
            "folder" | "folders" => self.kind_filter(EntryKind::Folder)?,
            "parent" => {
                let (value, _) = self.read_value()?;
                QueryNode::Parent(value)
            }
            "attrib" | "attributes" => {
                let (value, at) = self.read_value()?;
                let attributes = Attributes::from_letters(&value)
                    .ok_or_else(|| SyntaxError::new(at, format!("invalid attribute letters '{value}'")))?;
                QueryNode::Attrib(attributes)
            }
            "case" => self.with_modifier(|o| o.match_case = true)?,
            "nocase" => self.with_modifier(|o| o.match_case = false)?,
            "ww" | "wholeword" => self.with_modifier(|o| o.match_whole_word = true)?,
            "noww" | "nowholeword" => self.with_modifier(|o| o.match_whole_word = false)?,
            "regex" => self.with_modifier(|o| o.regex = true)?,
            "path" => self.with_modifier(|o| o.match_path = true)?,
            "nopath" => self.with_modifier(|o| o.match_path = false)?,
            "diacritics" => self.with_modifier(|o| o.match_diacritics = true)?,
            "nodiacritics" => self.with_modifier(|o| o.match_diacritics = false)?,
            "prefix" => self.with_modifier(|o| o.match_prefix = true)?,
            "suffix" => self.with_modifier(|o| o.match_suffix = true)?,
            _ => return Ok(None),
        };
        Ok(Some(node))
    }

    /// `file:` alone, or `file:value` meaning files whose name matches
    fn kind_filter(&mut self, kind: EntryKind) -> Result<QueryNode, SyntaxError> {
        if self.is_eof() || self.at_token_end() {
            return Ok(QueryNode::Kind(kind));
        }
        let inner = self.parse_primary()?;
        Ok(QueryNode::And(vec![QueryNode::Kind(kind), inner]))
    }

    /// Parse what follows a modifier with the modified options
    fn with_modifier(
        &mut self,
        modify: impl FnOnce(&mut MatchOptions),
    ) -> Result<QueryNode, SyntaxError> {
        self.skip_whitespace();
        if self.is_eof() || self.at_group_close() || self.at_or() {
            return Err(SyntaxError::new(self.pos, "modifier has nothing to apply to"));
        }
        let saved = self.options;
        modify(&mut self.options);
        let node = self.parse_unary();
        self.options = saved;
        node
    }

    fn term(&self, text: String, kind: TermKind, position: usize) -> QueryNode {
        QueryNode::Term(Term {
            text,
            kind,
            options: self.options,
            position,
        })
    }

    /// Value of a `key:value` filter, with the offset it starts at
    fn read_value(&mut self) -> Result<(String, usize), SyntaxError> {
        let at = self.pos;
        let value = if self.peek_char() == Some('"') {
            self.read_quoted()
        } else {
            self.read_word()
        };
        if value.is_empty() {
            return Err(SyntaxError::new(at, "missing value"));
        }
        Ok((value, at))
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        while !self.is_eof() && !self.at_token_end() {
            self.advance();
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Text between double quotes; an unterminated quote runs to the end
    fn read_quoted(&mut self) -> String {
        self.advance();
        let start = self.pos;
        while !self.is_eof() && self.peek_char() != Some('"') {
            self.advance();
        }
        let text = self.chars[start..self.pos].iter().collect();
        if self.peek_char() == Some('"') {
            self.advance();
        }
        text
    }

    fn at_token_end(&self) -> bool {
        match self.peek_char() {
            None => true,
            Some(c) if c.is_whitespace() => true,
            Some(')') => self.depth > 0 || !self.regex_mode,
            Some('|' | '(' | '"') => !self.regex_mode && !self.options.regex,
            Some(_) => false,
        }
    }

    /// Nothing an operator could apply to starts here
    fn missing_operand(&self) -> bool {
        match self.peek_char() {
            None => true,
            Some(c) if c.is_whitespace() => true,
            Some('|') => self.at_or(),
            Some(')') => !self.regex_mode,
            Some(_) => false,
        }
    }

    fn at_group_close(&self) -> bool {
        self.depth > 0 && self.peek_char() == Some(')')
    }

    fn at_or(&self) -> bool {
        self.peek_char() == Some('|') && (!self.regex_mode || self.is_standalone(self.pos))
    }

    fn at_not(&self) -> bool {
        match self.peek_char() {
            Some('!') => !self.regex_mode || self.is_standalone(self.pos),
            Some('-') => !self.regex_mode,
            _ => false,
        }
    }

    /// A one-character token surrounded by whitespace or the input edges
    fn is_standalone(&self, at: usize) -> bool {
        self.char_at(at + 1).is_none_or(char::is_whitespace)
    }

    fn error(&self, reason: &str) -> SyntaxError {
        SyntaxError::new(self.pos, reason)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn char_at(&self, at: usize) -> Option<char> {
        self.chars.get(at).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;

    const NOW: i64 = 1_710_504_000;

    fn parse(input: &str) -> QueryNode {
        parse_query(input, &MatchOptions::default(), NOW).unwrap()
    }

    fn parse_err(input: &str) -> SyntaxError {
        parse_query(input, &MatchOptions::default(), NOW).unwrap_err()
    }

    fn term_text(node: &QueryNode) -> &str {
        match node {
            QueryNode::Term(t) => &t.text,
            other => panic!("expected term, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_query_is_all() {
        assert_eq!(parse(""), QueryNode::All);
        assert_eq!(parse("   "), QueryNode::All);
    }

    #[test]
    fn test_simple_literal() {
        let node = parse("foo");
        assert_eq!(term_text(&node), "foo");
        assert!(matches!(node, QueryNode::Term(Term { kind: TermKind::Plain, position: 0, .. })));
    }

    #[test]
    fn test_and_terms() {
        let QueryNode::And(nodes) = parse("foo bar") else {
            panic!("expected And");
        };
        assert_eq!(nodes.len(), 2);
        assert_eq!(term_text(&nodes[1]), "bar");
    }

    #[test]
    fn test_or_binds_tighter_than_and() {
        let QueryNode::And(nodes) = parse("a b|c") else {
            panic!("expected And");
        };
        assert_eq!(term_text(&nodes[0]), "a");
        let QueryNode::Or(alts) = &nodes[1] else {
            panic!("expected Or");
        };
        assert_eq!(alts.len(), 2);
    }

    #[test]
    fn test_or_with_spaces() {
        assert!(matches!(parse("a | b"), QueryNode::Or(ref v) if v.len() == 2));
    }

    #[test]
    fn test_not_forms() {
        assert!(matches!(parse("!foo"), QueryNode::Not(_)));
        assert!(matches!(parse("-foo"), QueryNode::Not(_)));
    }

    #[test]
    fn test_not_group() {
        let QueryNode::Not(inner) = parse("!(a b)") else {
            panic!("expected Not");
        };
        assert!(matches!(*inner, QueryNode::And(_)));
    }

    #[test]
    fn test_group() {
        let QueryNode::And(nodes) = parse("(a|b) c") else {
            panic!("expected And");
        };
        assert!(matches!(nodes[0], QueryNode::Or(_)));
    }

    #[test]
    fn test_quoted_phrase_keeps_operators() {
        let node = parse("\"a | b*\"");
        assert_eq!(term_text(&node), "a | b*");
        assert!(matches!(node, QueryNode::Term(Term { kind: TermKind::Phrase, .. })));
    }

    #[test]
    fn test_wildcard_term() {
        assert!(matches!(parse("*.txt"), QueryNode::Term(Term { kind: TermKind::Wildcard, .. })));
    }

    #[test]
    fn test_ext_list() {
        assert_eq!(
            parse("ext:txt;.CFG,ini"),
            QueryNode::Extension {
                exts: vec!["txt".into(), "CFG".into(), "ini".into()],
                match_case: false
            }
        );
    }

    #[test]
    fn test_size_filter() {
        assert_eq!(parse("size:>1kb"), QueryNode::Size((Bound::Excluded(1024), Bound::Unbounded)));
    }

    #[test]
    fn test_date_filters() {
        assert!(matches!(parse("dm:today"), QueryNode::Modified(_)));
        assert!(matches!(parse("datecreated:2024-01-01"), QueryNode::Created(_)));
    }

    #[test]
    fn test_kind_filters() {
        assert_eq!(parse("files:"), QueryNode::Kind(EntryKind::File));
        assert_eq!(parse("folder:"), QueryNode::Kind(EntryKind::Folder));
        let QueryNode::And(nodes) = parse("file:report") else {
            panic!("expected And");
        };
        assert_eq!(nodes[0], QueryNode::Kind(EntryKind::File));
        assert_eq!(term_text(&nodes[1]), "report");
    }

    #[test]
    fn test_parent_and_attrib() {
        assert_eq!(parse("parent:/vol/docs"), QueryNode::Parent("/vol/docs".into()));
        assert_eq!(parse("parent:\"/vol/my docs\""), QueryNode::Parent("/vol/my docs".into()));
        assert_eq!(
            parse("attrib:rh"),
            QueryNode::Attrib(Attributes(Attributes::READONLY | Attributes::HIDDEN))
        );
    }

    #[test]
    fn test_modifier_applies_to_next_term_only() {
        let QueryNode::And(nodes) = parse("case:Foo bar") else {
            panic!("expected And");
        };
        let (QueryNode::Term(a), QueryNode::Term(b)) = (&nodes[0], &nodes[1]) else {
            panic!("expected terms");
        };
        assert_eq!(a.text, "Foo");
        assert!(a.options.match_case);
        assert!(!b.options.match_case);
    }

    #[test]
    fn test_modifier_reaches_ext() {
        assert_eq!(
            parse("case:ext:TXT"),
            QueryNode::Extension {
                exts: vec!["TXT".into()],
                match_case: true
            }
        );
    }

    #[test]
    fn test_drive_path_is_a_term() {
        assert_eq!(term_text(&parse("c:\\windows")), "c:\\windows");
        assert_eq!(term_text(&parse("d:/data")), "d:/data");
    }

    #[test]
    fn test_unbalanced_open_paren_position() {
        let err = parse_err("(");
        assert_eq!(err.position, 1);
    }

    #[test]
    fn test_unbalanced_close_paren() {
        assert_eq!(parse_err("a)").position, 1);
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let groups = format!("{}a{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(parse_err(&groups).reason, "nesting too deep");

        let nots = format!("{}a", "!".repeat(100_000));
        assert_eq!(parse_err(&nots).reason, "nesting too deep");

        let modifiers = format!("{}a", "case:".repeat(10_000));
        assert_eq!(parse_err(&modifiers).reason, "nesting too deep");
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let groups = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(parse(&groups), QueryNode::Term(ref t) if t.text == "a"));
    }

    #[test]
    fn test_empty_group() {
        let err = parse_err("()");
        assert_eq!(err.position, 1);
        assert_eq!(err.reason, "empty group");
    }

    #[test]
    fn test_unknown_property() {
        let err = parse_err("foo bogus:1");
        assert_eq!(err.position, 4);
        assert!(err.reason.contains("bogus"));
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert_eq!(parse_err("size:").position, 5);
        assert_eq!(parse_err("ext:").position, 4);
        assert_eq!(parse_err("dm:someday").position, 3);
        assert_eq!(parse_err("attrib:q").position, 7);
    }

    #[test]
    fn test_dangling_operators() {
        assert!(parse_err("a |").reason.contains("right operand"));
        assert!(parse_err("| a").reason.contains("left operand"));
        assert!(parse_err("!").reason.contains("no operand"));
    }

    #[test]
    fn test_regex_mode_terms() {
        let options = MatchOptions {
            regex: true,
            ..Default::default()
        };
        let node = parse_query("^a(b|c)$ | x!", &options, NOW).unwrap();
        let QueryNode::Or(alts) = node else {
            panic!("expected Or");
        };
        assert_eq!(term_text(&alts[0]), "^a(b|c)$");
        assert!(matches!(&alts[0], QueryNode::Term(Term { kind: TermKind::Regex, .. })));
        assert_eq!(term_text(&alts[1]), "x!");
    }

    #[test]
    fn test_regex_mode_unknown_key_is_pattern() {
        let options = MatchOptions {
            regex: true,
            ..Default::default()
        };
        let node = parse_query("foo:bar ! ext:txt", &options, NOW).unwrap();
        let QueryNode::And(nodes) = node else {
            panic!("expected And");
        };
        assert_eq!(term_text(&nodes[0]), "foo:bar");
        assert!(matches!(&nodes[1], QueryNode::Not(inner) if matches!(**inner, QueryNode::Extension { .. })));
    }
}

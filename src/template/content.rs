//! Text content as an ordered list of literal and field tokens.
//!
//! On the wire a text element carries a plain string; every `{{name}}`
//! occurrence becomes a [`Token::Field`] on load and is printed back
//! unchanged on save. Keeping field references structural means a literal
//! that happens to equal a data value is never mistaken for a binding.
//!
//! ```
//! use certforge::template::{TextContent, Token};
//!
//! let content = TextContent::parse("Awarded to {{name}}");
//! assert_eq!(content.tokens(), &[
//!     Token::Literal("Awarded to ".into()),
//!     Token::Field("name".into()),
//! ]);
//! assert_eq!(content.to_source(), "Awarded to {{name}}");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One piece of text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Field(String),
}

/// Ordered token list. Adjacent literals are always merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextContent {
    tokens: Vec<Token>,
}

/// The canonical placeholder form of a field reference.
pub fn placeholder(field: &str) -> String {
    format!("{{{{{}}}}}", field)
}

/// Field names accept anything except braces; surrounding whitespace is trimmed.
fn valid_field_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('{') && !name.contains('}')
}

impl TextContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content consisting of one literal string (no field parsing).
    pub fn literal(text: impl Into<String>) -> Self {
        let mut content = Self::new();
        content.push_literal(&text.into());
        content
    }

    /// Content consisting of a single field reference.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            tokens: vec![Token::Field(name.into())],
        }
    }

    /// Parse `{{name}}` references out of a source string.
    ///
    /// Unterminated or empty braces stay literal.
    pub fn parse(source: &str) -> Self {
        let mut content = Self::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let name = after[..end].trim();
            if valid_field_name(name) {
                content.push_literal(&rest[..start]);
                content.tokens.push(Token::Field(name.to_string()));
            } else {
                content.push_literal(&rest[..start + 2 + end + 2]);
            }
            rest = &after[end + 2..];
        }
        content.push_literal(rest);
        content
    }

    /// Print back to the wire form.
    pub fn to_source(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Literal(s) => s.clone(),
                Token::Field(f) => placeholder(f),
            })
            .collect()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Append literal text, merging with a trailing literal.
    pub fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Token::Literal(last)) = self.tokens.last_mut() {
            last.push_str(text);
        } else {
            self.tokens.push(Token::Literal(text.to_string()));
        }
    }

    pub fn push_field(&mut self, name: impl Into<String>) {
        self.tokens.push(Token::Field(name.into()));
    }

    /// Field names referenced, in order of first appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for token in &self.tokens {
            if let Token::Field(f) = token
                && !seen.contains(&f.as_str())
            {
                seen.push(f);
            }
        }
        seen
    }

    pub fn references(&self, field: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Field(f) if f == field))
    }

    /// Render with a resolver for field tokens.
    pub fn render_with(&self, mut resolve: impl FnMut(&str) -> String) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Field(f) => out.push_str(&resolve(f)),
            }
        }
        out
    }

    /// Replace every literal occurrence of `value` with a `field` token.
    ///
    /// Returns the number of replacements. Empty values never match.
    pub fn replace_literal_with_field(&mut self, value: &str, field: &str) -> usize {
        if value.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut rebuilt = TextContent::new();
        for token in std::mem::take(&mut self.tokens) {
            match token {
                Token::Literal(s) => {
                    let mut pieces = s.split(value).peekable();
                    while let Some(piece) = pieces.next() {
                        rebuilt.push_literal(piece);
                        if pieces.peek().is_some() {
                            rebuilt.push_field(field);
                            count += 1;
                        }
                    }
                }
                field_token => rebuilt.tokens.push(field_token),
            }
        }
        *self = rebuilt;
        count
    }

    /// Replace every reference to `field` with literal text.
    pub fn replace_field_with_literal(&mut self, field: &str, text: &str) {
        let mut rebuilt = TextContent::new();
        for token in std::mem::take(&mut self.tokens) {
            match token {
                Token::Field(f) if f == field => rebuilt.push_literal(text),
                Token::Literal(s) => rebuilt.push_literal(&s),
                other => rebuilt.tokens.push(other),
            }
        }
        *self = rebuilt;
    }
}

impl Serialize for TextContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_source())
    }
}

impl<'de> Deserialize<'de> for TextContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Ok(TextContent::parse(&source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_literal() {
        let c = TextContent::parse("Certificate of Completion");
        assert_eq!(
            c.tokens(),
            &[Token::Literal("Certificate of Completion".into())]
        );
    }

    #[test]
    fn test_parse_mixed_tokens() {
        let c = TextContent::parse("{{name}} completed {{ course }}!");
        assert_eq!(
            c.tokens(),
            &[
                Token::Field("name".into()),
                Token::Literal(" completed ".into()),
                Token::Field("course".into()),
                Token::Literal("!".into()),
            ]
        );
        // Whitespace inside braces is normalized away on print
        assert_eq!(c.to_source(), "{{name}} completed {{course}}!");
    }

    #[test]
    fn test_parse_malformed_braces_stay_literal() {
        for src in ["{{", "{{}}", "a {{b", "{{a{b}}", "}}x{{"] {
            let c = TextContent::parse(src);
            assert!(c.fields().is_empty(), "{:?} parsed a field", src);
            assert_eq!(c.to_source(), src);
        }
    }

    #[test]
    fn test_empty_source() {
        let c = TextContent::parse("");
        assert!(c.is_empty());
        assert_eq!(c.to_source(), "");
    }

    #[test]
    fn test_fields_dedup_in_order() {
        let c = TextContent::parse("{{b}} {{a}} {{b}}");
        assert_eq!(c.fields(), vec!["b", "a"]);
    }

    #[test]
    fn test_replace_literal_with_field() {
        let mut c = TextContent::literal("Grace Hopper");
        assert_eq!(c.replace_literal_with_field("Grace Hopper", "name"), 1);
        assert_eq!(c, TextContent::field("name"));

        let mut c = TextContent::literal("To Ada, from Ada");
        assert_eq!(c.replace_literal_with_field("Ada", "name"), 2);
        assert_eq!(c.to_source(), "To {{name}}, from {{name}}");
    }

    #[test]
    fn test_replace_empty_value_is_noop() {
        let mut c = TextContent::literal("abc");
        assert_eq!(c.replace_literal_with_field("", "name"), 0);
        assert_eq!(c.to_source(), "abc");
    }

    #[test]
    fn test_replace_field_with_literal_merges() {
        let mut c = TextContent::parse("Hello {{name}}!");
        c.replace_field_with_literal("name", "Ada");
        assert_eq!(c.tokens(), &[Token::Literal("Hello Ada!".into())]);
    }

    #[test]
    fn test_serde_as_string() {
        let c = TextContent::parse("Hi {{name}}");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#""Hi {{name}}""#);
        let back: TextContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}

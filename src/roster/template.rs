//! Prompt templates with `{placeholder}` slots.
//!
//! Templates are parsed once at construction. Values are substituted
//! verbatim during rendering and never re-scanned, so braces inside a
//! medical report cannot be mistaken for placeholders.

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A named, immutable prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    body: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template body.
    ///
    /// `{ident}` where `ident` is made of ASCII alphanumerics or `_` is a
    /// placeholder; any other brace is literal text.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Result<Self, TemplateError> {
        let name = name.into();
        let body = body.into();
        let segments = parse(&name, &body)?;
        Ok(Self {
            name,
            body,
            segments,
        })
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(p) = segment {
                if !names.contains(&p.as_str()) {
                    names.push(p);
                }
            }
        }
        names
    }

    /// Fail unless the template references `placeholder`.
    pub fn require(&self, placeholder: &str) -> Result<(), TemplateError> {
        if self.placeholders().contains(&placeholder) {
            Ok(())
        } else {
            Err(TemplateError::MissingPlaceholder {
                template: self.name.clone(),
                placeholder: placeholder.to_string(),
            })
        }
    }

    /// Fail if the template uses a placeholder outside `known`.
    pub fn check_placeholders(&self, known: &[&str]) -> Result<(), TemplateError> {
        match self.placeholders().into_iter().find(|p| !known.contains(p)) {
            Some(unknown) => Err(TemplateError::MissingValue {
                template: self.name.clone(),
                placeholder: unknown.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Substitute every placeholder from `values`.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.body.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    let value = values
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| TemplateError::MissingValue {
                            template: self.name.clone(),
                            placeholder: key.clone(),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse(name: &str, body: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let ident_len = after.find(|c: char| !is_ident(c)).unwrap_or(after.len());

        if ident_len > 0 && after[ident_len..].starts_with('}') {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(after[..ident_len].to_string()));
            rest = &after[ident_len + 1..];
        } else if ident_len > 0 && ident_len == after.len() {
            return Err(TemplateError::Unterminated {
                template: name.to_string(),
            });
        } else {
            literal.push('{');
            rest = after;
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

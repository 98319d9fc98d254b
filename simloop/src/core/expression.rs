//! Tokenizer for staging path expressions.
//!
//! An expression is either `<path>` or `<source> > <target>`. The placeholder,
//! if any, is the first `/`-separated segment of whichever side starts with `$`.

/// Leading placeholder text and its byte offset in the original expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingToken<'a> {
    pub text: &'a str,
    pub offset: usize,
}

/// Result of splitting one expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedExpression<'a> {
    /// `None` means the expression is a literal.
    pub token: Option<LeadingToken<'a>>,
    /// Trimmed text left of the first `>` (the whole expression otherwise).
    pub source: &'a str,
    /// Trimmed text right of the first `>`, if present.
    pub target: Option<&'a str>,
}

impl ParsedExpression<'_> {
    pub fn is_literal(&self) -> bool {
        self.token.is_none()
    }

    pub fn has_explicit_target(&self) -> bool {
        self.target.is_some()
    }
}

/// Split `expression` into source/target and locate its leading placeholder.
///
/// Expressions without `$` are literal. With a `>`, the source side is checked
/// first, then the target side.
pub fn parse(expression: &str) -> ParsedExpression<'_> {
    let split = expression.split_once('>');
    let (source, target) = match split {
        Some((source, target)) => (source.trim(), Some(target.trim())),
        None => (expression.trim(), None),
    };

    if !expression.contains('$') {
        return ParsedExpression {
            token: None,
            source,
            target,
        };
    }

    let token = match split {
        None => leading_token(expression.trim(), leading_whitespace(expression)),
        Some((source_raw, target_raw)) => {
            let source_offset = leading_whitespace(source_raw);
            let target_offset = source_raw.len() + 1 + leading_whitespace(target_raw);
            leading_token(source_raw.trim(), source_offset)
                .or_else(|| leading_token(target_raw.trim(), target_offset))
        }
    };

    ParsedExpression {
        token,
        source,
        target,
    }
}

/// Final path segment, used as the default staging target.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn leading_token(side: &str, offset: usize) -> Option<LeadingToken<'_>> {
    let segment = side.split('/').next()?;
    segment
        .starts_with('$')
        .then_some(LeadingToken {
            text: segment,
            offset,
        })
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Scanner for `open…close` tokens embedded in SQL or configuration text.
///
/// Handles backslash-escaped open markers (`\#{` stays literal) and escaped
/// close markers inside a token body. Each token body is passed to the
/// handler; its return value replaces the whole token in the output.
pub struct TokenParser<'a> {
    open: &'a str,
    close: &'a str,
}

impl<'a> TokenParser<'a> {
    #[must_use]
    pub fn new(open: &'a str, close: &'a str) -> Self {
        Self { open, close }
    }

    pub fn parse<E, F>(&self, text: &str, mut handler: F) -> Result<String, E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        let Some(mut start) = text.find(self.open) else {
            return Ok(text.to_string());
        };

        let src = text.as_bytes();
        let mut builder = String::with_capacity(text.len());
        let mut offset = 0usize;
        let mut expression = String::new();

        loop {
            if start > 0 && src[start - 1] == b'\\' {
                // Escaped open marker: emit it without the backslash.
                builder.push_str(&text[offset..start - 1]);
                builder.push_str(self.open);
                offset = start + self.open.len();
            } else {
                expression.clear();
                builder.push_str(&text[offset..start]);
                offset = start + self.open.len();
                let mut end = text[offset..].find(self.close).map(|i| i + offset);
                while let Some(e) = end {
                    if e > offset && src[e - 1] == b'\\' {
                        expression.push_str(&text[offset..e - 1]);
                        expression.push_str(self.close);
                        offset = e + self.close.len();
                        end = text[offset..].find(self.close).map(|i| i + offset);
                    } else {
                        expression.push_str(&text[offset..e]);
                        break;
                    }
                }
                match end {
                    Some(e) => {
                        builder.push_str(&handler(&expression)?);
                        offset = e + self.close.len();
                    }
                    None => {
                        // Unclosed token: keep the rest verbatim.
                        builder.push_str(&text[start..]);
                        offset = text.len();
                    }
                }
            }
            match text[offset..].find(self.open) {
                Some(i) => start = offset + i,
                None => break,
            }
        }
        builder.push_str(&text[offset..]);
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn sub(text: &str) -> String {
        TokenParser::new("${", "}")
            .parse::<Infallible, _>(text, |body| Ok(format!("<{body}>")))
            .unwrap()
    }

    #[test]
    fn replaces_tokens_in_order() {
        assert_eq!(sub("a ${x} b ${y}"), "a <x> b <y>");
    }

    #[test]
    fn escaped_open_stays_literal() {
        assert_eq!(sub(r"a \${x} b"), "a ${x} b");
    }

    #[test]
    fn unclosed_token_kept_verbatim() {
        assert_eq!(sub("a ${x"), "a ${x");
    }

    #[test]
    fn no_tokens_is_identity() {
        assert_eq!(sub("plain"), "plain");
    }
}

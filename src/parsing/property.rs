use std::collections::HashMap;
use std::convert::Infallible;

use super::token::TokenParser;

/// Configuration variables consulted for `${…}` placeholders in config values.
pub type Variables = HashMap<String, String>;

/// Substitute `${name}` placeholders from `variables`.
///
/// An inline default may follow the name after the first `:`
/// (`${db.user:postgres}`). Unknown names without a default are left
/// verbatim so a later pass (or the runtime) can still see them.
#[must_use]
pub fn parse_placeholders(text: &str, variables: &Variables) -> String {
    let parser = TokenParser::new("${", "}");
    parser
        .parse::<Infallible, _>(text, |content| {
            if let Some(sep) = content.find(':') {
                let key = &content[..sep];
                let default = &content[sep + 1..];
                Ok(variables
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| default.to_string()))
            } else if let Some(value) = variables.get(content) {
                Ok(value.clone())
            } else {
                Ok(format!("${{{content}}}"))
            }
        })
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_names() {
        let v = vars(&[("name", "products")]);
        assert_eq!(parse_placeholders("select * from ${name}", &v), "select * from products");
    }

    #[test]
    fn default_used_when_missing() {
        let v = Variables::new();
        assert_eq!(parse_placeholders("${name:default}", &v), "default");
    }

    #[test]
    fn variable_wins_over_default() {
        let v = vars(&[("name", "products")]);
        assert_eq!(parse_placeholders("${name:default}", &v), "products");
    }

    #[test]
    fn unknown_without_default_left_alone() {
        let v = Variables::new();
        assert_eq!(parse_placeholders("${name}", &v), "${name}");
    }
}

//! Property-path tokenization and accessor-name normalization.

/// Index applied to one path segment: `list[3]` or `map[key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Position(usize),
    Key(String),
}

/// One segment of a dotted property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub index: Option<Index>,
}

/// Tokenize `a.b[0].c` into segments. Quoted map keys (`m['k']`) drop
/// their quotes; a numeric index addresses a list position.
#[must_use]
pub fn tokenize(path: &str) -> Vec<Segment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(parse_segment)
        .collect()
}

fn parse_segment(part: &str) -> Segment {
    match part.find('[') {
        Some(open) if part.ends_with(']') => {
            let name = part[..open].to_string();
            let raw = &part[open + 1..part.len() - 1];
            let trimmed = raw.trim_matches(|c| c == '\'' || c == '"');
            let index = if trimmed == raw {
                match raw.parse::<usize>() {
                    Ok(n) => Index::Position(n),
                    Err(_) => Index::Key(raw.to_string()),
                }
            } else {
                Index::Key(trimmed.to_string())
            };
            Segment {
                name,
                index: Some(index),
            }
        }
        _ => Segment {
            name: part.to_string(),
            index: None,
        },
    }
}

/// Normalize an accessor-style spelling to its property name:
/// `get_name`/`getName` → `name`, `is_active`/`isActive` → `active`.
/// Plain property names pass through unchanged.
#[must_use]
pub fn accessor_to_property(name: &str) -> String {
    for prefix in ["get_", "set_", "is_"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    for prefix in ["get", "set", "is"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                let mut chars = rest.chars();
                let first = chars.next().unwrap_or_default().to_ascii_lowercase();
                return std::iter::once(first).chain(chars).collect();
            }
        }
    }
    name.to_string()
}

/// Whether a declared spelling uses the boolean `is` prefix.
#[must_use]
pub fn is_boolean_accessor(name: &str) -> bool {
    name.starts_with("is_")
        || (name.starts_with("is") && name.chars().nth(2).is_some_and(char::is_uppercase))
}

/// Map `user_name` to `userName` for underscore-to-camel automapping.
#[must_use]
pub fn underscore_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_nested_and_indexed() {
        let segs = tokenize("orders[0].lines[2].sku");
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].name, "orders");
        assert_eq!(segs[0].index, Some(Index::Position(0)));
        assert_eq!(segs[2].name, "sku");
        assert_eq!(segs[2].index, None);
    }

    #[test]
    fn map_key_index() {
        let segs = tokenize("attrs[color]");
        assert_eq!(segs[0].index, Some(Index::Key("color".into())));
        let segs = tokenize("attrs['size']");
        assert_eq!(segs[0].index, Some(Index::Key("size".into())));
    }

    #[test]
    fn accessor_spellings_normalize() {
        assert_eq!(accessor_to_property("get_name"), "name");
        assert_eq!(accessor_to_property("getName"), "name");
        assert_eq!(accessor_to_property("isActive"), "active");
        assert_eq!(accessor_to_property("is_active"), "active");
        assert_eq!(accessor_to_property("plain"), "plain");
        // `island` must not lose its head.
        assert_eq!(accessor_to_property("island"), "island");
    }

    #[test]
    fn camel_mapping() {
        assert_eq!(underscore_to_camel("user_name"), "userName");
        assert_eq!(underscore_to_camel("ID"), "id");
    }
}

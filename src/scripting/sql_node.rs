use serde_json::Value;

use crate::error::{Result, SqlMapperError};
use crate::expr::{Expr, Scope};
use crate::parsing::TokenParser;

use super::dynamic_context::DynamicContext;

/// The compiled tree of one statement's SQL script. Applying a node
/// appends rendered text and bindings to the context; the returned bool
/// reports whether the node contributed (drives `<choose>`).
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Literal SQL, bindings known statically.
    StaticText(String),
    /// Text with inline `${…}`, re-evaluated per call.
    Text(String),
    Mixed(Vec<SqlNode>),
    If {
        test: String,
        expr: Expr,
        contents: Box<SqlNode>,
    },
    Choose {
        whens: Vec<(String, Expr, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    Trim {
        prefix: Option<String>,
        suffix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
        contents: Box<SqlNode>,
    },
    Foreach {
        collection: String,
        collection_expr: Expr,
        item: Option<String>,
        index: Option<String>,
        open: String,
        close: String,
        separator: String,
        contents: Box<SqlNode>,
    },
    Bind {
        name: String,
        expr: Expr,
    },
}

/// Prefix of the synthetic parameter names `<foreach>` emits.
pub const FOREACH_ITEM_PREFIX: &str = "__frch_";

impl SqlNode {
    /// `<where>`: a trim that prepends `WHERE` and strips a leading
    /// `AND `/`OR `.
    #[must_use]
    pub fn where_node(contents: SqlNode) -> SqlNode {
        SqlNode::Trim {
            prefix: Some("WHERE".into()),
            suffix: None,
            prefix_overrides: ["AND ", "OR ", "AND\t", "OR\t", "AND\n", "OR\n", "AND\r", "OR\r"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            suffix_overrides: Vec::new(),
            contents: Box::new(contents),
        }
    }

    /// `<set>`: a trim that prepends `SET` and strips stray commas.
    #[must_use]
    pub fn set_node(contents: SqlNode) -> SqlNode {
        SqlNode::Trim {
            prefix: Some("SET".into()),
            suffix: None,
            prefix_overrides: vec![",".into()],
            suffix_overrides: vec![",".into()],
            contents: Box::new(contents),
        }
    }

    pub fn apply(&self, ctx: &mut DynamicContext) -> Result<bool> {
        match self {
            SqlNode::StaticText(text) => {
                ctx.append_sql(text.trim());
                Ok(true)
            }
            SqlNode::Text(text) => {
                let rendered = interpolate(text, ctx)?;
                ctx.append_sql(rendered.trim());
                Ok(true)
            }
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }
            SqlNode::If { expr, contents, .. } => {
                let pass = {
                    let scope = Scope::new(ctx.bindings());
                    expr.eval_bool(&scope)?
                };
                if pass {
                    contents.apply(ctx)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            SqlNode::Choose { whens, otherwise } => {
                for (_, expr, contents) in whens {
                    let pass = {
                        let scope = Scope::new(ctx.bindings());
                        expr.eval_bool(&scope)?
                    };
                    if pass {
                        contents.apply(ctx)?;
                        return Ok(true);
                    }
                }
                if let Some(fallback) = otherwise {
                    fallback.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }
            SqlNode::Trim {
                prefix,
                suffix,
                prefix_overrides,
                suffix_overrides,
                contents,
            } => {
                let mark = ctx.mark();
                contents.apply(ctx)?;
                let body = ctx.take_from(mark);
                let trimmed = apply_trim(
                    body.trim(),
                    prefix.as_deref(),
                    suffix.as_deref(),
                    prefix_overrides,
                    suffix_overrides,
                );
                if !trimmed.is_empty() {
                    ctx.append_sql(trimmed);
                }
                Ok(true)
            }
            SqlNode::Foreach {
                collection,
                collection_expr,
                item,
                index,
                open,
                close,
                separator,
                contents,
            } => apply_foreach(
                ctx,
                collection,
                collection_expr,
                item.as_deref(),
                index.as_deref(),
                open,
                close,
                separator,
                contents,
            ),
            SqlNode::Bind { name, expr } => {
                let value = {
                    let scope = Scope::new(ctx.bindings());
                    expr.eval(&scope)?
                };
                ctx.bind(name.clone(), value);
                Ok(true)
            }
        }
    }
}

/// Render `${…}` tokens from the bindings. A `name:default` form falls
/// back to the literal default when the name evaluates to null; a plain
/// missing name renders as the empty string.
fn interpolate(text: &str, ctx: &DynamicContext) -> Result<String> {
    let parser = TokenParser::new("${", "}");
    let scope = Scope::new(ctx.bindings());
    parser.parse(text, |content| {
        let (expr_src, default) = match content.find(':') {
            Some(sep) => (&content[..sep], Some(&content[sep + 1..])),
            None => (content, None),
        };
        let value = Expr::parse(expr_src.trim())?.eval(&scope)?;
        Ok(match value {
            Value::Null => default.unwrap_or("").to_string(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    })
}

fn apply_trim(
    body: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
    prefix_overrides: &[String],
    suffix_overrides: &[String],
) -> String {
    if body.is_empty() {
        return String::new();
    }
    let mut out = body.to_string();

    for over in prefix_overrides {
        let matches = out
            .get(..over.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(over));
        if matches {
            out.replace_range(..over.len(), "");
            break;
        }
    }
    for over in suffix_overrides {
        let matches = out.len() >= over.len()
            && out
                .get(out.len() - over.len()..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(over));
        if matches {
            let cut = out.len() - over.len();
            out.truncate(cut);
            break;
        }
    }
    out = out.trim().to_string();
    if out.is_empty() {
        return out;
    }
    if let Some(prefix) = prefix {
        out = format!("{prefix} {out}");
    }
    if let Some(suffix) = suffix {
        out = format!("{out} {suffix}");
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn apply_foreach(
    ctx: &mut DynamicContext,
    collection: &str,
    collection_expr: &Expr,
    item: Option<&str>,
    index: Option<&str>,
    open: &str,
    close: &str,
    separator: &str,
    contents: &SqlNode,
) -> Result<bool> {
    let source = {
        let scope = Scope::new(ctx.bindings());
        collection_expr.eval(&scope)?
    };

    let entries: Vec<(Value, Value)> = match source {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i as i64), v))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect(),
        other => {
            return Err(SqlMapperError::Expression(format!(
                "foreach collection '{collection}' is not iterable: {other}"
            )))
        }
    };

    if entries.is_empty() {
        return Ok(false);
    }

    if !open.is_empty() {
        ctx.append_sql(open);
    }
    let mut first = true;
    for (key, value) in entries {
        let unique = ctx.next_unique();
        if let Some(item_name) = item {
            ctx.bind(item_name.to_string(), value.clone());
            ctx.bind(synthetic_name(item_name, unique), value.clone());
        }
        if let Some(index_name) = index {
            ctx.bind(index_name.to_string(), key.clone());
            ctx.bind(synthetic_name(index_name, unique), key.clone());
        }

        let mark = ctx.mark();
        contents.apply(ctx)?;
        let body = ctx.take_from(mark);
        let body = rewrite_item_tokens(&body, item, index, unique)?;

        if !first && !separator.is_empty() {
            ctx.append_sql(separator);
        }
        ctx.append_sql(body);
        first = false;
    }
    if !close.is_empty() {
        ctx.append_sql(close);
    }
    Ok(true)
}

fn synthetic_name(name: &str, unique: usize) -> String {
    format!("{FOREACH_ITEM_PREFIX}{name}_{unique}")
}

/// Rewrite `#{item…}`/`#{index…}` references in one rendered iteration
/// body to the synthetic names registered on the context.
fn rewrite_item_tokens(
    body: &str,
    item: Option<&str>,
    index: Option<&str>,
    unique: usize,
) -> Result<String> {
    if item.is_none() && index.is_none() {
        return Ok(body.to_string());
    }
    let parser = TokenParser::new("#{", "}");
    parser.parse(body, |content| {
        let head_len = content
            .find(|c: char| c == '.' || c == '[' || c == ',')
            .unwrap_or(content.len());
        let (head, rest) = content.split_at(head_len);
        let head = head.trim();
        let replacement = if Some(head) == item {
            Some(synthetic_name(head, unique))
        } else if Some(head) == index {
            Some(synthetic_name(head, unique))
        } else {
            None
        };
        Ok(match replacement {
            Some(name) => format!("#{{{name}{rest}}}"),
            None => format!("#{{{content}}}"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(param: Value) -> DynamicContext {
        DynamicContext::new(&param, None)
    }

    fn if_node(test: &str, contents: SqlNode) -> SqlNode {
        SqlNode::If {
            test: test.into(),
            expr: Expr::parse(test).unwrap(),
            contents: Box::new(contents),
        }
    }

    #[test]
    fn where_prepends_and_strips_leading_and() {
        let node = SqlNode::where_node(SqlNode::Mixed(vec![if_node(
            "age != null",
            SqlNode::StaticText(" AND age = #{age} ".into()),
        )]));

        let mut ctx = ctx_with(json!({"age": 10}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "WHERE age = #{age}");

        let mut ctx = ctx_with(json!({"age": null}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "");
    }

    #[test]
    fn set_strips_trailing_comma() {
        let node = SqlNode::set_node(SqlNode::StaticText("name = #{name},".into()));
        let mut ctx = ctx_with(json!({"name": "x"}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "SET name = #{name}");
    }

    #[test]
    fn choose_picks_first_matching_when() {
        let node = SqlNode::Choose {
            whens: vec![
                (
                    "a != null".into(),
                    Expr::parse("a != null").unwrap(),
                    SqlNode::StaticText("BY_A".into()),
                ),
                (
                    "b != null".into(),
                    Expr::parse("b != null").unwrap(),
                    SqlNode::StaticText("BY_B".into()),
                ),
            ],
            otherwise: Some(Box::new(SqlNode::StaticText("DEFAULT".into()))),
        };

        let mut ctx = ctx_with(json!({"b": 1}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "BY_B");

        let mut ctx = ctx_with(json!({}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "DEFAULT");
    }

    #[test]
    fn foreach_emits_synthetic_names() {
        let node = SqlNode::Foreach {
            collection: "list".into(),
            collection_expr: Expr::parse("list").unwrap(),
            item: Some("id".into()),
            index: None,
            open: "(".into(),
            close: ")".into(),
            separator: ",".into(),
            contents: Box::new(SqlNode::StaticText("#{id}".into())),
        };
        let mut ctx = ctx_with(json!({"list": [10, 20, 30]}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(
            ctx.sql(),
            "( #{__frch_id_0} , #{__frch_id_1} , #{__frch_id_2} )"
        );
        assert_eq!(ctx.bindings()["__frch_id_0"], json!(10));
        assert_eq!(ctx.bindings()["__frch_id_2"], json!(30));
    }

    #[test]
    fn foreach_empty_collection_renders_nothing() {
        let node = SqlNode::Foreach {
            collection: "list".into(),
            collection_expr: Expr::parse("list").unwrap(),
            item: Some("id".into()),
            index: None,
            open: "(".into(),
            close: ")".into(),
            separator: ",".into(),
            contents: Box::new(SqlNode::StaticText("#{id}".into())),
        };
        let mut ctx = ctx_with(json!({"list": []}));
        assert!(!node.apply(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "");
    }

    #[test]
    fn foreach_over_map_binds_keys() {
        let node = SqlNode::Foreach {
            collection: "attrs".into(),
            collection_expr: Expr::parse("attrs").unwrap(),
            item: Some("v".into()),
            index: Some("k".into()),
            open: String::new(),
            close: String::new(),
            separator: "AND".into(),
            contents: Box::new(SqlNode::Text("${k} = #{v}".into())),
        };
        let mut ctx = ctx_with(json!({"attrs": {"a": 1, "b": 2}}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "a = #{__frch_v_0} AND b = #{__frch_v_1}");
    }

    #[test]
    fn interpolation_with_default() {
        let node = SqlNode::Text("select * from ${name:default}".into());
        let mut ctx = ctx_with(json!({}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "select * from default");

        let mut ctx = ctx_with(json!({"name": "products"}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "select * from products");
    }

    #[test]
    fn bind_adds_to_bindings() {
        let node = SqlNode::Mixed(vec![
            SqlNode::Bind {
                name: "pattern".into(),
                expr: Expr::parse("name").unwrap(),
            },
            SqlNode::Text("LIKE '${pattern}'".into()),
        ]);
        let mut ctx = ctx_with(json!({"name": "ann"}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "LIKE 'ann'");
    }

    #[test]
    fn trim_custom_overrides() {
        let node = SqlNode::Trim {
            prefix: Some("(".into()),
            suffix: Some(")".into()),
            prefix_overrides: vec!["AND ".into(), "OR ".into()],
            suffix_overrides: Vec::new(),
            contents: Box::new(SqlNode::StaticText("AND x = 1".into())),
        };
        let mut ctx = ctx_with(json!({}));
        node.apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "( x = 1 )");
    }
}

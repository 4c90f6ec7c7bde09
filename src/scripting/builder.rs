use crate::error::{Result, SqlMapperError};
use crate::expr::Expr;
use crate::parsing::{XmlChild, XmlNode};

use super::sql_node::SqlNode;

/// Walks a statement's XML subtree once into the [`SqlNode`] tree and
/// reports whether anything dynamic (an element, or `${…}` text) was seen.
pub struct ScriptBuilder {
    dynamic: bool,
}

impl ScriptBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { dynamic: false }
    }

    pub fn parse(mut self, node: &XmlNode) -> Result<(SqlNode, bool)> {
        let root = self.parse_children(node)?;
        Ok((root, self.dynamic))
    }

    fn parse_children(&mut self, node: &XmlNode) -> Result<SqlNode> {
        let mut contents = Vec::new();
        for child in &node.children {
            match child {
                XmlChild::Text(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    if text.contains("${") {
                        self.dynamic = true;
                        contents.push(SqlNode::Text(text.clone()));
                    } else {
                        contents.push(SqlNode::StaticText(text.clone()));
                    }
                }
                XmlChild::Element(element) => {
                    self.dynamic = true;
                    contents.push(self.parse_element(element)?);
                }
            }
        }
        Ok(SqlNode::Mixed(contents))
    }

    fn parse_element(&mut self, element: &XmlNode) -> Result<SqlNode> {
        match element.name.as_str() {
            "if" => self.if_node(element),
            "choose" => self.choose_node(element),
            "where" => Ok(SqlNode::where_node(self.parse_children(element)?)),
            "set" => Ok(SqlNode::set_node(self.parse_children(element)?)),
            "trim" => self.trim_node(element),
            "foreach" => self.foreach_node(element),
            "bind" => self.bind_node(element),
            other => Err(SqlMapperError::Config(format!(
                "unknown element <{other}> in SQL statement"
            ))),
        }
    }

    fn if_node(&mut self, element: &XmlNode) -> Result<SqlNode> {
        let test = element.required_attr("test")?.to_string();
        let expr = Expr::parse(&test)?;
        let contents = self.parse_children(element)?;
        Ok(SqlNode::If {
            test,
            expr,
            contents: Box::new(contents),
        })
    }

    fn choose_node(&mut self, element: &XmlNode) -> Result<SqlNode> {
        let mut whens = Vec::new();
        let mut otherwise = None;
        for child in element.elements() {
            match child.name.as_str() {
                "when" => {
                    let test = child.required_attr("test")?.to_string();
                    let expr = Expr::parse(&test)?;
                    let contents = self.parse_children(child)?;
                    whens.push((test, expr, contents));
                }
                "otherwise" => {
                    if otherwise.is_some() {
                        return Err(SqlMapperError::Config(
                            "<choose> allows at most one <otherwise>".into(),
                        ));
                    }
                    otherwise = Some(Box::new(self.parse_children(child)?));
                }
                other => {
                    return Err(SqlMapperError::Config(format!(
                        "unknown element <{other}> inside <choose>"
                    )))
                }
            }
        }
        if whens.is_empty() {
            return Err(SqlMapperError::Config(
                "<choose> requires at least one <when>".into(),
            ));
        }
        Ok(SqlNode::Choose { whens, otherwise })
    }

    fn trim_node(&mut self, element: &XmlNode) -> Result<SqlNode> {
        let contents = self.parse_children(element)?;
        Ok(SqlNode::Trim {
            prefix: element.attr("prefix").map(ToString::to_string),
            suffix: element.attr("suffix").map(ToString::to_string),
            prefix_overrides: split_overrides(element.attr("prefixOverrides")),
            suffix_overrides: split_overrides(element.attr("suffixOverrides")),
            contents: Box::new(contents),
        })
    }

    fn foreach_node(&mut self, element: &XmlNode) -> Result<SqlNode> {
        let collection = element.required_attr("collection")?.to_string();
        let collection_expr = Expr::parse(&collection)?;
        let contents = self.parse_children(element)?;
        Ok(SqlNode::Foreach {
            collection,
            collection_expr,
            item: element.attr("item").map(ToString::to_string),
            index: element.attr("index").map(ToString::to_string),
            open: element.attr("open").unwrap_or_default().to_string(),
            close: element.attr("close").unwrap_or_default().to_string(),
            separator: element.attr("separator").unwrap_or_default().to_string(),
            contents: Box::new(contents),
        })
    }

    fn bind_node(&mut self, element: &XmlNode) -> Result<SqlNode> {
        let name = element.required_attr("name")?.to_string();
        let value = element.required_attr("value")?;
        Ok(SqlNode::Bind {
            name,
            expr: Expr::parse(value)?,
        })
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Override lists are pipe-separated and matched case-insensitively.
fn split_overrides(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split('|').map(ToString::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_document;

    #[test]
    fn static_only_script_is_not_dynamic() {
        let doc = parse_document("<select>SELECT 1 FROM t WHERE id = #{id}</select>").unwrap();
        let (_, dynamic) = ScriptBuilder::new().parse(&doc).unwrap();
        assert!(!dynamic);
    }

    #[test]
    fn interpolation_marks_dynamic() {
        let doc = parse_document("<select>SELECT * FROM ${table}</select>").unwrap();
        let (_, dynamic) = ScriptBuilder::new().parse(&doc).unwrap();
        assert!(dynamic);
    }

    #[test]
    fn elements_mark_dynamic() {
        let doc = parse_document(
            r#"<select>SELECT 1 <if test="a != null">AND a = #{a}</if></select>"#,
        )
        .unwrap();
        let (_, dynamic) = ScriptBuilder::new().parse(&doc).unwrap();
        assert!(dynamic);
    }

    #[test]
    fn unknown_element_is_config_error() {
        let doc = parse_document("<select><loop/></select>").unwrap();
        assert!(ScriptBuilder::new().parse(&doc).is_err());
    }
}

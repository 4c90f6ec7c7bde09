//! Rendering-level checks of the dynamic SQL engine, driven through the
//! script builder and sources without touching a database.

use serde_json::{json, Value};
use sql_mapper::config::Configuration;
use sql_mapper::mapping::SqlSource;
use sql_mapper::parsing::parse_document;
use sql_mapper::scripting::{build_sql_source, ScriptBuilder};

fn render(script: &str, parameter: Value) -> (String, Vec<String>) {
    let config = Configuration::new();
    let doc = parse_document(script).expect("script should parse");
    let source = build_sql_source(&config, &doc).expect("script should compile");
    let bound = source
        .bound_sql(&config, &parameter)
        .expect("render should succeed");
    let properties = bound
        .parameter_mappings
        .iter()
        .map(|m| m.property.clone())
        .collect();
    (bound.sql, properties)
}

#[test]
fn foreach_emits_placeholders_and_synthetic_names() {
    let script = r#"<select>SELECT * FROM t WHERE id IN
        <foreach collection="ids" item="id" open="(" close=")" separator=",">#{id}</foreach>
    </select>"#;
    let (sql, props) = render(script, json!({"ids": [10, 20, 30]}));
    assert_eq!(sql, "SELECT * FROM t WHERE id IN ( ? , ? , ? )");
    assert_eq!(props, vec!["__frch_id_0", "__frch_id_1", "__frch_id_2"]);
}

#[test]
fn foreach_values_resolve_in_order() {
    let script = r#"<select>IN
        <foreach collection="ids" item="id" open="(" close=")" separator=",">#{id}</foreach>
    </select>"#;
    let config = Configuration::new();
    let doc = parse_document(script).unwrap();
    let source = build_sql_source(&config, &doc).unwrap();
    let bound = source.bound_sql(&config, &json!({"ids": [10, 20, 30]})).unwrap();
    let values: Vec<Value> = bound
        .parameter_mappings
        .iter()
        .map(|m| bound.additional_parameter(&m.property).cloned().unwrap())
        .collect();
    assert_eq!(values, vec![json!(10), json!(20), json!(30)]);
}

#[test]
fn foreach_empty_collection_renders_nothing() {
    let script = r#"<select>SELECT 1
        <foreach collection="ids" item="id" open="(" close=")" separator=",">#{id}</foreach>
    </select>"#;
    let (sql, props) = render(script, json!({"ids": []}));
    assert_eq!(sql, "SELECT 1");
    assert!(props.is_empty());
}

#[test]
fn where_strips_leading_and_or_collapses() {
    let script = r#"<select>SELECT * FROM t
        <where><if test="age != null"> AND age = #{age} </if></where>
    </select>"#;

    let (sql, props) = render(script, json!({"age": 10}));
    assert_eq!(sql, "SELECT * FROM t WHERE age = ?");
    assert_eq!(props, vec!["age"]);

    let (sql, props) = render(script, json!({"age": null}));
    assert_eq!(sql, "SELECT * FROM t");
    assert!(props.is_empty());
}

#[test]
fn where_never_emits_double_keywords() {
    let script = r#"<select>SELECT * FROM t
        <where>
          <if test="a != null">AND a = #{a}</if>
          <if test="b != null">OR b = #{b}</if>
        </where>
    </select>"#;
    let (sql, _) = render(script, json!({"a": 1, "b": 2}));
    assert_eq!(sql, "SELECT * FROM t WHERE a = ? OR b = ?");
    let (sql, _) = render(script, json!({"b": 2}));
    assert_eq!(sql, "SELECT * FROM t WHERE b = ?");
}

#[test]
fn set_strips_trailing_comma() {
    let script = r#"<update>UPDATE t
        <set>
          <if test="name != null">name = #{name},</if>
          <if test="age != null">age = #{age},</if>
        </set>
        WHERE id = #{id}
    </update>"#;
    let (sql, props) = render(script, json!({"name": "x", "id": 1}));
    assert_eq!(sql, "UPDATE t SET name = ? WHERE id = ?");
    assert_eq!(props, vec!["name", "id"]);
}

#[test]
fn choose_takes_first_match_then_otherwise() {
    let script = r#"<select>SELECT * FROM t WHERE
        <choose>
          <when test="id != null">id = #{id}</when>
          <when test="name != null">name = #{name}</when>
          <otherwise>1 = 1</otherwise>
        </choose>
    </select>"#;
    let (sql, _) = render(script, json!({"id": 5}));
    assert_eq!(sql, "SELECT * FROM t WHERE id = ?");
    let (sql, _) = render(script, json!({"name": "x"}));
    assert_eq!(sql, "SELECT * FROM t WHERE name = ?");
    let (sql, _) = render(script, json!({}));
    assert_eq!(sql, "SELECT * FROM t WHERE 1 = 1");
}

#[test]
fn interpolation_defaults_apply() {
    let script = r#"<select>SELECT * FROM ${name:default}</select>"#;
    let (sql, _) = render(script, json!({}));
    assert_eq!(sql, "SELECT * FROM default");
    let (sql, _) = render(script, json!({"name": "products"}));
    assert_eq!(sql, "SELECT * FROM products");
}

#[test]
fn bind_computes_values_for_reuse() {
    let script = r#"<select>
        <bind name="pattern" value="name"/>
        SELECT * FROM t WHERE name LIKE #{pattern}
    </select>"#;
    let config = Configuration::new();
    let doc = parse_document(script).unwrap();
    let source = build_sql_source(&config, &doc).unwrap();
    let bound = source.bound_sql(&config, &json!({"name": "ann%"})).unwrap();
    assert_eq!(bound.sql, "SELECT * FROM t WHERE name LIKE ?");
    assert_eq!(bound.additional_parameter("pattern"), Some(&json!("ann%")));
}

#[test]
fn trim_applies_affix_overrides() {
    let script = r#"<select>SELECT * FROM t
        <trim prefix="WHERE (" suffix=")" prefixOverrides="AND |OR ">
          AND a = #{a}
        </trim>
    </select>"#;
    let (sql, _) = render(script, json!({"a": 1}));
    assert_eq!(sql, "SELECT * FROM t WHERE ( a = ? )");
}

#[test]
fn rendering_is_deterministic() {
    let script = r#"<select>SELECT * FROM t
        <where>
          <if test="a != null">AND a = #{a}</if>
          <foreach collection="ids" item="i" open="AND id IN (" close=")" separator=",">#{i}</foreach>
        </where>
    </select>"#;
    let parameter = json!({"a": 7, "ids": [1, 2, 3]});
    let (first_sql, first_props) = render(script, parameter.clone());
    for _ in 0..5 {
        let (sql, props) = render(script, parameter.clone());
        assert_eq!(sql, first_sql);
        assert_eq!(props, first_props);
    }
}

#[test]
fn static_scripts_resolve_once() {
    let config = Configuration::new();
    let doc = parse_document("<select>SELECT a FROM t WHERE a = #{a}</select>").unwrap();
    let (_, dynamic) = ScriptBuilder::new().parse(&doc).unwrap();
    assert!(!dynamic);
    let source = build_sql_source(&config, &doc).unwrap();
    let bound = source.bound_sql(&config, &json!({"a": 1})).unwrap();
    assert_eq!(bound.sql, "SELECT a FROM t WHERE a = ?");
}

#[test]
fn escaped_hash_token_stays_literal() {
    let (sql, props) = render(r"<select>SELECT '\#{not_a_param}' FROM t</select>", json!({}));
    assert_eq!(sql, "SELECT '#{not_a_param}' FROM t");
    assert!(props.is_empty());
}

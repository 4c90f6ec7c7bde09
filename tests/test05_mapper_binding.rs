//! Mapper-interface dispatch: method signatures, parameter naming and
//! return-shape adaptation through a live session.

#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_mapper::datasource::DataSource;
use sql_mapper::driver::RawConnection;
use sql_mapper::prelude::*;
use tempfile::tempdir;

const ORDER_MAPPER: &str = r#"<mapper namespace="app.OrderMapper">
  <select id="findById" resultType="map">
    SELECT id, sku, qty FROM orders WHERE id = #{id}
  </select>

  <select id="findBySku" resultType="map">
    SELECT id, sku, qty FROM orders WHERE sku = #{sku} AND qty &gt;= #{minQty} ORDER BY id
  </select>

  <select id="totalQty" resultType="long">
    SELECT COALESCE(SUM(qty), 0) FROM orders
  </select>

  <select id="qtyOf" resultType="long">
    SELECT qty FROM orders WHERE id = #{id}
  </select>

  <select id="allBySku" resultType="map">
    SELECT id, sku, qty FROM orders ORDER BY id
  </select>

  <insert id="create">
    INSERT INTO orders (sku, qty) VALUES (#{sku}, #{qty})
  </insert>

  <delete id="purge">
    DELETE FROM orders
  </delete>
</mapper>"#;

fn factory(test: &str) -> SqlSessionFactory {
    let dir = tempdir().expect("tempdir");
    let db = dir
        .path()
        .join(format!("{test}.db"))
        .to_string_lossy()
        .into_owned();
    std::mem::forget(dir);

    let resource = format!("{test}/OrderMapper.xml");
    Resources::register(&resource, ORDER_MAPPER);
    let config_xml = format!(
        r#"<configuration>
             <environments default="dev">
               <environment id="dev">
                 <transactionManager type="JDBC"/>
                 <dataSource type="POOLED">
                   <property name="driver" value="sqlite"/>
                   <property name="url" value="{db}"/>
                 </dataSource>
               </environment>
             </environments>
             <mappers><mapper resource="{resource}"/></mappers>
           </configuration>"#
    );

    let mut loader = XmlConfigBuilder::new();
    loader
        .configuration_mut()
        .mapper_registry_mut()
        .add(
            MapperDescriptor::new("app.OrderMapper")
                .method(MethodSignature::new("findById", ReturnShape::One).positional_params(1))
                .method(
                    MethodSignature::new("findBySku", ReturnShape::Many)
                        .params(&["sku", "minQty"]),
                )
                .method(MethodSignature::new("totalQty", ReturnShape::One).primitive())
                .method(
                    MethodSignature::new("qtyOf", ReturnShape::One)
                        .primitive()
                        .positional_params(1),
                )
                .method(
                    MethodSignature::new("allBySku", ReturnShape::MapKeyed {
                        key_property: "sku".into(),
                    }),
                )
                .method(MethodSignature::new("create", ReturnShape::AffectedCount).positional_params(1))
                .method(MethodSignature::new("purge", ReturnShape::AffectedBool)),
        )
        .unwrap();

    let factory = SqlSessionFactoryBuilder::new()
        .build_with(loader, &config_xml)
        .unwrap();

    let env = factory.configuration().environment().unwrap().clone();
    let mut conn = env.data_source.get_connection().unwrap();
    conn.execute_script(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, sku TEXT, qty INTEGER)",
    )
    .unwrap();
    conn.close().unwrap();
    factory
}

#[test]
fn methods_dispatch_by_statement_id() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("binding_dispatch");
    let session = factory.open_session()?;
    let mapper = session.get_mapper("app.OrderMapper")?;

    let created = mapper.invoke("create", &[json!({"sku": "ABC", "qty": 3})])?;
    assert_eq!(created, json!(1));
    mapper.invoke("create", &[json!({"sku": "ABC", "qty": 4})])?;
    mapper.invoke("create", &[json!({"sku": "XYZ", "qty": 9})])?;
    session.commit()?;

    let one = mapper.invoke("findById", &[json!(1)])?;
    assert_eq!(one["sku"], json!("ABC"));

    // Multi-arg methods bind declared names and paramN aliases.
    let many = mapper.invoke("findBySku", &[json!("ABC"), json!(4)])?;
    assert_eq!(many, json!([{"id": 2, "sku": "ABC", "qty": 4}]));

    session.close()?;
    Ok(())
}

#[test]
fn return_shapes_adapt() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("binding_shapes");
    let session = factory.open_session()?;
    let mapper = session.get_mapper("app.OrderMapper")?;

    mapper.invoke("create", &[json!({"sku": "AAA", "qty": 2})])?;
    mapper.invoke("create", &[json!({"sku": "BBB", "qty": 5})])?;
    session.commit()?;

    let total = mapper.invoke("totalQty", &[])?;
    assert_eq!(total, json!(7));

    let keyed = mapper.invoke("allBySku", &[])?;
    assert_eq!(keyed["AAA"]["qty"], json!(2));
    assert_eq!(keyed["BBB"]["qty"], json!(5));

    let purged = mapper.invoke("purge", &[])?;
    assert_eq!(purged, json!(true));
    session.commit()?;
    let purged_again = mapper.invoke("purge", &[])?;
    assert_eq!(purged_again, json!(false));

    session.close()?;
    Ok(())
}

#[test]
fn primitive_return_rejects_null() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("binding_null");
    let session = factory.open_session()?;
    let mapper = session.get_mapper("app.OrderMapper")?;

    // A non-primitive single-row method passes null through.
    let missing = mapper.invoke("findById", &[json!(12345)])?;
    assert!(missing.is_null());

    // The primitive-shaped method must fail loudly instead.
    let err = mapper.invoke("qtyOf", &[json!(12345)]).unwrap_err();
    assert!(err.to_string().contains("primitive return type"));

    session.close()?;
    Ok(())
}

#[test]
fn unknown_method_and_mapper_are_binding_errors() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("binding_missing");
    let session = factory.open_session()?;

    let err = session.get_mapper("app.NoSuchMapper").unwrap_err();
    assert!(err.to_string().contains("not known to the mapper registry"));

    let mapper = session.get_mapper("app.OrderMapper")?;
    let err = mapper.invoke("nope", &[]).unwrap_err();
    assert!(err.to_string().contains("is not declared by mapper"));

    let err = mapper.invoke("findById", &[]).unwrap_err();
    assert!(err.to_string().contains("expects 1 argument"));

    session.close()?;
    Ok(())
}

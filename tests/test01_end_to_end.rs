#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_mapper::datasource::DataSource;
use sql_mapper::driver::RawConnection;
use sql_mapper::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

fn config_xml(db_path: &str, mapper_resource: &str) -> String {
    format!(
        r#"<configuration>
             <environments default="dev">
               <environment id="dev">
                 <transactionManager type="JDBC"/>
                 <dataSource type="POOLED">
                   <property name="driver" value="sqlite"/>
                   <property name="url" value="{db_path}"/>
                 </dataSource>
               </environment>
             </environments>
             <mappers>
               <mapper resource="{mapper_resource}"/>
             </mappers>
           </configuration>"#
    )
}

const USER_MAPPER: &str = r#"<mapper namespace="app.UserMapper">
  <sql id="userColumns">id, name, age</sql>

  <select id="findById" resultType="map">
    SELECT <include refid="userColumns"/> FROM users WHERE id = #{id}
  </select>

  <select id="search" resultType="map">
    SELECT <include refid="userColumns"/> FROM users
    <where>
      <if test="name != null">AND name = #{name}</if>
      <if test="minAge != null">AND age &gt;= #{minAge}</if>
    </where>
    ORDER BY id
  </select>

  <select id="findByIds" resultType="map">
    SELECT <include refid="userColumns"/> FROM users WHERE id IN
    <foreach collection="ids" item="id" open="(" close=")" separator=",">#{id}</foreach>
    ORDER BY id
  </select>

  <select id="countUsers" resultType="long">
    SELECT COUNT(*) FROM users
  </select>

  <insert id="insertUser">
    INSERT INTO users (name, age) VALUES (#{name}, #{age})
  </insert>

  <update id="renameUser">
    UPDATE users SET name = #{name} WHERE id = #{id}
  </update>

  <delete id="deleteUser">
    DELETE FROM users WHERE id = #{id}
  </delete>
</mapper>"#;

fn open_factory(test: &str) -> SqlSessionFactory {
    let resource = format!("{test}/UserMapper.xml");
    Resources::register(&resource, USER_MAPPER);
    let db = unique_db_path(test);
    let factory = SqlSessionFactoryBuilder::new()
        .build(&config_xml(&db, &resource))
        .expect("configuration should parse");

    // Schema setup through a raw driver connection.
    let env = factory.configuration().environment().unwrap().clone();
    let mut conn = env.data_source.get_connection().unwrap();
    conn.execute_script(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER)",
    )
    .unwrap();
    conn.close().unwrap();
    factory
}

#[test]
fn insert_select_update_delete_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let factory = open_factory("e2e_crud");
    let session = factory.open_session()?;

    let affected = session.insert("app.UserMapper.insertUser", json!({"name": "ann", "age": 41}))?;
    assert_eq!(affected, 1);
    session.insert("app.UserMapper.insertUser", json!({"name": "bob", "age": 25}))?;
    session.commit()?;

    let user = session.select_one("app.UserMapper.findById", json!({"id": 1}))?;
    assert_eq!(user["name"], json!("ann"));
    assert_eq!(user["age"], json!(41));

    let count = session.select_one("app.UserMapper.countUsers", json!(null))?;
    assert_eq!(count, json!(2));

    session.update("app.UserMapper.renameUser", json!({"id": 1, "name": "anna"}))?;
    session.commit()?;
    let renamed = session.select_one("app.UserMapper.findById", json!({"id": 1}))?;
    assert_eq!(renamed["name"], json!("anna"));

    let deleted = session.delete("app.UserMapper.deleteUser", json!({"id": 2}))?;
    assert_eq!(deleted, 1);
    session.commit()?;
    let gone = session.select_one("app.UserMapper.findById", json!({"id": 2}))?;
    assert!(gone.is_null());

    session.close()?;
    Ok(())
}

#[test]
fn dynamic_where_composes_per_call() -> Result<(), Box<dyn std::error::Error>> {
    let factory = open_factory("e2e_dynamic");
    let session = factory.open_session()?;
    for (name, age) in [("ann", 41), ("bob", 25), ("cal", 33)] {
        session.insert("app.UserMapper.insertUser", json!({"name": name, "age": age}))?;
    }
    session.commit()?;

    // No criteria: the <where> collapses away entirely.
    let all = session.select_list("app.UserMapper.search", json!({}))?;
    assert_eq!(all.len(), 3);

    let named = session.select_list("app.UserMapper.search", json!({"name": "bob"}))?;
    assert_eq!(named.len(), 1);
    assert_eq!(named[0]["age"], json!(25));

    let adults = session.select_list("app.UserMapper.search", json!({"minAge": 30}))?;
    assert_eq!(adults.len(), 2);

    let both = session.select_list(
        "app.UserMapper.search",
        json!({"name": "cal", "minAge": 30}),
    )?;
    assert_eq!(both.len(), 1);

    session.close()?;
    Ok(())
}

#[test]
fn foreach_binds_in_collection_order() -> Result<(), Box<dyn std::error::Error>> {
    let factory = open_factory("e2e_foreach");
    let session = factory.open_session()?;
    for (name, age) in [("ann", 41), ("bob", 25), ("cal", 33), ("dee", 52)] {
        session.insert("app.UserMapper.insertUser", json!({"name": name, "age": age}))?;
    }
    session.commit()?;

    let picked = session.select_list("app.UserMapper.findByIds", json!({"ids": [1, 3]}))?;
    assert_eq!(picked.len(), 2);
    assert_eq!(picked[0]["name"], json!("ann"));
    assert_eq!(picked[1]["name"], json!("cal"));

    session.close()?;
    Ok(())
}

#[test]
fn rollback_discards_uncommitted_writes() -> Result<(), Box<dyn std::error::Error>> {
    let factory = open_factory("e2e_rollback");
    let session = factory.open_session()?;
    session.insert("app.UserMapper.insertUser", json!({"name": "temp", "age": 1}))?;
    session.rollback()?;
    session.close()?;

    let session = factory.open_session()?;
    let count = session.select_one("app.UserMapper.countUsers", json!(null))?;
    assert_eq!(count, json!(0));
    session.close()?;
    Ok(())
}

#[test]
fn row_bounds_paginate_client_side() -> Result<(), Box<dyn std::error::Error>> {
    let factory = open_factory("e2e_bounds");
    let session = factory.open_session()?;
    for i in 0..10 {
        session.insert(
            "app.UserMapper.insertUser",
            json!({"name": format!("u{i}"), "age": i}),
        )?;
    }
    session.commit()?;

    let page = session.select_list_with_bounds(
        "app.UserMapper.search",
        json!({}),
        RowBounds::new(4, 3),
    )?;
    assert_eq!(page.len(), 3);
    assert_eq!(page[0]["name"], json!("u4"));
    assert_eq!(page[2]["name"], json!("u6"));

    session.close()?;
    Ok(())
}

#[test]
fn typed_selects_deserialize_rows() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        age: Option<i64>,
    }

    let factory = open_factory("e2e_typed");
    let session = factory.open_session()?;
    session.insert("app.UserMapper.insertUser", json!({"name": "ann", "age": 41}))?;
    session.commit()?;

    let user: Option<User> =
        session.select_one_as("app.UserMapper.findById", json!({"id": 1}))?;
    assert_eq!(
        user,
        Some(User {
            id: 1,
            name: "ann".into(),
            age: Some(41)
        })
    );

    let users: Vec<User> = session.select_list_as("app.UserMapper.search", json!({}))?;
    assert_eq!(users.len(), 1);

    let missing: Option<User> =
        session.select_one_as("app.UserMapper.findById", json!({"id": 99}))?;
    assert!(missing.is_none());

    session.close()?;
    Ok(())
}

#[test]
fn result_handler_streams_rows() -> Result<(), Box<dyn std::error::Error>> {
    struct Collector {
        names: Vec<String>,
    }
    impl ResultHandler for Collector {
        fn handle(&mut self, value: &serde_json::Value) -> bool {
            self.names
                .push(value["name"].as_str().unwrap_or_default().to_string());
            self.names.len() < 2
        }
    }

    let factory = open_factory("e2e_handler");
    let session = factory.open_session()?;
    for (name, age) in [("ann", 41), ("bob", 25), ("cal", 33)] {
        session.insert("app.UserMapper.insertUser", json!({"name": name, "age": age}))?;
    }
    session.commit()?;

    let mut collector = Collector { names: Vec::new() };
    session.select_with_handler(
        "app.UserMapper.search",
        json!({}),
        RowBounds::default(),
        &mut collector,
    )?;
    // The handler stopped the scan after two rows.
    assert_eq!(collector.names, vec!["ann", "bob"]);

    session.close()?;
    Ok(())
}

//! Result-map machinery end to end: explicit mappings onto record
//! schemas, joined-row grouping for collections, discriminators, and
//! per-row nested selects.

#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_mapper::datasource::DataSource;
use sql_mapper::driver::RawConnection;
use sql_mapper::prelude::*;
use tempfile::tempdir;

const BLOG_MAPPER: &str = r#"<mapper namespace="app.BlogMapper">
  <resultMap id="blogWithPosts" type="Blog">
    <id property="id" column="b_id"/>
    <result property="title" column="b_title"/>
    <collection property="posts" ofType="map">
      <id property="id" column="p_id"/>
      <result property="subject" column="p_subject"/>
    </collection>
  </resultMap>

  <select id="blogsJoined" resultMap="blogWithPosts">
    SELECT b.id AS b_id, b.title AS b_title, p.id AS p_id, p.subject AS p_subject
    FROM blogs b LEFT JOIN posts p ON p.blog_id = b.id
    ORDER BY b.id, p.id
  </select>

  <resultMap id="blogLazy" type="Blog">
    <id property="id" column="id"/>
    <result property="title" column="title"/>
    <collection property="posts" column="id" ofType="map" select="postsForBlog"/>
  </resultMap>

  <select id="blogsWithSelectedPosts" resultMap="blogLazy">
    SELECT id, title FROM blogs ORDER BY id
  </select>

  <select id="postsForBlog" resultType="map">
    SELECT id, subject FROM posts WHERE blog_id = #{value} ORDER BY id
  </select>

  <resultMap id="vehicle" type="map">
    <id property="id" column="id"/>
    <result property="label" column="label"/>
    <discriminator javaType="int" column="kind">
      <case value="1" resultMap="carMap"/>
      <case value="2" resultMap="truckMap"/>
    </discriminator>
  </resultMap>

  <resultMap id="carMap" type="map">
    <id property="id" column="id"/>
    <result property="label" column="label"/>
    <result property="doors" column="doors"/>
  </resultMap>

  <resultMap id="truckMap" type="map">
    <id property="id" column="id"/>
    <result property="label" column="label"/>
    <result property="payload" column="payload"/>
  </resultMap>

  <select id="vehicles" resultMap="vehicle">
    SELECT id, kind, label, doors, payload FROM vehicles ORDER BY id
  </select>
</mapper>"#;

fn factory(test: &str) -> SqlSessionFactory {
    let dir = tempdir().unwrap();
    let db = dir
        .path()
        .join(format!("{test}.db"))
        .to_string_lossy()
        .into_owned();
    std::mem::forget(dir);

    let resource = format!("{test}/BlogMapper.xml");
    Resources::register(&resource, BLOG_MAPPER);
    let config_xml = format!(
        r#"<configuration>
             <environments default="dev">
               <environment id="dev">
                 <transactionManager type="JDBC"/>
                 <dataSource type="UNPOOLED">
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
        .register_record(
            RecordSchema::new("Blog")
                .property("id", TypeKind::Long)
                .property("title", TypeKind::String)
                .list_property("posts", TypeKind::Map),
        )
        .unwrap();

    let factory = SqlSessionFactoryBuilder::new()
        .build_with(loader, &config_xml)
        .unwrap();

    let env = factory.configuration().environment().unwrap().clone();
    let mut conn = env.data_source.get_connection().unwrap();
    conn.execute_script(
        "CREATE TABLE blogs (id INTEGER PRIMARY KEY, title TEXT);
         CREATE TABLE posts (id INTEGER PRIMARY KEY, blog_id INTEGER, subject TEXT);
         CREATE TABLE vehicles (id INTEGER PRIMARY KEY, kind INTEGER, label TEXT, doors INTEGER, payload INTEGER);
         INSERT INTO blogs VALUES (1, 'first'), (2, 'second'), (3, 'empty');
         INSERT INTO posts VALUES (10, 1, 'hello'), (11, 1, 'again'), (20, 2, 'solo');
         INSERT INTO vehicles VALUES (1, 1, 'hatchback', 5, NULL), (2, 2, 'lorry', NULL, 4000);",
    )
    .unwrap();
    conn.close().unwrap();
    factory
}

#[test]
fn joined_rows_group_into_collections() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("rm_joined");
    let session = factory.open_session()?;

    let blogs = session.select_list("app.BlogMapper.blogsJoined", json!(null))?;
    assert_eq!(blogs.len(), 3);

    assert_eq!(blogs[0]["id"], json!(1));
    assert_eq!(blogs[0]["title"], json!("first"));
    let posts = blogs[0]["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["subject"], json!("hello"));
    assert_eq!(posts[1]["subject"], json!("again"));

    assert_eq!(blogs[1]["posts"].as_array().unwrap().len(), 1);

    // A left join with no posts leaves the collection absent or empty.
    let third_posts = blogs[2].get("posts").cloned().unwrap_or(json!(null));
    assert!(third_posts.is_null() || third_posts.as_array().is_some_and(Vec::is_empty));

    session.close()?;
    Ok(())
}

#[test]
fn nested_select_runs_per_outer_row() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("rm_nested_select");
    let session = factory.open_session()?;

    let blogs = session.select_list("app.BlogMapper.blogsWithSelectedPosts", json!(null))?;
    assert_eq!(blogs.len(), 3);
    assert_eq!(blogs[0]["posts"].as_array().unwrap().len(), 2);
    assert_eq!(blogs[1]["posts"].as_array().unwrap().len(), 1);
    assert_eq!(blogs[2]["posts"].as_array().unwrap().len(), 0);

    session.close()?;
    Ok(())
}

#[test]
fn discriminator_selects_concrete_map_per_row() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("rm_discriminator");
    let session = factory.open_session()?;

    let vehicles = session.select_list("app.BlogMapper.vehicles", json!(null))?;
    assert_eq!(vehicles.len(), 2);

    assert_eq!(vehicles[0]["label"], json!("hatchback"));
    assert_eq!(vehicles[0]["doors"], json!(5));
    assert!(vehicles[0].get("payload").map_or(true, |v| v.is_null()));

    assert_eq!(vehicles[1]["label"], json!("lorry"));
    assert_eq!(vehicles[1]["payload"], json!(4000));

    session.close()?;
    Ok(())
}

#[test]
fn record_schema_shapes_the_target() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("rm_schema");
    let session = factory.open_session()?;

    let blogs = session.select_list("app.BlogMapper.blogsJoined", json!(null))?;
    let first = blogs[0].as_object().unwrap();
    // Declared properties are present even before mapping fills them.
    assert!(first.contains_key("id"));
    assert!(first.contains_key("title"));
    assert!(first.contains_key("posts"));

    session.close()?;
    Ok(())
}

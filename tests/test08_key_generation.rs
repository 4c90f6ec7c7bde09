//! Key generation for inserts (driver-generated and select-key, before
//! and after) plus batch executor flushing.

#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_mapper::datasource::DataSource;
use sql_mapper::driver::RawConnection;
use sql_mapper::prelude::*;
use tempfile::tempdir;

const MAPPER: &str = r#"<mapper namespace="app.KeyMapper">
  <insert id="insertGenerated" useGeneratedKeys="true" keyProperty="id">
    INSERT INTO gadgets (name) VALUES (#{name})
  </insert>

  <insert id="insertSelectKeyBefore">
    <selectKey keyProperty="id" resultType="long" order="BEFORE">
      SELECT COALESCE(MAX(id), 0) + 100 FROM gadgets
    </selectKey>
    INSERT INTO gadgets (id, name) VALUES (#{id}, #{name})
  </insert>

  <insert id="insertSelectKeyAfter">
    <selectKey keyProperty="id" resultType="long" order="AFTER">
      SELECT last_insert_rowid()
    </selectKey>
    INSERT INTO gadgets (name) VALUES (#{name})
  </insert>

  <select id="findById" resultType="map">
    SELECT id, name FROM gadgets WHERE id = #{id}
  </select>

  <insert id="plainInsert">
    INSERT INTO gadgets (name) VALUES (#{name})
  </insert>

  <select id="countAll" resultType="long">
    SELECT COUNT(*) FROM gadgets
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

    let resource = format!("{test}/KeyMapper.xml");
    Resources::register(&resource, MAPPER);
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
    let factory = SqlSessionFactoryBuilder::new().build(&config_xml).unwrap();

    let env = factory.configuration().environment().unwrap().clone();
    let mut conn = env.data_source.get_connection().unwrap();
    conn.execute_script(
        "CREATE TABLE gadgets (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
    )
    .unwrap();
    conn.close().unwrap();
    factory
}

#[test]
fn driver_generated_key_is_written_back() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("keys_driver");
    let session = factory.open_session()?;

    let mut param = json!({"name": "widget"});
    let affected = session.insert_with_keys("app.KeyMapper.insertGenerated", &mut param)?;
    assert_eq!(affected, 1);
    assert_eq!(param["id"], json!(1));

    let mut param = json!({"name": "sprocket"});
    session.insert_with_keys("app.KeyMapper.insertGenerated", &mut param)?;
    assert_eq!(param["id"], json!(2));

    session.commit()?;
    session.close()?;
    Ok(())
}

#[test]
fn select_key_before_feeds_the_insert() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("keys_before");
    let session = factory.open_session()?;

    let mut param = json!({"name": "widget"});
    session.insert_with_keys("app.KeyMapper.insertSelectKeyBefore", &mut param)?;
    assert_eq!(param["id"], json!(100));
    session.commit()?;

    let row = session.select_one("app.KeyMapper.findById", json!({"id": 100}))?;
    assert_eq!(row["name"], json!("widget"));

    // The derived key statement is registered next to its owner.
    assert!(factory
        .configuration()
        .has_statement("app.KeyMapper.insertSelectKeyBefore!selectKey"));

    session.close()?;
    Ok(())
}

#[test]
fn select_key_after_reads_generated_value() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("keys_after");
    let session = factory.open_session()?;

    let mut param = json!({"name": "widget"});
    session.insert_with_keys("app.KeyMapper.insertSelectKeyAfter", &mut param)?;
    assert_eq!(param["id"], json!(1));
    session.commit()?;
    session.close()?;
    Ok(())
}

#[test]
fn batch_executor_flushes_queued_updates() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("keys_batch");
    let session = factory.open_session_with(ExecutorType::Batch, false, None)?;

    for name in ["a", "b", "c"] {
        session.insert("app.KeyMapper.plainInsert", json!({"name": name}))?;
    }
    // Nothing has hit the database yet; flushing reports per-statement
    // update counts.
    let results = session.flush_statements()?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].update_counts, vec![1, 1, 1]);
    assert_eq!(results[0].statement_id, "app.KeyMapper.plainInsert");

    session.commit()?;
    let count = session.select_one("app.KeyMapper.countAll", json!(null))?;
    assert_eq!(count, json!(3));
    session.close()?;
    Ok(())
}

#[test]
fn batch_rollback_discards_queue() -> Result<(), Box<dyn std::error::Error>> {
    let factory = factory("keys_batch_rollback");
    let session = factory.open_session_with(ExecutorType::Batch, false, None)?;

    session.insert("app.KeyMapper.plainInsert", json!({"name": "ghost"}))?;
    session.rollback()?;
    session.close()?;

    let session = factory.open_session()?;
    let count = session.select_one("app.KeyMapper.countAll", json!(null))?;
    assert_eq!(count, json!(0));
    session.close()?;
    Ok(())
}

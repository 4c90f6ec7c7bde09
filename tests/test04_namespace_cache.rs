//! Second-level (namespace) cache behavior across sibling sessions:
//! commit-published entries, rollback-discarded buffers, and flushing on
//! mutation.

#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_mapper::cache::Cache;
use sql_mapper::datasource::DataSource;
use sql_mapper::driver::RawConnection;
use sql_mapper::prelude::*;
use tempfile::tempdir;

const CACHED_MAPPER: &str = r#"<mapper namespace="app.CachedMapper">
  <cache eviction="LRU" size="64"/>

  <select id="findById" resultType="map">
    SELECT id, name FROM items WHERE id = #{id}
  </select>

  <select id="findByIdUncached" resultType="map" useCache="false">
    SELECT id, name FROM items WHERE id = #{id}
  </select>

  <update id="rename">
    UPDATE items SET name = #{name} WHERE id = #{id}
  </update>
</mapper>"#;

struct Fixture {
    factory: SqlSessionFactory,
    db_path: String,
}

fn fixture(test: &str) -> Fixture {
    let dir = tempdir().expect("tempdir");
    let db_path = dir
        .path()
        .join(format!("{test}.db"))
        .to_string_lossy()
        .into_owned();
    std::mem::forget(dir);

    let resource = format!("{test}/CachedMapper.xml");
    Resources::register(&resource, CACHED_MAPPER);
    let config_xml = format!(
        r#"<configuration>
             <environments default="dev">
               <environment id="dev">
                 <transactionManager type="JDBC"/>
                 <dataSource type="UNPOOLED">
                   <property name="driver" value="sqlite"/>
                   <property name="url" value="{db_path}"/>
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
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO items (id, name) VALUES (1, 'original');",
    )
    .unwrap();
    conn.close().unwrap();

    Fixture { factory, db_path }
}

/// Mutate the table behind the mapper's back so a stale (cached) read is
/// distinguishable from a fresh one.
fn mutate_directly(db_path: &str, name: &str) {
    use sql_mapper::driver::{lookup_driver, ConnectionSpec, StatementSpec};
    let driver = lookup_driver("sqlite").unwrap();
    let mut conn = driver
        .connect(&ConnectionSpec {
            url: db_path.to_string(),
            ..ConnectionSpec::default()
        })
        .unwrap();
    conn.execute(
        &StatementSpec::prepared("UPDATE items SET name = ? WHERE id = 1"),
        &[DbValue::Text(name.to_string())],
    )
    .unwrap();
    conn.close().unwrap();
}

#[test]
fn committed_session_publishes_to_shared_cache() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture("cache_publish");

    let s1 = f.factory.open_session()?;
    let first = s1.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    assert_eq!(first["name"], json!("original"));
    s1.close()?; // clean close commits the transactional cache buffer

    mutate_directly(&f.db_path, "changed-behind-the-scenes");

    // A sibling session hits the shared cache and sees the cached row.
    let s2 = f.factory.open_session()?;
    let cached = s2.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    assert_eq!(cached["name"], json!("original"));

    // The uncached twin statement reads through to the database.
    let fresh = s2.select_one("app.CachedMapper.findByIdUncached", json!({"id": 1}))?;
    assert_eq!(fresh["name"], json!("changed-behind-the-scenes"));
    s2.close()?;
    Ok(())
}

#[test]
fn rolled_back_session_discards_staged_entries() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture("cache_rollback");

    let s1 = f.factory.open_session()?;
    let _ = s1.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    // Make the session dirty so close takes the rollback path, discarding
    // the staged cache entries.
    s1.update(
        "app.CachedMapper.rename",
        json!({"id": 1, "name": "dirty-write"}),
    )?;
    s1.rollback()?;
    s1.close()?;

    mutate_directly(&f.db_path, "fresh-after-rollback");

    let s2 = f.factory.open_session()?;
    let row = s2.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    assert_eq!(row["name"], json!("fresh-after-rollback"));
    s2.close()?;
    Ok(())
}

#[test]
fn mutation_flushes_the_namespace_cache() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture("cache_flush");

    let s1 = f.factory.open_session()?;
    let _ = s1.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    s1.close()?;

    // An update through the mapper clears the namespace cache on commit.
    let s2 = f.factory.open_session()?;
    s2.update(
        "app.CachedMapper.rename",
        json!({"id": 1, "name": "renamed"}),
    )?;
    s2.commit()?;
    s2.close()?;

    let s3 = f.factory.open_session()?;
    let row = s3.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    assert_eq!(row["name"], json!("renamed"));
    s3.close()?;
    Ok(())
}

#[test]
fn uncommitted_entries_stay_invisible_to_siblings() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture("cache_isolation");
    let shared = f
        .factory
        .configuration()
        .effective_cache("app.CachedMapper")
        .unwrap();

    let s1 = f.factory.open_session()?;
    let _ = s1.select_one("app.CachedMapper.findById", json!({"id": 1}))?;
    // The entry sits in s1's transactional buffer; the shared cache has
    // not seen it.
    assert_eq!(shared.size(), 0);

    s1.close()?;
    // The clean close published the staged entry.
    assert!(shared.size() > 0);
    Ok(())
}

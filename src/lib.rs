/*!
 * SQL Mapper - an XML-configured SQL mapping runtime
 *
 * This crate binds named statements defined in XML mapper files to
 * parameterised SQL, executes them through a pooled connection to a
 * relational database, and projects result rows into dynamic record
 * values. It provides dynamic SQL composition (`<if>`, `<choose>`,
 * `<where>`, `<foreach>`, …), a two-level cache, an interceptor chain
 * around the execution pipeline, and mapper-interface style dispatch.
 *
 * # Example
 *
 * ```rust,no_run
 * use serde_json::json;
 * use sql_mapper::prelude::*;
 *
 * fn example() -> Result<(), SqlMapperError> {
 *     Resources::register(
 *         "mappers/UserMapper.xml",
 *         r#"<mapper namespace="app.UserMapper">
 *              <select id="findById" resultType="map">
 *                SELECT id, name FROM users WHERE id = #{id}
 *              </select>
 *            </mapper>"#,
 *     );
 *
 *     let config_xml = r#"
 *       <configuration>
 *         <environments default="dev">
 *           <environment id="dev">
 *             <transactionManager type="JDBC"/>
 *             <dataSource type="POOLED">
 *               <property name="driver" value="sqlite"/>
 *               <property name="url" value="app.db"/>
 *             </dataSource>
 *           </environment>
 *         </environments>
 *         <mappers>
 *           <mapper resource="mappers/UserMapper.xml"/>
 *         </mappers>
 *       </configuration>"#;
 *
 *     let factory = SqlSessionFactoryBuilder::new().build(config_xml)?;
 *     let session = factory.open_session()?;
 *     let user = session.select_one("app.UserMapper.findById", json!({"id": 1}))?;
 *     println!("{user}");
 *     session.close()?;
 *     Ok(())
 * }
 * ```
 */

#![forbid(unsafe_code)]

pub mod alias;
pub mod binding;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod error_context;
pub mod executor;
pub mod expr;
pub mod io;
pub mod mapping;
pub mod parsing;
pub mod plugin;
pub mod reflection;
pub mod results;
pub mod scripting;
pub mod session;
pub mod transaction;
pub mod type_handler;
pub mod types;

/// Convenient imports for common functionality.
pub mod prelude {
    pub use crate::binding::{MapperDescriptor, MethodSignature, ReturnShape};
    pub use crate::config::{Configuration, XmlConfigBuilder};
    pub use crate::error::SqlMapperError;
    pub use crate::io::Resources;
    pub use crate::reflection::RecordSchema;
    pub use crate::session::{
        ExecutorType, ResultHandler, RowBounds, SqlSession, SqlSessionFactory,
        SqlSessionFactoryBuilder,
    };
    pub use crate::types::{DbValue, SqlType, TypeKind};
}

// Direct exports of the most frequently used types.
pub use config::{Configuration, XmlConfigBuilder};
pub use error::SqlMapperError;
pub use session::{RowBounds, SqlSession, SqlSessionFactory, SqlSessionFactoryBuilder};

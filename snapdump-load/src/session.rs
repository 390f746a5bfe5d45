use mysql_async::{Conn, Opts, OptsBuilder};
use snapdump_common::settings::ConnectionSettings;
use snapdump_common::CommonError;

pub fn build_opts(conn: &ConnectionSettings, database: Option<&str>) -> Opts {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(conn.host.clone())
        .tcp_port(conn.port)
        .user(Some(conn.user.clone()))
        .pass(conn.password.clone());
    if let Some(db) = database {
        builder = builder.db_name(Some(db.to_owned()));
    }
    if let Some(socket) = &conn.socket {
        builder = builder.socket(Some(socket.clone()));
    }
    builder.into()
}

pub async fn connect(conn: &ConnectionSettings, database: Option<&str>) -> Result<Conn, CommonError> {
    Conn::new(build_opts(conn, database)).await.map_err(CommonError::Connection)
}

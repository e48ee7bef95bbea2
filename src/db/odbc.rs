//! ODBC session used by SQL Server, DB2 and Oracle.
//!
//! ODBC handles are blocking and tied to the environment that created them,
//! so each session owns a dedicated thread holding the environment and the
//! connection. Requests travel over a channel and results come back on a
//! oneshot per request. All values are fetched as text; [`crate::models::RowExt`]
//! parses numbers and flags back out of them.
//!
//! Without the `odbc` feature the opener fails with a connection error that
//! names the missing feature.

use crate::config::DatabaseConfig;
use crate::db::session::{QuerySession, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(feature = "odbc")]
pub use enabled::OdbcSession;

/// Opens ODBC sessions, labelled with the engine's driver name.
#[derive(Debug, Clone, Copy)]
pub struct OdbcOpener {
    driver: &'static str,
}

impl OdbcOpener {
    pub fn new(driver: &'static str) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &'static str {
        self.driver
    }
}

#[async_trait]
impl SessionOpener for OdbcOpener {
    #[cfg(feature = "odbc")]
    async fn open(&self, config: &DatabaseConfig) -> ConnectorResult<Arc<dyn QuerySession>> {
        let session = enabled::OdbcSession::connect(config, self.driver).await?;
        Ok(Arc::new(session))
    }

    #[cfg(not(feature = "odbc"))]
    async fn open(&self, config: &DatabaseConfig) -> ConnectorResult<Arc<dyn QuerySession>> {
        Err(ConnectorError::connection(
            format!(
                "Cannot connect '{}' via {}: built without the `odbc` feature",
                config.name, self.driver
            ),
            "Rebuild with --features odbc and install unixODBC plus the vendor driver",
        ))
    }
}

#[cfg(feature = "odbc")]
mod enabled {
    use super::*;
    use crate::db::sqlx_session::QUERY_TIMEOUT;
    use crate::models::{QueryParam, Row};
    use odbc_api::{
        Connection, ConnectionOptions, Cursor, Environment, IntoParameter, ResultSetMetadata,
    };
    use serde_json::Value as JsonValue;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tracing::{debug, info, warn};

    /// Initial per-cell buffer. `get_text` grows it as needed, so SQL Server
    /// and DB2 routine bodies returned in a single cell arrive whole.
    const TEXT_BUFFER_LEN: usize = 4 * 1024;

    enum Command {
        Fetch {
            sql: String,
            params: Vec<Option<String>>,
            reply: oneshot::Sender<ConnectorResult<Vec<Row>>>,
        },
    }

    pub struct OdbcSession {
        sender: Mutex<Option<mpsc::Sender<Command>>>,
        driver: &'static str,
    }

    impl OdbcSession {
        pub(super) async fn connect(
            config: &DatabaseConfig,
            driver: &'static str,
        ) -> ConnectorResult<Self> {
            let (sender, receiver) = mpsc::channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            let connection_string = config.connection_string.clone();
            let login_timeout = u32::try_from(config.connection_timeout).unwrap_or(u32::MAX);

            std::thread::Builder::new()
                .name(format!("odbc-{}", config.name))
                .spawn(move || worker(connection_string, login_timeout, ready_tx, receiver))
                .map_err(|e| ConnectorError::internal(format!("Failed to spawn ODBC worker: {}", e)))?;

            let wait = config.connection_timeout_duration();
            match timeout(wait, ready_rx).await {
                Ok(Ok(Ok(()))) => {
                    info!(
                        database = %config.name,
                        driver = driver,
                        connection = %config.masked_connection_string(),
                        "ODBC connection established"
                    );
                    Ok(Self {
                        sender: Mutex::new(Some(sender)),
                        driver,
                    })
                }
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(_)) => Err(ConnectorError::internal("ODBC worker exited during connect")),
                Err(_) => Err(ConnectorError::timeout("connect", wait.as_secs())),
            }
        }

        fn sender(&self) -> Option<mpsc::Sender<Command>> {
            self.sender.lock().ok().and_then(|guard| guard.clone())
        }
    }

    #[async_trait]
    impl QuerySession for OdbcSession {
        async fn fetch(&self, sql: &str, params: &[QueryParam]) -> ConnectorResult<Vec<Row>> {
            let Some(sender) = self.sender() else {
                return Err(ConnectorError::connection(
                    "ODBC session is closed",
                    "Reconnect to the database",
                ));
            };

            let (reply, response) = oneshot::channel();
            let command = Command::Fetch {
                sql: sql.to_string(),
                params: params.iter().map(QueryParam::as_text).collect(),
                reply,
            };
            if sender.send(command).is_err() {
                return Err(ConnectorError::connection(
                    "ODBC worker is no longer running",
                    "Reconnect to the database",
                ));
            }

            match timeout(QUERY_TIMEOUT, response).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ConnectorError::internal("ODBC worker dropped the request")),
                Err(_) => Err(ConnectorError::timeout("query execution", QUERY_TIMEOUT.as_secs())),
            }
        }

        async fn close(&self) {
            // Dropping the last sender ends the worker loop and frees the handles.
            if let Ok(mut guard) = self.sender.lock() {
                guard.take();
            }
        }

        fn driver(&self) -> &'static str {
            self.driver
        }
    }

    fn worker(
        connection_string: String,
        login_timeout: u32,
        ready: oneshot::Sender<ConnectorResult<()>>,
        commands: mpsc::Receiver<Command>,
    ) {
        let env = match Environment::new() {
            Ok(env) => env,
            Err(e) => {
                let _ = ready.send(Err(ConnectorError::connection(
                    format!("Failed to initialise ODBC environment: {}", e),
                    "Install unixODBC (or the platform driver manager)",
                )));
                return;
            }
        };

        let options = ConnectionOptions {
            login_timeout_sec: Some(login_timeout),
            ..Default::default()
        };
        let conn = match env.connect_with_connection_string(&connection_string, options) {
            Ok(conn) => conn,
            Err(e) => {
                let _ = ready.send(Err(ConnectorError::connection(
                    format!("ODBC connect failed: {}", e),
                    "Check the DRIVER name, server address and credentials",
                )));
                return;
            }
        };

        if ready.send(Ok(())).is_err() {
            warn!("ODBC connect finished after the caller gave up");
            return;
        }

        while let Ok(command) = commands.recv() {
            match command {
                Command::Fetch { sql, params, reply } => {
                    let result = fetch_text_rows(&conn, &sql, &params);
                    let _ = reply.send(result);
                }
            }
        }
        debug!("ODBC worker shutting down");
    }

    fn fetch_text_rows(
        conn: &Connection<'_>,
        sql: &str,
        params: &[Option<String>],
    ) -> ConnectorResult<Vec<Row>> {
        let params: Vec<_> = params.iter().map(|p| p.as_deref().into_parameter()).collect();
        let mut prepared = conn.prepare(sql)?;
        let Some(mut cursor) = prepared.execute(&params[..])? else {
            return Ok(Vec::new());
        };

        let names = cursor
            .column_names()?
            .collect::<Result<Vec<String>, _>>()?;
        let mut rows = Vec::new();
        let mut buf = Vec::with_capacity(TEXT_BUFFER_LEN);
        while let Some(mut cursor_row) = cursor.next_row()? {
            let mut row = Row::new();
            for (index, name) in names.iter().enumerate() {
                buf.clear();
                // ODBC column numbers start at 1
                let present = cursor_row.get_text((index + 1) as u16, &mut buf)?;
                row.insert(name.clone(), text_cell(present.then_some(buf.as_slice())));
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn text_cell(bytes: Option<&[u8]>) -> JsonValue {
        bytes
            .map(|b| JsonValue::String(String::from_utf8_lossy(b).into_owned()))
            .unwrap_or(JsonValue::Null)
    }

}

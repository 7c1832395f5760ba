use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use botbrain_core::{BrainError, ConnectionEvent, ConnectionFault, StoreClient};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ConnectionConfig;

/// Configuration for [`RedisStoreClient`].
#[derive(Debug, Clone)]
pub struct RedisStoreClientConfig {
    /// Pause between connection attempts and between ready-check polls.
    /// Defaults to one second.
    pub reconnect_delay: Duration,
    /// Buffer size of the connection event channel. Defaults to 64.
    pub event_capacity: usize,
    /// How often a live connection is checked with `PING`. Defaults to five
    /// seconds.
    pub health_check_interval: Duration,
}

impl Default for RedisStoreClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            event_capacity: 64,
            health_check_interval: Duration::from_secs(5),
        }
    }
}

impl RedisStoreClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }
}

type ConnectionSlot = Arc<RwLock<Option<MultiplexedConnection>>>;
type PasswordSlot = Arc<RwLock<Option<String>>>;

/// [`StoreClient`] over a single multiplexed Redis connection.
///
/// [`open`](StoreClient::open) spawns a task that keeps trying to connect,
/// reporting each failed attempt as [`ConnectionEvent::Error`], then runs the
/// ready check (unless the config skips it) and reports
/// [`ConnectionEvent::Connected`].
///
/// The task then pings the connection every `health_check_interval`. When the
/// connection drops it reports the fault, reconnects and reports
/// `Connected` again. The first `AUTH` is left to the caller; a password it
/// accepted is sent again on every reconnect.
pub struct RedisStoreClient {
    client: redis::Client,
    skip_ready_check: bool,
    config: RedisStoreClientConfig,
    connection: ConnectionSlot,
    password: PasswordSlot,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStoreClient {
    /// Create a client for `connection` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived URL is rejected by the `redis` crate.
    pub fn new(connection: &ConnectionConfig) -> Result<Self, BrainError> {
        Self::with_config(connection, RedisStoreClientConfig::default())
    }

    pub fn with_config(
        connection: &ConnectionConfig,
        config: RedisStoreClientConfig,
    ) -> Result<Self, BrainError> {
        let client = redis::Client::open(connection.connection_url().as_str())
            .map_err(|e| BrainError::Store(format!("failed to create Redis client: {e}")))?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            client,
            skip_ready_check: connection.skips_ready_check(),
            config,
            connection: Arc::new(RwLock::new(None)),
            password: Arc::new(RwLock::new(None)),
            events,
            shutdown,
            task: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BrainError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| BrainError::Store("Redis connection not established".to_string()))
    }
}

#[async_trait]
impl StoreClient for RedisStoreClient {
    fn open(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let connector = Connector {
            client: self.client.clone(),
            skip_ready_check: self.skip_ready_check,
            config: self.config.clone(),
            slot: Arc::clone(&self.connection),
            password: Arc::clone(&self.password),
            events: self.events.clone(),
        };
        *task = Some(tokio::spawn(connector.run(self.shutdown.subscribe())));
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrainError> {
        let mut con = self.connection().await?;
        con.get::<_, Option<String>>(key)
            .await
            .map_err(|e| BrainError::Store(format!("Redis GET error: {e}")))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BrainError> {
        let mut con = self.connection().await?;
        con.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| BrainError::Store(format!("Redis SET error: {e}")))
    }

    async fn auth(&self, password: &str) -> Result<(), BrainError> {
        let mut con = self.connection().await?;
        redis::cmd("AUTH")
            .arg(password)
            .query_async::<()>(&mut con)
            .await
            .map_err(|e| BrainError::Auth(format!("Redis AUTH error: {e}")))?;
        *self.password.write().await = Some(password.to_string());
        Ok(())
    }

    async fn quit(&self) -> Result<(), BrainError> {
        self.shutdown.send_replace(true);
        let con = self.connection.write().await.take();
        match con {
            Some(mut con) => redis::cmd("QUIT")
                .query_async::<()>(&mut con)
                .await
                .map_err(|e| BrainError::Store(format!("Redis QUIT error: {e}"))),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}

fn fault_from(err: &RedisError) -> ConnectionFault {
    let message = err.to_string();
    let trace = format!("{err:?}");
    if err.is_connection_refusal() {
        ConnectionFault::refused(message, trace)
    } else {
        ConnectionFault::new(message, trace)
    }
}

/// State owned by the background connection task.
struct Connector {
    client: redis::Client,
    skip_ready_check: bool,
    config: RedisStoreClientConfig,
    slot: ConnectionSlot,
    password: PasswordSlot,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Connector {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let delay = self.config.reconnect_delay;
        loop {
            if *shutdown.borrow() {
                return;
            }

            let attempt = tokio::select! {
                result = self.establish() => result,
                _ = shutdown.changed() => return,
            };

            match attempt {
                Ok(con) => {
                    *self.slot.write().await = Some(con.clone());
                    let _ = self.events.send(ConnectionEvent::Connected);

                    let lost = tokio::select! {
                        err = watch_connection(con, self.config.health_check_interval) => err,
                        _ = shutdown.changed() => return,
                    };
                    self.slot.write().await.take();
                    if *shutdown.borrow() {
                        return;
                    }
                    tracing::debug!(error = %lost, "lost Redis connection, reconnecting");
                    let _ = self.events.send(ConnectionEvent::Error(fault_from(&lost)));
                }
                Err(err) => {
                    let _ = self.events.send(ConnectionEvent::Error(fault_from(&err)));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn establish(&self) -> Result<MultiplexedConnection, RedisError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let password = self.password.read().await.clone();
        if let Some(password) = password {
            redis::cmd("AUTH")
                .arg(password)
                .query_async::<()>(&mut con)
                .await?;
        }
        if !self.skip_ready_check {
            ready_check(&mut con, self.config.reconnect_delay).await?;
        }
        Ok(con)
    }
}

/// Ping `con` until it fails and return the failure.
async fn watch_connection(mut con: MultiplexedConnection, every: Duration) -> RedisError {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = redis::cmd("PING").query_async::<()>(&mut con).await {
            return err;
        }
    }
}

/// Wait until the server has finished loading its dataset.
async fn ready_check(con: &mut MultiplexedConnection, delay: Duration) -> Result<(), RedisError> {
    loop {
        let info: String = redis::cmd("INFO")
            .arg("persistence")
            .query_async(con)
            .await?;
        if !is_loading(&info) {
            return Ok(());
        }
        tracing::debug!("redis is still loading its dataset, waiting");
        tokio::time::sleep(delay).await;
    }
}

fn is_loading(info: &str) -> bool {
    info.lines().any(|line| line.trim() == "loading:1")
}

//! Periodic measurement loop

use crate::{
    client::{Measurer, WebClient},
    error::{AppError, Result},
    logging::Logger,
    models::{HttpMeasure, PingConfig, RuntimeConfig},
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Schedules measurements at a fixed interval
pub struct Pinger<M = WebClient> {
    client: M,
    interval: Duration,
    count: Option<u64>,
    warm_up: bool,
    follow_redirects: bool,
    logger: Logger,
}

impl Pinger<WebClient> {
    /// Build a pinger around a new web client
    pub async fn new(config: PingConfig, runtime: RuntimeConfig) -> Result<Self> {
        let logger = Logger::with_level("PING", config.log_level);
        let family = config.ip_family;
        let client = WebClient::new(config.clone(), runtime)
            .await
            .map_err(|e| match e {
                AppError::DnsResolution(msg) => AppError::DnsResolution(format!("{} ({})", msg, family)),
                other => other,
            })?
            .with_logger(&logger);
        Ok(Self::with_measurer(&config, client).with_logger(logger))
    }
}

impl<M: Measurer + 'static> Pinger<M> {
    /// Build a pinger around any measurer
    pub fn with_measurer(config: &PingConfig, client: M) -> Self {
        Self {
            client,
            interval: config.interval,
            count: config.count,
            // an untimed request settles redirects and connection state first
            warm_up: !config.keep_alive || config.follow_redirects,
            follow_redirects: config.follow_redirects,
            logger: Logger::with_level("PING", config.log_level),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    /// Start pinging in a background task
    pub fn ping(self) -> PingRun<M> {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let Pinger {
                mut client,
                interval,
                count,
                warm_up,
                follow_redirects,
                logger,
            } = self;

            let operation = logger.start_operation("ping").await;
            logger
                .debug("Ping loop started")
                .field("url", client.url())
                .field("count", count)
                .field("interval_ms", interval.as_millis() as u64)
                .field("warm_up", warm_up)
                .log()
                .await;

            let completed = run_rounds(&mut client, &tx, &token, interval, count, warm_up, follow_redirects).await;
            logger.end_operation(&operation, "ping", completed).await;
            client
        });

        PingRun {
            measures: rx,
            cancel,
            task,
        }
    }
}

/// Sleep one interval; true if cancelled meanwhile
async fn pause(token: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

/// Returns whether every scheduled round ran
async fn run_rounds<M: Measurer>(
    client: &mut M,
    tx: &mpsc::Sender<HttpMeasure>,
    token: &CancellationToken,
    interval: Duration,
    count: Option<u64>,
    warm_up: bool,
    follow_redirects: bool,
) -> bool {
    if warm_up {
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = client.do_measure(follow_redirects) => {}
        }
        if pause(token, interval).await {
            return false;
        }
    }

    let mut round = 0u64;
    loop {
        let measure = tokio::select! {
            _ = token.cancelled() => return false,
            measure = client.do_measure(false) => measure,
        };
        round += 1;

        tokio::select! {
            _ = token.cancelled() => return false,
            sent = tx.send(measure) => {
                if sent.is_err() {
                    // consumer went away
                    return false;
                }
            }
        }

        if count.is_some_and(|count| round >= count) {
            return true;
        }
        if pause(token, interval).await {
            return false;
        }
    }
}

/// A running ping: the stream of measurements and its stop switch
///
/// The stream ends once the scheduled rounds are done or the run is
/// stopped.
pub struct PingRun<M = WebClient> {
    measures: mpsc::Receiver<HttpMeasure>,
    cancel: CancellationToken,
    task: JoinHandle<M>,
}

impl<M> PingRun<M> {
    /// Next measurement, or `None` once the run is over
    pub async fn next(&mut self) -> Option<HttpMeasure> {
        self.measures.recv().await
    }

    /// Stop the run; an in-flight measurement is abandoned
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the loop to end and get the measurer back
    pub async fn finish(self) -> Result<M> {
        drop(self.measures);
        self.task
            .await
            .map_err(|e| AppError::internal(format!("ping task failed: {}", e)))
    }
}

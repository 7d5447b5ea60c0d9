//! `focusgate run`: the background service on stdio.
//!
//! Each stdin line is one JSON message, either a request
//! (`{"type": "START"}`) or a browser event
//! (`{"type": "BEFORE_NAVIGATE", "tabId": 1, "frameId": 0, "url": "..."}`).
//! Each stdout line is one JSON message: a broadcast event, a `REPLY` to a
//! request, a `REDIRECT` instruction or an `ERROR` for unparseable input.
//! End of input or Ctrl-C stops the service after a final save.
//!
//! Unless `--ephemeral`, the daemon holds the data directory's lease for
//! its whole run, so one-shot timer commands refuse to race its saves.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use focusgate_core::blocker::{Tab, TabHost, TabId};
use focusgate_core::clock::SystemClock;
use focusgate_core::service::{self, BrowserEvent, SharedBackground};
use chrono::Utc;
use focusgate_core::storage::{DaemonLease, MemoryStore};
use focusgate_core::{
    Background, Config, ContextKind, Database, DurableStore, Request, Response,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use super::{log_surfaces, CliResult};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Request(Request),
    Browser(BrowserEvent),
}

#[derive(Debug, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum Outbound {
    Reply { response: Response },
    Redirect { tab_id: TabId, url: String },
    Error { message: String },
}

fn send(out: &mpsc::UnboundedSender<String>, message: &impl Serialize) {
    match serde_json::to_string(message) {
        Ok(line) => {
            // The writer only goes away during shutdown.
            let _ = out.send(line);
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode outbound message"),
    }
}

/// Tabs as reported by the host over stdin. Redirects go back out on stdout.
struct StdioTabs {
    tabs: BTreeMap<TabId, Option<String>>,
    out: mpsc::UnboundedSender<String>,
}

impl StdioTabs {
    fn new(out: mpsc::UnboundedSender<String>) -> Self {
        Self {
            tabs: BTreeMap::new(),
            out,
        }
    }
}

impl TabHost for StdioTabs {
    fn open_tabs(&self) -> Vec<Tab> {
        self.tabs
            .iter()
            .map(|(id, url)| Tab {
                id: *id,
                url: url.clone(),
            })
            .collect()
    }

    fn redirect(&mut self, tab: TabId, url: &str) {
        self.tabs.insert(tab, Some(url.to_string()));
        send(
            &self.out,
            &Outbound::Redirect {
                tab_id: tab,
                url: url.to_string(),
            },
        );
    }

    fn tab_updated(&mut self, tab: TabId, url: Option<String>) {
        self.tabs.insert(tab, url);
    }

    fn tab_removed(&mut self, tab: TabId) {
        self.tabs.remove(&tab);
    }
}

pub fn run(ephemeral: bool, config: Config) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve(ephemeral, config));
    // Stdin is read on a blocking thread that cannot be interrupted.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn serve(ephemeral: bool, config: Config) -> CliResult {
    let store: Arc<dyn DurableStore> = if ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(Database::open()?)
    };
    let lease = if ephemeral {
        None
    } else {
        Some(DaemonLease::acquire(
            store.as_ref(),
            std::process::id(),
            Utc::now(),
            config.daemon.lease_ttl(),
        )?)
    };
    let heartbeat = lease.clone().map(|mut lease| {
        let store = store.clone();
        let every = config.daemon.lease_refresh_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = lease.refresh(store.as_ref(), Utc::now()) {
                    tracing::warn!(error = %e, "failed to refresh daemon lease");
                }
            }
        })
    });
    let lease_store = store.clone();
    let changes = store.subscribe();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut background = Background::new(
        &config,
        store,
        Arc::new(SystemClock),
        log_surfaces(),
        Box::new(StdioTabs::new(out_tx.clone())),
    );
    let mut events = background.broadcaster().subscribe(ContextKind::Stdio);
    background.startup();
    let shared: SharedBackground = Arc::new(Mutex::new(background));

    let events_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            send(&events_tx, &event);
        }
    });

    tracing::info!(ephemeral, "background service running");

    let input_background = shared.clone();
    let input = async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => handle_line(&input_background, &out_tx, &line).await,
                Ok(None) => {
                    tracing::info!("host closed input");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read input");
                    break;
                }
            }
        }
    };
    let shutdown = async {
        tokio::select! {
            _ = input => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::info!("interrupt received");
            }
        }
    };

    service::run_until(shared.clone(), &config.daemon, changes, shutdown).await;

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    if let Some(lease) = lease {
        if let Err(e) = lease.release(lease_store.as_ref()) {
            tracing::warn!(error = %e, "failed to release daemon lease");
        }
    }

    // Dropping the background closes the broadcast channel and the last
    // stdout senders, so the forwarder and then the writer drain and finish.
    drop(shared);
    forwarder.await?;
    writer.await??;
    Ok(())
}

async fn handle_line(
    background: &SharedBackground,
    out: &mpsc::UnboundedSender<String>,
    line: &str,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Inbound>(line) {
        Ok(Inbound::Request(request)) => {
            let response = background.lock().await.handle(request);
            send(out, &Outbound::Reply { response });
        }
        Ok(Inbound::Browser(event)) => {
            background.lock().await.on_browser_event(event);
        }
        Err(e) => {
            tracing::warn!(error = %e, "unrecognized input line");
            send(
                out,
                &Outbound::Error {
                    message: format!("unrecognized message: {e}"),
                },
            );
        }
    }
}

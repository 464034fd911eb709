//! Relay server: serves the hot middleware over tiny_http and feeds it from
//! a watched stats file.

mod debouncer;
mod hooks;
mod lifecycle;
mod response;
mod watch;

pub use hooks::{BuildStatus, ReloadCommand, reload_needed_callback, report_build};
pub use watch::{StatsWatcher, load_stats};

use crate::{
    config::{RelayConfig, cfg},
    log,
    relay::{CompilerHooks, HotMiddleware, RelayOptions, publisher::default_log},
};
use anyhow::{Context, Result};
use crossbeam::channel;
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::{Request, Server};

/// Request worker threads. Push streams do not hold a worker.
const REQUEST_WORKERS: usize = 4;

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    addr: SocketAddr,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server without starting the request loop
pub fn bind_server() -> Result<BoundServer> {
    let config = cfg();
    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    lifecycle::register_server_for_shutdown(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}{}", addr, config.hmr.path);

    Ok(BoundServer {
        server,
        addr,
        shutdown_rx,
    })
}

/// Relay options from the `[hmr]` section.
pub fn relay_options(config: &RelayConfig) -> RelayOptions {
    RelayOptions {
        path: config.hmr.path.clone(),
        client_events_path: config.hmr.client_events_path.clone(),
        heartbeat: config.hmr.heartbeat_interval(),
        log: config.hmr.log.then(default_log),
        on_reload_needed: Some(reload_needed_callback(
            &config.hmr.on_reload_needed,
            config.get_root(),
        )),
    }
}

impl BoundServer {
    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start watching and run the request loop (blocking).
    pub fn run(self) -> Result<()> {
        let config = cfg();
        let stats = config
            .watch
            .stats
            .clone()
            .context("No stats file configured")?;

        let mut watcher = StatsWatcher::new(stats, config.watch.debounce_window());
        let middleware = Arc::new(HotMiddleware::new(&mut watcher, relay_options(&config)));
        // Build log lines land between status blocks, so never overwrite them
        let overwrite = !config.hmr.log;
        watcher.on_done(Box::new(move |result| {
            if !overwrite {
                crate::logger::status_detach();
            }
            report_build(result);
        }));
        let watch_handle = watcher.spawn(self.shutdown_rx)?;

        let result = run_request_loop(&self.server, &middleware);

        middleware.close();
        lifecycle::wait_for_shutdown(Some(watch_handle));
        result
    }
}

fn run_request_loop(server: &Server, middleware: &Arc<HotMiddleware>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_WORKERS)
        .thread_name(|i| format!("request-{i}"))
        .build()
        .context("Failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let middleware = Arc::clone(middleware);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &middleware) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, middleware: &HotMiddleware) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    crate::debug!("serve"; "{} {}", request.method(), request.url());
    match middleware.handle(request) {
        Some(request) => response::respond_not_found(request),
        None => Ok(()),
    }
}

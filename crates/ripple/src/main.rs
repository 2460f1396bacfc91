//! Ripple server binary.
//!
//! Wires settings, logging, metrics, the event pipeline, and the handler
//! chain, then serves. Applications embed `ripple-server` directly; this
//! binary ships a status page so a bare install has something to render.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ripple_core::event::{DomEvent, EventResponse};
use ripple_core::logging::{LogFormat, init_tracing};
use ripple_events::{DefaultValidator, EventRegistry, EventService, MemoryBus, handler_fn};
use ripple_patch::{PatchPipeline, TableResolver, TemplateRef};
use ripple_server::chain::strategies::{
    EventPostHandler, FormPostHandler, PageHandler, PageSource, PageSpec, UpgradeHandler,
};
use ripple_server::http::{AppState, router};
use ripple_server::ws::session::{SessionDeps, topic_fn};
use ripple_server::ws::{ConnectionHub, NoopHooks};
use ripple_server::{HandlerChain, metrics};
use ripple_settings::{RippleSettings, get_settings, init_settings, load_settings_from_path};
use serde_json::json;
use tracing::info;

/// Ripple live-view server.
#[derive(Debug, Parser)]
#[command(name = "ripple", version, about)]
struct Cli {
    /// Bind host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file path (defaults to ~/.ripple/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

/// Status page shipped by the bare binary.
struct StatusPages;

impl PageSource for StatusPages {
    fn page(&self, path: &str) -> Option<PageSpec> {
        (path == "/").then(|| PageSpec {
            template: TemplateRef::Named("status".into()),
            data: json!({"name": "ripple"}),
        })
    }
}

fn load_cli_settings(cli: &Cli) -> anyhow::Result<RippleSettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => ripple_settings::load_settings().unwrap_or_default(),
    };
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_cli_settings(&cli)?;
    init_settings(settings);
    let settings = get_settings();

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    if let Err(err) = init_tracing(format, &settings.logging.filter) {
        eprintln!("tracing init failed: {err}");
    }

    let prometheus = metrics::install_recorder();

    // Templates + pipeline
    let mut resolver = TableResolver::new();
    resolver.define(
        "status",
        "<html>\n  <body>\n    <div id=\"ripple-error\"></div>\n    <div id=\"ripple-content\">{{name}} is running</div>\n  </body>\n</html>",
    );
    resolver.define("status-fragment", "<div>{{name}} is running</div>");
    let resolver = Arc::new(resolver);
    let pipeline = Arc::new(
        PatchPipeline::new(Arc::clone(&resolver) as Arc<dyn ripple_patch::TemplateResolver>)
            .with_selectors(
                settings.ui.error_selector.clone(),
                settings.ui.content_selector.clone(),
            ),
    );

    // Event pipeline
    let registry = Arc::new(EventRegistry::new());
    registry.register(
        "refresh-status",
        handler_fn(|_req| async {
            Ok(EventResponse::ok().with_dom_event(DomEvent::update(
                "refresh-status",
                "#ripple-content",
                "status-fragment",
                json!({"name": "ripple"}),
            )))
        }),
    )?;

    let bus = Arc::new(MemoryBus::with_capacity(settings.bus.topic_capacity));
    let service = Arc::new(EventService::new(
        Arc::clone(&registry) as Arc<dyn ripple_events::HandlerRegistry>,
        Arc::new(DefaultValidator::new()),
        Arc::clone(&bus) as Arc<dyn ripple_events::Bus>,
    ));

    // Session layer: one topic per page path.
    let hub = Arc::new(ConnectionHub::with_hooks(Arc::new(NoopHooks)));
    let session_deps = Arc::new(
        SessionDeps::new(
            Arc::clone(&service),
            Arc::clone(&pipeline),
            Arc::clone(&hub),
            Arc::clone(&bus) as Arc<dyn ripple_events::Bus>,
        )
        .with_topic_resolver(topic_fn(|request| Some(format!("page:{}", request.path))))
        .with_queue_capacity(settings.server.outbound_queue_capacity)
        .with_heartbeat(
            std::time::Duration::from_millis(settings.server.heartbeat_interval_ms),
            settings.server.heartbeat_max_missed,
        ),
    );

    // Handler chain
    let chain = Arc::new(HandlerChain::new());
    chain.add(Arc::new(UpgradeHandler));
    chain.add(Arc::new(EventPostHandler::new(
        Arc::clone(&service),
        Arc::clone(&pipeline),
    )));
    chain.add(Arc::new(FormPostHandler::new(Arc::clone(&service))));
    chain.add(Arc::new(PageHandler::new(
        Arc::new(StatusPages),
        Arc::clone(&resolver) as Arc<dyn ripple_patch::TemplateResolver>,
    )));

    let app = router(AppState {
        chain,
        session_deps,
        prometheus: Some(prometheus),
    });

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid host/port")?;
    info!(%addr, "ripple server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

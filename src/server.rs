//! Development server
//!
//! Serves the output directory, pushes live-reload events to browsers over
//! server-sent events at `/__livereload`, and reruns tasks when sources
//! change. HTML responses get the client script injected before `</body>`.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use console::style;
use futures::Stream;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{Result, SiteError};
use crate::executor::Executor;
use crate::reload::LiveReload;
use crate::watch::{dispatch, watch_sources, WatchRule};

/// Server-sent events endpoint
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Reloads on `reload`, swaps stylesheets on css-only `changed`, shows an
/// overlay on `error`
const CLIENT_SCRIPT: &str = r#"(function () {
  var source = new EventSource('/__livereload');
  var overlay = null;
  function clearOverlay() {
    if (overlay) { overlay.remove(); overlay = null; }
  }
  source.addEventListener('reload', function () {
    window.location.reload();
  });
  source.addEventListener('changed', function (e) {
    var paths = JSON.parse(e.data).paths || [];
    paths.filter(function (p) { return /\.css$/.test(p); }).forEach(function (p) {
      document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
        var url = new URL(link.href);
        if (url.pathname.replace(/^\//, '') === p) {
          url.searchParams.set('livereload', Date.now());
          link.href = url.toString();
        }
      });
    });
    clearOverlay();
  });
  source.addEventListener('error', function (e) {
    if (!e.data) { return; }
    var data = JSON.parse(e.data);
    clearOverlay();
    overlay = document.createElement('pre');
    overlay.style.cssText = 'position:fixed;inset:0;margin:0;padding:2em;z-index:2147483647;' +
      'background:rgba(20,20,20,.92);color:#ff6b6b;font:14px/1.5 monospace;white-space:pre-wrap;overflow:auto';
    overlay.textContent = '[' + data.task + '] ' + data.message;
    overlay.addEventListener('click', clearOverlay);
    document.body.appendChild(overlay);
  });
})();"#;

#[derive(Clone)]
struct ServerState {
    files: ServeDir,
    hub: LiveReload,
}

/// Routes for the output directory and the reload stream
pub fn router(root: impl Into<PathBuf>, hub: LiveReload) -> Router {
    let state = ServerState {
        files: ServeDir::new(root.into()),
        hub,
    };

    Router::new()
        .route(LIVERELOAD_PATH, get(livereload))
        .fallback(serve_file)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, watch sources and serve until the process is stopped
pub async fn serve(executor: Arc<Executor>, hub: LiveReload) -> Result<()> {
    let config = executor.context().config.clone();
    let addr = format!("{}:{}", config.serve.host, config.serve.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| SiteError::Serve { source: e })?;
    let local = listener
        .local_addr()
        .map_err(|e| SiteError::Serve { source: e })?;

    let rules = WatchRule::defaults()?;
    let (_watcher, rx) = watch_sources(&config.source_dir())?;

    println!(
        "{} Serving {} at {}",
        style("▶").green().bold(),
        style(config.paths.output.display()).bold(),
        style(format!(
            "http://{}/{}",
            local,
            config.serve.start_path.trim_start_matches('/')
        ))
        .cyan()
        .underlined()
    );
    for rule in &rules {
        tracing::info!(
            rule = rule.name,
            patterns = %rule.patterns.join(", "),
            tasks = %rule.sequence.iter().map(|t| t.name()).collect::<Vec<_>>().join(" -> "),
            "watching"
        );
    }

    let delay = Duration::from_millis(config.serve.debounce_ms);
    let watch_executor = executor.clone();
    let dispatcher = tokio::spawn(async move {
        dispatch(&rules, delay, rx, move |rule, _paths| {
            let executor = watch_executor.clone();
            let sequence = rule.sequence.clone();
            async move {
                executor.run_sequence(&sequence).await;
            }
        })
        .await
    });

    let served = axum::serve(listener, router(config.output_dir(), hub))
        .await
        .map_err(|e| SiteError::Serve { source: e });
    dispatcher.abort();
    served
}

async fn livereload(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.hub.subscribe();
    tracing::debug!(clients = state.hub.clients(), "live-reload client connected");

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    let sse = Event::default().event(event.name()).data(data);
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "live-reload client lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Static files, with the client script added to HTML pages
async fn serve_file(State(state): State<ServerState>, req: Request) -> Response {
    let path = req.uri().path();
    let is_page = path.ends_with('/') || path.ends_with(".html") || path.ends_with(".htm");

    let response = match state.files.oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };

    if !is_page || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("could not read page body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the live-reload client before the last `</body>`, or append it
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script>{}</script>\n", CLIENT_SCRIPT);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(i) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..i]);
            out.push_str(&tag);
            out.push_str(&html[i..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::{ReloadEvent, ReloadNotifier};
    use futures::StreamExt;

    fn site() -> tempfile::TempDir {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("css")).unwrap();
        std::fs::write(
            temp.path().join("index.html"),
            "<html>\n  <body>\n    <p>home</p>\n  </body>\n</html>\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("css/style.css"), "p{color:red}").unwrap();
        temp
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_inject_before_closing_body() {
        let html = inject_client("<html><BODY><p>x</p></BODY></html>");
        let script = html.find("<script>").unwrap();
        assert!(script < html.find("</BODY>").unwrap());
        assert!(html.contains(LIVERELOAD_PATH));
        assert!(html.ends_with("</BODY></html>"));
    }

    #[test]
    fn test_inject_without_body_appends() {
        let html = inject_client("<p>fragment</p>");
        assert!(html.starts_with("<p>fragment</p><script>"));
    }

    #[tokio::test]
    async fn test_pages_get_client_and_assets_do_not() {
        let temp = site();
        let app = router(temp.path(), LiveReload::new());

        let (status, page) = get_text(app.clone(), "/index.html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("<p>home</p>"));
        assert!(page.contains("new EventSource('/__livereload')"));

        let (_, root) = get_text(app.clone(), "/").await;
        assert!(root.contains("__livereload"));

        let (status, css) = get_text(app.clone(), "/css/style.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(css, "p{color:red}");

        let (status, _) = get_text(app, "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_stream_to_clients() {
        let temp = site();
        let hub = LiveReload::new();
        let app = router(temp.path(), hub.clone());

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(LIVERELOAD_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(hub.clients(), 1);

        hub.notify(ReloadEvent::Reload);
        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();

        assert!(text.contains("event: reload"));
        assert!(text.contains(r#"data: {"type":"reload"}"#));
    }
}

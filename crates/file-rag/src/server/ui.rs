//! Browser chat UI, compiled into the binary

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../ui/index.html");

/// GET /ui
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

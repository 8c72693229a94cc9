//! Embedded text editor over the key-value store.
//!
//! GET renders a textarea pre-filled with the stored blob; POST overwrites
//! the blob with the raw request body. All writes require a bound store.

use crate::error::{html_response, json_error_response, text_response, EdgeErrorCode, ResponseBody};
use crate::store::KvStore;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

/// Serve the editor page with the current blob (empty when the store is
/// unbound or the key is absent).
pub fn handle_get(store: Option<&Arc<KvStore>>, key: &str) -> Response<ResponseBody> {
    let blob = match store {
        Some(store) => match store.get(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored blob, rendering empty");
                String::new()
            }
        },
        None => String::new(),
    };

    html_response(editor_page(key, &blob))
}

/// Overwrite the stored blob with the raw request body.
pub fn handle_post(
    store: Option<&Arc<KvStore>>,
    key: &str,
    body: &str,
) -> anyhow::Result<Response<ResponseBody>> {
    let Some(store) = store else {
        return Ok(json_error_response(
            EdgeErrorCode::StoreUnbound,
            "No key-value store is bound; set db_path to enable saving",
        ));
    };

    store.put(key, body)?;
    info!(key, bytes = body.len(), "Stored blob updated");
    Ok(text_response(StatusCode::OK, "saved"))
}

fn editor_page(key: &str, blob: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Edit {key}</title>
    <style>
        body {{ font-family: sans-serif; max-width: 48rem; margin: 3rem auto; padding: 0 1rem; }}
        textarea {{ width: 100%; height: 24rem; font-family: monospace; }}
        button {{ margin-top: 0.75rem; padding: 0.4rem 1.2rem; }}
        #status {{ margin-left: 0.75rem; }}
    </style>
</head>
<body>
    <h1>Edit {key}</h1>
    <textarea id="content" spellcheck="false">{blob}</textarea>
    <div>
        <button onclick="save()">Save</button>
        <span id="status"></span>
    </div>
    <script>
        async function save() {{
            const status = document.getElementById('status');
            status.textContent = 'saving...';
            const res = await fetch(location.pathname, {{
                method: 'POST',
                body: document.getElementById('content').value
            }});
            status.textContent = res.ok ? 'saved' : 'save failed (' + res.status + ')';
        }}
    </script>
</body>
</html>"##,
        key = escape_html(key),
        blob = escape_html(blob),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

//! Documentation index served at `/` and the prefix redirect helper.
use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};

use crate::{core::router::RouteDescriptor, error::GatewayError};

pub const DOCUMENTATION_SUFFIX: &str = "/documentation";

/// Human label for a prefix: `/projects` becomes `Project API Documentation`.
pub fn documentation_label(prefix: &str) -> String {
    let name = prefix.strip_prefix('/').unwrap_or(prefix);
    let name = name.strip_suffix('s').unwrap_or(name);
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{capitalized} API Documentation")
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the HTML index listing one documentation link per route.
pub fn render_index(routes: &[RouteDescriptor]) -> Response<Bytes> {
    let links = routes
        .iter()
        .filter(|route| route.prefix != "/")
        .map(|route| {
            format!(
                r#"<li><a class="doc-link" href="{}{DOCUMENTATION_SUFFIX}">{}</a></li>"#,
                escape_html(&route.prefix),
                escape_html(&documentation_label(&route.prefix))
            )
        })
        .collect::<Vec<_>>()
        .join("\n\t\t\t");

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
	<meta charset="UTF-8">
	<meta name="viewport" content="width=device-width, initial-scale=1.0">
	<title>API Gateway</title>
	<style>
		body {{ background: #f8fafc; font-family: 'Segoe UI', 'Roboto', 'Arial', sans-serif; margin: 0; }}
		.header {{ background: #1565c0; color: #fff; padding: 2rem 0 1rem 0; text-align: center; }}
		.card {{ background: #fff; max-width: 480px; margin: 2rem auto; border-radius: 8px; padding: 2rem; }}
		ul {{ list-style: none; padding: 0; }}
		.doc-link {{ display: block; padding: 0.75rem 1rem; margin: 0.5rem 0; background: #e3f2fd; color: #1565c0; border-radius: 4px; text-decoration: none; }}
	</style>
</head>
<body>
	<div class="header">
		<h1>API Gateway</h1>
		<p>API Gateway &amp; Documentation Index</p>
	</div>
	<div class="card">
		<h2>API Documentation</h2>
		<ul>
			{links}
		</ul>
	</div>
</body>
</html>"#
    );

    let mut response = Response::new(Bytes::from(html));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// 302 to the documentation page of `prefix`.
///
/// The `Location` is relative so the redirect works behind any host name.
pub fn documentation_redirect(prefix: &str) -> Result<Response<Bytes>, GatewayError> {
    let location = HeaderValue::from_str(&format!("{prefix}{DOCUMENTATION_SUFFIX}"))
        .map_err(|_| GatewayError::Internal(format!("invalid redirect target for {prefix}")))?;

    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

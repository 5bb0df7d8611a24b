//! Deterministic rendering of nginx configuration fragments
//!
//! Pure functions from state-store entities to fragment text. Rendering
//! never fails for store-validated input; anything that could produce
//! invalid nginx syntax through structured fields is rejected at the
//! validation boundary instead.

use std::fmt::Write as _;

use nubi_model::{Certificate, DefaultRoute, DefaultRouteMode, LbMethod, ProxyHost};

/// Fragment name of the default-route server block. Sorts before the
/// per-host fragments so the `default_server` listener wins ties.
pub const DEFAULT_ROUTE_FRAGMENT: &str = "00-nubi-default";

/// Derive a host's fragment filename from its domain.
///
/// `*` maps to `_wildcard_` and `.` to `_`, making the name a pure function
/// of identity. The same name is used under sites-available and
/// sites-enabled.
pub fn fragment_name(domain: &str) -> String {
    let safe = domain.replace('*', "_wildcard_").replace('.', "_");
    format!("nubi-host-{safe}.conf")
}

/// Renders proxy-host, default-route and maintenance fragments
#[derive(Debug, Clone)]
pub struct Renderer {
    /// Directory nginx resolves custom HTML bodies from
    html_root: String,
}

impl Renderer {
    pub fn new(html_root: impl Into<String>) -> Self {
        Self {
            html_root: html_root.into(),
        }
    }

    /// Render the fragment for one proxy host.
    ///
    /// `certificate` is the host's resolved binding; TLS lines are emitted
    /// only when both the ssl flag and a certificate are present.
    pub fn render_host(&self, host: &ProxyHost, certificate: Option<&Certificate>) -> String {
        let mut out = String::new();
        let tls_cert = if host.ssl { certificate } else { None };

        let _ = writeln!(out, "# Nubi managed proxy host: {}", host.domain);
        out.push_str("# Do not edit manually - changes will be overwritten\n");
        let _ = writeln!(out, "# Host ID: {}", host.id);
        out.push('\n');

        if host.has_load_balancing() {
            let _ = writeln!(out, "upstream {} {{", host.upstream_name());
            match host.lb_method {
                LbMethod::LeastConn => out.push_str("    least_conn;\n"),
                LbMethod::IpHash => out.push_str("    ip_hash;\n"),
                LbMethod::RoundRobin => {}
            }
            for backend in &host.backends {
                let _ = write!(out, "    server {}", backend.address);
                if backend.weight > 1 {
                    let _ = write!(out, " weight={}", backend.weight);
                }
                if backend.backup {
                    out.push_str(" backup");
                }
                out.push_str(";\n");
            }
            out.push_str("}\n\n");
        }

        out.push_str("server {\n");
        out.push_str("    listen 80;\n");
        if tls_cert.is_some() {
            out.push_str("    listen 443 ssl http2;\n");
        }
        let _ = writeln!(out, "    server_name {};", host.domain);

        if tls_cert.is_some() && host.force_ssl {
            out.push('\n');
            out.push_str("    if ($scheme = http) {\n");
            out.push_str("        return 301 https://$host$request_uri;\n");
            out.push_str("    }\n");
        }

        if let Some(cert) = tls_cert {
            out.push('\n');
            let _ = writeln!(out, "    ssl_certificate {};", cert.cert_path);
            let _ = writeln!(out, "    ssl_certificate_key {};", cert.key_path);
            if let Some(chain) = &cert.chain_path {
                let _ = writeln!(out, "    ssl_trusted_certificate {chain};");
            }
        }

        out.push('\n');
        if host.maintenance {
            let _ = writeln!(out, "    root {};", self.html_root);
            out.push_str("    error_page 503 /nubi_maintenance.html;\n");
            out.push_str("    location / {\n");
            out.push_str("        return 503;\n");
            out.push_str("    }\n");
            out.push_str("    location = /nubi_maintenance.html {\n");
            out.push_str("        internal;\n");
            out.push_str("    }\n");
        } else {
            out.push_str("    location / {\n");
            if host.has_load_balancing() {
                let _ = writeln!(out, "        proxy_pass http://{};", host.upstream_name());
            } else {
                let _ = writeln!(out, "        proxy_pass {};", host.target);
            }
            out.push_str("        proxy_http_version 1.1;\n");
            out.push('\n');
            out.push_str("        proxy_set_header Host $host;\n");
            out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
            out.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
            out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
            if host.websocket {
                out.push('\n');
                out.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
                out.push_str("        proxy_set_header Connection \"upgrade\";\n");
                out.push_str("        proxy_read_timeout 86400;\n");
            }
            out.push_str("    }\n");
        }

        if !host.custom_nginx.is_empty() {
            out.push('\n');
            out.push_str("    # Custom configuration\n");
            out.push_str(&host.custom_nginx);
            if !host.custom_nginx.ends_with('\n') {
                out.push('\n');
            }
        }

        out.push_str("}\n");
        out
    }

    /// Render the `default_server` block for the given route configuration.
    pub fn render_default_route(&self, route: &DefaultRoute) -> String {
        let mut out = String::new();

        out.push_str("# Nubi managed default server block\n");
        out.push_str("# Do not edit manually - changes will be overwritten\n");
        out.push('\n');
        out.push_str("server {\n");
        out.push_str("    listen 80 default_server;\n");
        out.push_str("    listen [::]:80 default_server;\n");
        out.push_str("    server_name _;\n");
        out.push('\n');
        out.push_str("    location = /.nubi/status {\n");
        out.push_str("        stub_status on;\n");
        out.push_str("        allow 127.0.0.1;\n");
        out.push_str("        deny all;\n");
        out.push_str("    }\n");
        out.push('\n');

        if route.mode == DefaultRouteMode::NginxDefault {
            out.push_str("    root /var/www/html;\n");
            out.push_str("    index index.html index.htm index.nginx-debian.html;\n");
        } else {
            let _ = writeln!(out, "    root {};", self.html_root);
        }

        for page in &route.error_pages {
            out.push('\n');
            let _ = writeln!(
                out,
                "    error_page {} /nubi_error_{}.html;",
                page.code, page.code
            );
            let _ = writeln!(out, "    location = /nubi_error_{}.html {{", page.code);
            out.push_str("        internal;\n");
            out.push_str("    }\n");
        }

        out.push('\n');
        match route.mode {
            DefaultRouteMode::Redirect => {
                out.push_str("    location / {\n");
                let _ = writeln!(out, "        return 302 {};", route.redirect_url);
                out.push_str("    }\n");
            }
            DefaultRouteMode::Proxy => {
                out.push_str("    location / {\n");
                let _ = writeln!(out, "        proxy_pass {};", route.target);
                out.push_str("        proxy_http_version 1.1;\n");
                out.push_str("        proxy_set_header Host $host;\n");
                out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
                out.push_str(
                    "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n",
                );
                out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
                out.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
                out.push_str("        proxy_set_header Connection \"upgrade\";\n");
                out.push_str("    }\n");
            }
            DefaultRouteMode::ErrorCode => {
                out.push_str("    location / {\n");
                let _ = writeln!(out, "        return {};", route.error_code);
                out.push_str("    }\n");
            }
            DefaultRouteMode::CustomPage => {
                out.push_str("    location / {\n");
                out.push_str("        try_files /nubi_default.html =404;\n");
                out.push_str("    }\n");
            }
            DefaultRouteMode::NginxDefault => {
                out.push_str("    location / {\n");
                out.push_str("        try_files $uri $uri/ =404;\n");
                out.push_str("    }\n");
            }
        }

        out.push_str("}\n");
        out
    }
}

/// Build the maintenance page body shown while maintenance mode is active.
pub fn maintenance_page(message: &str) -> String {
    let body = if message.is_empty() {
        "The server is currently undergoing maintenance.".to_string()
    } else {
        escape_html(message)
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Maintenance</title>
  <meta charset="utf-8">
  <style>
    body {{ font-family: system-ui, sans-serif; background: #0f172a; color: #e2e8f0; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }}
    .container {{ text-align: center; padding: 2rem; }}
    h1 {{ font-size: 3rem; margin: 0; color: #f59e0b; }}
    p {{ font-size: 1.25rem; color: #94a3b8; margin-top: 1rem; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>Under Maintenance</h1>
    <p>{body}</p>
    <p style="font-size: 0.875rem; margin-top: 2rem;">We'll be back shortly.</p>
  </div>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

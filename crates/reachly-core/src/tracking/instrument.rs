//! Outbound HTML instrumentation
//!
//! Rewrites outbound email HTML so recipient actions become observable:
//! an invisible open pixel and redirect-wrapped links, both parameterized
//! by a tracking token. Instrumentation must never break the email itself,
//! so the rewriter is conservative: only double-quoted `href` attributes
//! with absolute http(s) targets are touched, and anything already
//! pointing at the tracking host is left alone, which makes the transform
//! idempotent across repeated processing stages.

use regex::{Captures, Regex};

/// Rewrites outbound HTML with tracking instrumentation
#[derive(Clone)]
pub struct LinkInstrumenter {
    base_url: String,
    href_re: Regex,
}

impl LinkInstrumenter {
    /// Create an instrumenter pointing at the public tracking base URL
    pub fn new(public_base_url: &str) -> Self {
        Self {
            base_url: public_base_url.trim_end_matches('/').to_string(),
            href_re: Regex::new(r#"href\s*=\s*"([^"]*)""#).expect("Invalid href pattern"),
        }
    }

    /// URL of the open pixel for a token
    pub fn pixel_url(&self, token: &str) -> String {
        format!("{}/pixel/{}", self.base_url, token)
    }

    /// Redirect URL carrying the token and the original target
    pub fn redirect_url(&self, token: &str, target: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("url", target)
            .finish();
        format!("{}/redirect/{}?{}", self.base_url, token, query)
    }

    /// Append an invisible 1x1 tracking pixel.
    ///
    /// Placed just before `</body>` when present, appended otherwise.
    /// Called once per send; the send path never re-instruments.
    pub fn add_open_pixel(&self, html: &str, token: &str) -> String {
        let pixel = format!(
            r#"<img src="{}" width="1" height="1" border="0" alt="" style="display:none;" />"#,
            self.pixel_url(token)
        );

        match html.rfind("</body>") {
            Some(idx) => {
                let mut out = String::with_capacity(html.len() + pixel.len());
                out.push_str(&html[..idx]);
                out.push_str(&pixel);
                out.push_str(&html[idx..]);
                out
            }
            None => format!("{}{}", html, pixel),
        }
    }

    /// Wrap every trackable link target in a redirect URL.
    ///
    /// Skips non-http(s) schemes (mailto:, tel:, fragments, relative
    /// paths) and targets already under the tracking host, so wrapping
    /// its own output is a no-op.
    pub fn wrap_links(&self, html: &str, token: &str) -> String {
        self.href_re
            .replace_all(html, |caps: &Captures| {
                let target = &caps[1];
                if !is_absolute_http(target) || self.is_own_host(target) {
                    caps[0].to_string()
                } else {
                    format!(r#"href="{}""#, self.redirect_url(token, target))
                }
            })
            .into_owned()
    }

    /// Full instrumentation for the send path: wrapped links, then pixel
    pub fn instrument(&self, html: &str, token: &str) -> String {
        self.add_open_pixel(&self.wrap_links(html, token), token)
    }

    fn is_own_host(&self, target: &str) -> bool {
        target.starts_with(&self.base_url)
    }
}

fn is_absolute_http(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

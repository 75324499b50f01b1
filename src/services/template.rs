// src/services/template.rs
// DOCUMENTATION: Campaign message rendering and tracking links
// PURPOSE: {{placeholder}} substitution, click rewriting, open pixel

use reqwest::Url;
use uuid::Uuid;

/// Per-recipient values available to templates
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organisation: String,
    pub unsubscribe_url: String,
}

impl MessageContext {
    fn value(&self, key: &str) -> Option<String> {
        let value = match key {
            "first_name" => self.first_name.clone(),
            "last_name" => self.last_name.clone(),
            "full_name" => format!("{} {}", self.first_name, self.last_name).trim().to_string(),
            "email" => self.email.clone(),
            "organisation" | "organization" => self.organisation.clone(),
            "unsubscribe_url" => self.unsubscribe_url.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Substitute `{{ key }}` placeholders; unknown ones are left untouched
pub fn render(template: &str, ctx: &MessageContext, escape: bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match ctx.value(after[..end].trim()) {
            Some(value) if escape => out.push_str(&escape_html(&value)),
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
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

/// Public tracking endpoints for one recipient
#[derive(Debug, Clone)]
pub struct TrackingLinks {
    base_url: String,
}

impl TrackingLinks {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn open_url(&self, recipient_id: Uuid) -> String {
        format!("{}/t/open/{}", self.base_url, recipient_id)
    }

    pub fn unsubscribe_url(&self, recipient_id: Uuid) -> String {
        format!("{}/t/unsubscribe/{}", self.base_url, recipient_id)
    }

    pub fn click_url(&self, recipient_id: Uuid, target: &str) -> String {
        let base = format!("{}/t/click/{}", self.base_url, recipient_id);
        match Url::parse_with_params(&base, &[("url", target)]) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::warn!("Could not build click URL from {}: {}", base, e);
                target.to_string()
            }
        }
    }

    /// Route every absolute http(s) `href` through the click tracker
    /// DOCUMENTATION: the unsubscribe link itself is left direct
    pub fn track_links(&self, html: &str, recipient_id: Uuid) -> String {
        const HREF: &str = "href=\"";
        let unsubscribe = self.unsubscribe_url(recipient_id);
        let mut out = String::with_capacity(html.len());
        let mut rest = html;

        while let Some(pos) = rest.find(HREF) {
            let value_start = pos + HREF.len();
            out.push_str(&rest[..value_start]);
            let after = &rest[value_start..];

            let Some(end) = after.find('"') else {
                rest = after;
                break;
            };

            let target = unescape_amp(&after[..end]);
            if is_trackable(&target) && target != unsubscribe {
                out.push_str(&escape_html(&self.click_url(recipient_id, &target)));
            } else {
                out.push_str(&after[..end]);
            }
            rest = &after[end..];
        }

        out.push_str(rest);
        out
    }

    /// Invisible 1x1 image, placed before `</body>` when present
    pub fn append_pixel(&self, html: &str, recipient_id: Uuid) -> String {
        let pixel = format!(
            "<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none\" />",
            self.open_url(recipient_id)
        );

        match html.rfind("</body>") {
            Some(pos) => format!("{}{}{}", &html[..pos], pixel, &html[pos..]),
            None => format!("{}{}", html, pixel),
        }
    }
}

/// Only absolute http(s) URLs are tracked or redirected to
pub fn is_trackable(target: &str) -> bool {
    Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Absolute `href` values written into a template, placeholders kept as-is
pub fn template_links(template: &str) -> Vec<String> {
    const HREF: &str = "href=\"";
    template
        .split(HREF)
        .skip(1)
        .filter_map(|chunk| chunk.find('"').map(|end| unescape_amp(&chunk[..end])))
        .collect()
}

/// Click targets must be links the campaign actually contains.
/// A link holding a placeholder matches on its literal part before the first `{{`
pub fn is_campaign_link(template: &str, target: &str) -> bool {
    if !is_trackable(target) {
        return false;
    }

    template_links(template).iter().any(|link| match link.find("{{") {
        Some(0) => false,
        Some(pos) => target.starts_with(&link[..pos]),
        None => link == target,
    })
}

fn unescape_amp(value: &str) -> String {
    value.replace("&amp;", "&")
}

/// Full per-recipient body: placeholders, tracked links, open pixel
pub fn build_html(template: &str, ctx: &MessageContext, links: &TrackingLinks, recipient_id: Uuid) -> String {
    let rendered = render(template, ctx, true);
    let tracked = links.track_links(&rendered, recipient_id);
    links.append_pixel(&tracked, recipient_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MessageContext {
        MessageContext {
            first_name: "Claire".to_string(),
            last_name: "Martin".to_string(),
            email: "claire.martin@example.com".to_string(),
            organisation: "Acme & Co".to_string(),
            unsubscribe_url: "https://crm.example.com/t/unsubscribe/1".to_string(),
        }
    }

    #[test]
    fn test_render_known_and_unknown_placeholders() {
        let out = render("Dear {{first_name}} {{ last_name }}, {{fund_name}} at {{organisation}}", &ctx(), false);
        assert_eq!(out, "Dear Claire Martin, {{fund_name}} at Acme & Co");
    }

    #[test]
    fn test_render_escapes_values_for_html() {
        let out = render("<p>{{organisation}}</p>", &ctx(), true);
        assert_eq!(out, "<p>Acme &amp; Co</p>");
    }

    #[test]
    fn test_render_full_name_and_unterminated_placeholder() {
        assert_eq!(render("{{full_name}}", &ctx(), false), "Claire Martin");
        assert_eq!(render("Hello {{first_name", &ctx(), false), "Hello {{first_name");

        let empty_last = MessageContext {
            last_name: String::new(),
            ..ctx()
        };
        assert_eq!(render("{{full_name}}!", &empty_last, false), "Claire!");
    }

    #[test]
    fn test_tracking_urls() {
        let links = TrackingLinks::new("https://crm.example.com/");
        let id = Uuid::nil();
        assert_eq!(
            links.open_url(id),
            "https://crm.example.com/t/open/00000000-0000-0000-0000-000000000000"
        );

        let click = links.click_url(id, "https://acme.example/report?a=1&b=2");
        assert!(click.starts_with("https://crm.example.com/t/click/00000000-0000-0000-0000-000000000000?url="));
        assert!(click.contains("https%3A%2F%2Facme.example%2Freport%3Fa%3D1%26b%3D2"));
    }

    #[test]
    fn test_track_links_rewrites_http_only() {
        let links = TrackingLinks::new("https://crm.example.com");
        let id = Uuid::new_v4();
        let html = format!(
            r#"<a href="https://acme.example">site</a> <a href="mailto:x@y.z">mail</a> <a href="{}">stop</a>"#,
            links.unsubscribe_url(id)
        );

        let out = links.track_links(&html, id);
        assert!(out.contains(&format!("https://crm.example.com/t/click/{}?url=", id)));
        assert!(out.contains(r#"href="mailto:x@y.z""#));
        assert!(out.contains(&format!(r#"href="{}""#, links.unsubscribe_url(id))));
    }

    #[test]
    fn test_pixel_goes_before_body_end() {
        let links = TrackingLinks::new("https://crm.example.com");
        let id = Uuid::new_v4();

        let out = links.append_pixel("<html><body><p>Hi</p></body></html>", id);
        assert!(out.ends_with("/></body></html>"));
        assert!(out.contains(&links.open_url(id)));

        let out = links.append_pixel("<p>Hi</p>", id);
        assert!(out.starts_with("<p>Hi</p><img"));
    }

    #[test]
    fn test_click_targets_limited_to_campaign_links() {
        let body = r#"<p>Hi {{first_name}}</p>
            <a href="https://acme.example/report?a=1&amp;b=2">report</a>
            <a href="https://acme.example/people/{{email}}">profile</a>
            <a href="{{unsubscribe_url}}">stop</a>"#;

        assert_eq!(template_links(body).len(), 3);
        assert!(is_campaign_link(body, "https://acme.example/report?a=1&b=2"));
        assert!(is_campaign_link(body, "https://acme.example/people/claire@example.com"));
        assert!(!is_campaign_link(body, "https://evil.example/phish"));
        assert!(!is_campaign_link(body, "https://acme.example/report"));
    }

    #[test]
    fn test_is_trackable() {
        assert!(is_trackable("https://acme.example/path"));
        assert!(is_trackable("http://acme.example"));
        assert!(!is_trackable("javascript:alert(1)"));
        assert!(!is_trackable("/relative/path"));
        assert!(!is_trackable("ftp://files.example"));
    }
}

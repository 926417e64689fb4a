//! Page rendering. Templates are addressed by name and receive a JSON data
//! bag; [`HtmlRenderer`] is a small built-in set good enough to run without a
//! template engine.

use anyhow::bail;
use serde_json::Value;

pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> anyhow::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn text(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => escape(s),
        Some(Value::Null) | None => String::new(),
        Some(other) => escape(&other.to_string()),
    }
}

fn layout(data: &Value, body: &str) -> String {
    let nav = match data.get("user").filter(|u| u.is_object()) {
        Some(user) => format!(
            "<a href=\"/me\">{}</a> <a href=\"/api/v1/users/logout\">Log out</a>",
            text(user, "name")
        ),
        None => "<a href=\"/login\">Log in</a>".to_string(),
    };
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Tourbook | {}</title></head>\
         <body><header><a href=\"/\">Tourbook</a> {nav}</header><main>{body}</main></body></html>",
        text(data, "title")
    )
}

fn overview(data: &Value) -> String {
    let cards: String = data
        .get("tours")
        .and_then(Value::as_array)
        .map(|tours| {
            tours
                .iter()
                .map(|t| {
                    format!(
                        "<li><a href=\"/tour/{}\">{}</a> <span>{}</span> <span>${}</span></li>",
                        text(t, "slug"),
                        text(t, "name"),
                        text(t, "summary"),
                        text(t, "price")
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    format!("<ul class=\"card-container\">{cards}</ul>")
}

fn tour(data: &Value) -> String {
    let tour = data.get("tour").cloned().unwrap_or(Value::Null);
    let reviews: String = tour
        .get("reviews")
        .and_then(Value::as_array)
        .map(|rs| {
            rs.iter()
                .map(|r| format!("<li>{} ({})</li>", text(r, "review"), text(r, "rating")))
                .collect()
        })
        .unwrap_or_default();
    format!(
        "<h1>{}</h1><p>{}</p><p>{}</p><ul class=\"reviews\">{reviews}</ul>",
        text(&tour, "name"),
        text(&tour, "summary"),
        text(&tour, "description")
    )
}

fn login() -> String {
    "<form class=\"form--login\">\
     <input id=\"email\" type=\"email\" name=\"email\">\
     <input id=\"password\" type=\"password\" name=\"password\">\
     <button>Login</button></form>"
        .to_string()
}

fn account(data: &Value) -> String {
    let user = data.get("user").cloned().unwrap_or(Value::Null);
    format!(
        "<h2>Your account settings</h2><p>{}</p><p>{}</p>",
        text(&user, "name"),
        text(&user, "email")
    )
}

fn error(data: &Value) -> String {
    format!("<h2>{}</h2><p>{}</p>", text(data, "title"), text(data, "msg"))
}

impl Renderer for HtmlRenderer {
    fn render(&self, template: &str, data: &Value) -> anyhow::Result<String> {
        let body = match template {
            "overview" => overview(data),
            "tour" => tour(data),
            "login" => login(),
            "account" => account(data),
            "error" => error(data),
            other => bail!("unknown template {other}"),
        };
        Ok(layout(data, &body))
    }
}

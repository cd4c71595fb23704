// Rendering of comment lists into the JSON and XML wire formats

use axum::http::StatusCode;

use crate::models::{CanonicalResponse, Comment, CommentList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanmuFormat {
    Json,
    Xml,
}

impl DanmuFormat {
    // anything but format=xml means JSON
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("xml") => Self::Xml,
            _ => Self::Json,
        }
    }
}

pub fn render(comments: &[Comment], format: DanmuFormat) -> CanonicalResponse {
    match format {
        DanmuFormat::Json => CanonicalResponse::json(
            StatusCode::OK,
            &CommentList {
                count: comments.len(),
                comments: comments.to_vec(),
            },
        ),
        DanmuFormat::Xml => CanonicalResponse::xml(StatusCode::OK, to_xml(comments)),
    }
}

fn to_xml(comments: &[Comment]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<i>\n");
    for c in comments {
        out.push_str("  <d p=\"");
        out.push_str(&escape_xml(&c.p));
        out.push_str("\">");
        out.push_str(&escape_xml(&c.m));
        out.push_str("</d>\n");
    }
    out.push_str("</i>");
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

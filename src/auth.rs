use crate::error::GatewayError;

pub const API_PREFIX: &str = "/api/v2";
pub const LOGS_PATH: &str = "/api/logs";

// served without a token
const PUBLIC_PATHS: [&str; 2] = ["/favicon.ico", "/robots.txt"];

// Outcome of checking the token segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAuth {
    // token stripped and path normalized
    Authorized(String),
    // favicon / robots, answered with 204 and no auth
    NoContent,
}

// Check the first path segment against the token and normalize the rest
pub fn authenticate(path: &str, token: &str) -> Result<PathAuth, GatewayError> {
    if PUBLIC_PATHS.contains(&path) {
        return Ok(PathAuth::NoContent);
    }

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match segments.next() {
        Some(first) if first == token => {}
        _ => return Err(GatewayError::Unauthorized),
    }

    let rest: Vec<&str> = segments.collect();
    let working = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    };

    Ok(PathAuth::Authorized(normalize(&working)))
}

// Put a token-less path onto the /api/v2 surface
pub fn normalize(path: &str) -> String {
    if path == "/" || path == LOGS_PATH {
        return path.to_string();
    }

    // clients sometimes prefix the api path more than once
    let mut path = path;
    while path.starts_with("/api/v2/api/v2/") {
        path = &path[API_PREFIX.len()..];
    }

    if !path.starts_with(API_PREFIX) && path != "/" && !path.starts_with(LOGS_PATH) {
        format!("{}{}", API_PREFIX, path)
    } else {
        path.to_string()
    }
}

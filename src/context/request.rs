use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value, json};

/// A transport-neutral request.
///
/// The pipeline only sees this shape; the axum adapter converts into it and
/// tests can build one directly.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Why the transport could not decode the body; raised once a route matches.
    pub(crate) rejected_body: Option<String>,
}

impl Request {
    /// Build a request from a method and a `path?query` target.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Vec::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HeaderMap::new(),
            body: None,
            rejected_body: None,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// A header value, if present and valid UTF-8.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The JSON view handed to handlers asking for the raw request.
    pub fn to_json(&self) -> Value {
        let query: Map<String, Value> = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), Value::String(value.to_string())))
            })
            .collect();
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "query": query,
            "headers": headers,
            "body": self.body.clone().unwrap_or(Value::Null),
        })
    }
}

pub(crate) fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_split_into_path_and_query() {
        let request = Request::get("/items/42?tag=a%20b&tag=c&empty=");
        assert_eq!(request.path, "/items/42");
        assert_eq!(request.query_value("tag"), Some("a b"));
        assert_eq!(request.query_value("empty"), Some(""));
        assert_eq!(request.query.len(), 3);
        assert_eq!(request.query_value("missing"), None);
    }

    #[test]
    fn test_json_view() {
        let request = Request::post("/users?dry=true")
            .header(HeaderName::from_static("x-api-key"), HeaderValue::from_static("secret"))
            .body(json!({ "name": "ada" }));
        let view = request.to_json();
        assert_eq!(view["method"], "POST");
        assert_eq!(view["query"]["dry"], "true");
        assert_eq!(view["headers"]["x-api-key"], "secret");
        assert_eq!(view["body"]["name"], "ada");
    }
}

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use url::Url;

use crate::error::ClientError;

/// Outgoing HTTP request handed to a [`Transport`](crate::Transport).
///
/// Cloning copies the header map entry by entry, so a clone can be decorated
/// without touching the original.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// Create a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Get the HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the full request URL, query string included
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the request body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Set a query parameter, replacing any value already present for `key`.
    pub fn set_query_param(&mut self, key: &str, value: &str) {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut pairs = self.url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }

    /// Set the body to a JSON-serialized value and add Content-Type header
    ///
    /// # Errors
    /// Returns [`ClientError::Marshal`] if `value` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ClientError> {
        let body = serde_json::to_vec(value).map_err(ClientError::Marshal)?;
        self.body = Bytes::from(body);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn test_set_query_param_appends() {
        let mut req = request("http://localhost/api/v1/devices");
        req.set_query_param("page_size", "10");
        req.set_query_param("filter[type_in]", "ucm,gateway");

        assert_eq!(req.url().query_pairs().count(), 2);
        assert!(req.url().query_pairs().any(|(k, v)| k == "filter[type_in]" && v == "ucm,gateway"));
    }

    #[test]
    fn test_set_query_param_replaces_existing() {
        let mut req = request("http://localhost/commands?show_progress=false&keep=1");
        req.set_query_param("show_progress", "true");

        let pairs: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("keep".to_owned(), "1".to_owned()),
                ("show_progress".to_owned(), "true".to_owned()),
            ]
        );
    }

    #[test]
    fn test_with_json_sets_body_and_content_type() {
        let req = request("http://localhost/")
            .with_json(&json!({"command_name": "ping"}))
            .unwrap();

        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(req.body().as_ref(), br#"{"command_name":"ping"}"#);
    }

    #[test]
    fn test_clone_does_not_share_headers() {
        let original = request("http://localhost/");
        let mut copy = original.clone();
        copy.headers_mut()
            .insert("x-extra", HeaderValue::from_static("1"));

        assert!(original.headers().is_empty());
        assert_eq!(copy.headers().len(), 1);
    }
}

//! Operation types and the typed GraphQL trait.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, GraphqlError};

/// GraphQL query wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlQuery {
    query: String,
}

impl GraphqlQuery {
    /// Create a new query from a string.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Return the query text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.query
    }

    /// Kind of the root definition.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        OperationKind::detect(&self.query)
    }
}

/// Root operation kind, used for transport routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read operation.
    Query,
    /// Write operation.
    Mutation,
    /// Streaming operation.
    Subscription,
}

impl OperationKind {
    /// Detect the root definition kind of an operation document.
    ///
    /// This is a routing decision, not validation: it scans past comments
    /// and fragment definitions for the first executable definition keyword.
    /// Shorthand documents (`{ ... }`) are queries.
    #[must_use]
    pub fn detect(document: &str) -> Self {
        let mut rest = document;
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if let Some(stripped) = rest.strip_prefix('#') {
                rest = stripped.split_once('\n').map_or("", |(_, tail)| tail);
                continue;
            }
            if rest.starts_with("fragment") {
                // Skip the fragment body and keep scanning for the operation.
                match rest.split_once('}') {
                    Some((_, tail)) => {
                        rest = tail;
                        continue;
                    }
                    None => return Self::Query,
                }
            }
            break;
        }

        if rest.starts_with("mutation") {
            Self::Mutation
        } else if rest.starts_with("subscription") {
            Self::Subscription
        } else {
            Self::Query
        }
    }
}

/// Typed GraphQL operation definition.
///
/// Implement this trait for each query/mutation/subscription.
pub trait GraphqlOperation {
    /// Variables type.
    type Variables: Serialize + Send + Sync;
    /// Response data type.
    type ResponseData: DeserializeOwned + Send + Sync;

    /// GraphQL query text.
    const QUERY: &'static str;
    /// Operation name (used for observability and dedup keys).
    const OPERATION_NAME: &'static str;
}

/// A dispatch-ready GraphQL request.
///
/// Variables are held as JSON so one request type flows through every link
/// regardless of the caller-side variables type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlRequest {
    /// Query text.
    pub query: GraphqlQuery,
    /// Variables payload.
    pub variables: serde_json::Value,
    /// Optional operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Root definition kind.
    pub kind: OperationKind,
}

impl GraphqlRequest {
    /// Create a request from raw query text and JSON variables.
    #[must_use]
    pub fn new(query: impl Into<String>, variables: serde_json::Value) -> Self {
        let query = GraphqlQuery::new(query);
        let kind = query.kind();
        Self {
            query,
            variables,
            operation_name: None,
            kind,
        }
    }

    /// Create a request from a typed operation.
    pub fn typed<O: GraphqlOperation>(variables: O::Variables) -> Result<Self, ClientError> {
        Ok(Self::new(O::QUERY, serde_json::to_value(&variables)?)
            .with_operation_name(O::OPERATION_NAME))
    }

    /// Attach an operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Serialize the wire body (`query`/`variables`/`operationName`).
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            "query".to_string(),
            serde_json::Value::String(self.query.as_str().to_string()),
        );
        body.insert("variables".to_string(), self.variables.clone());
        if let Some(name) = &self.operation_name {
            body.insert(
                "operationName".to_string(),
                serde_json::Value::String(name.clone()),
            );
        }
        serde_json::Value::Object(body)
    }
}

/// GraphQL response container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    /// Response data.
    #[serde(default)]
    pub data: Option<T>,
    /// GraphQL errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    /// Extensions payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl<T> GraphqlResponse<T> {
    /// Wrap cached data in a response shell.
    #[must_use]
    pub const fn from_data(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            extensions: None,
        }
    }

    /// Returns `true` if no GraphQL errors were returned.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Unwrap the data, converting GraphQL errors into a client error.
    pub fn into_data(self) -> Result<T, ClientError> {
        if !self.errors.is_empty() {
            return Err(ClientError::graphql(self.errors));
        }
        self.data
            .ok_or_else(|| ClientError::protocol("missing GraphQL data"))
    }
}

impl GraphqlResponse<serde_json::Value> {
    /// Deserialize the untyped data payload into a typed response.
    pub fn deserialize_data<T: DeserializeOwned>(self) -> Result<GraphqlResponse<T>, ClientError> {
        let data = match self.data {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(GraphqlResponse {
            data,
            errors: self.errors,
            extensions: self.extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_shorthand_as_query() {
        assert_eq!(OperationKind::detect("{ viewer { id } }"), OperationKind::Query);
    }

    #[test]
    fn detects_named_operations() {
        assert_eq!(
            OperationKind::detect("query Viewer { viewer { id } }"),
            OperationKind::Query
        );
        assert_eq!(
            OperationKind::detect("mutation Update($id: ID!) { update(id: $id) }"),
            OperationKind::Mutation
        );
        assert_eq!(
            OperationKind::detect("subscription OnTick { tick }"),
            OperationKind::Subscription
        );
    }

    #[test]
    fn detects_past_comments_and_fragments() {
        let document = "# updates feed\nfragment F on Item { id }\nsubscription Feed { feed { ...F } }";
        assert_eq!(OperationKind::detect(document), OperationKind::Subscription);
    }

    #[test]
    fn body_includes_operation_name_when_present() {
        let request = GraphqlRequest::new("{ a }", serde_json::json!({}))
            .with_operation_name("A");
        let body = request.body();
        assert_eq!(body["operationName"], "A");
        assert_eq!(body["query"], "{ a }");
    }

    #[test]
    fn into_data_surfaces_graphql_errors_intact() {
        let response: GraphqlResponse<serde_json::Value> = GraphqlResponse {
            data: None,
            errors: vec![GraphqlError {
                message: "nope".into(),
                locations: Vec::new(),
                path: Vec::new(),
                extensions: None,
            }],
            extensions: None,
        };
        match response.into_data() {
            Err(ClientError::GraphqlErrors { errors }) => {
                assert_eq!(errors[0].message, "nope");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

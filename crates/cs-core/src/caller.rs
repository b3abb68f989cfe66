//! Callers: named transformation units that turn an input into a [`Response`].

use std::any::TypeId;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{ConfigError, FetchConfig};
use crate::error::{BoxError, LineageError, value_kind};
use crate::fetch::{ContextEntry, Fetcher};
use crate::response::{Generator, Input, Response};

/// Id given to identity callers unless overridden.
pub const IDENTITY_ID: &str = "identity";

/// Hex characters kept from a content hash when deriving default ids.
const HASH_ID_LEN: usize = 16;

/// Result of a wrapped function.
///
/// A function may hand back a response it built itself; that response is
/// returned as-is instead of being wrapped again.
#[derive(Debug, Clone)]
pub enum Transformed {
    Value(Value),
    Response(Arc<Response>),
}

impl From<Value> for Transformed {
    fn from(value: Value) -> Self {
        Transformed::Value(value)
    }
}

impl From<String> for Transformed {
    fn from(value: String) -> Self {
        Transformed::Value(Value::String(value))
    }
}

impl From<&str> for Transformed {
    fn from(value: &str) -> Self {
        Transformed::Value(Value::String(value.to_string()))
    }
}

impl From<Arc<Response>> for Transformed {
    fn from(response: Arc<Response>) -> Self {
        Transformed::Response(response)
    }
}

/// Function wrapped by a programmatic caller.
pub type TransformFn = dyn Fn(&Value) -> Result<Transformed, BoxError> + Send + Sync;

/// System prompt(s) of an LLM caller, normalized to system-role entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemContext(Vec<ContextEntry>);

impl SystemContext {
    pub fn entries(&self) -> &[ContextEntry] {
        &self.0
    }
}

impl From<&str> for SystemContext {
    fn from(text: &str) -> Self {
        Self(vec![ContextEntry::system(text)])
    }
}

impl From<String> for SystemContext {
    fn from(text: String) -> Self {
        Self(vec![ContextEntry::system(text)])
    }
}

impl From<Vec<String>> for SystemContext {
    fn from(texts: Vec<String>) -> Self {
        Self(texts.into_iter().map(ContextEntry::system).collect())
    }
}

impl From<Vec<&str>> for SystemContext {
    fn from(texts: Vec<&str>) -> Self {
        Self(texts.into_iter().map(ContextEntry::system).collect())
    }
}

impl From<Vec<ContextEntry>> for SystemContext {
    fn from(entries: Vec<ContextEntry>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|e| ContextEntry::system(e.content))
                .collect(),
        )
    }
}

/// What a caller does when run.
#[derive(Clone)]
pub enum CallerKind {
    /// Pass the input through unchanged
    Identity,
    /// Apply a Rust function
    Programmatic(Arc<TransformFn>),
    /// Ask a text-generation backend
    Llm {
        context: SystemContext,
        fetcher: Arc<dyn Fetcher>,
    },
}

impl CallerKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallerKind::Identity => "identity",
            CallerKind::Programmatic(_) => "programmatic",
            CallerKind::Llm { .. } => "llm",
        }
    }
}

impl std::fmt::Debug for CallerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerKind::Identity => f.write_str("Identity"),
            CallerKind::Programmatic(_) => f.write_str("Programmatic(..)"),
            CallerKind::Llm { context, .. } => f
                .debug_struct("Llm")
                .field("context", context)
                .finish_non_exhaustive(),
        }
    }
}

/// A named transformation unit.
///
/// Two callers are equal when they are of the same kind and share an id.
#[derive(Debug, Clone)]
pub struct Caller {
    id: String,
    kind: CallerKind,
}

impl Caller {
    pub fn identity() -> Self {
        Self {
            id: IDENTITY_ID.to_string(),
            kind: CallerKind::Identity,
        }
    }

    /// Wrap a function.
    ///
    /// The default id is a hash of the function's type name, which is its
    /// path for named `fn` items and so stays the same across builds.
    /// Closures all share their enclosing item's name, so their type id is
    /// mixed in; those ids are only stable within one build, and callers
    /// whose responses are persisted should get an explicit id through
    /// [`Caller::with_id`].
    pub fn programmatic<F, T>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Into<Transformed>,
    {
        let id = content_hash(function_key::<F>().as_bytes());
        let wrapped = move |value: &Value| -> Result<Transformed, BoxError> { f(value).map(Into::into) };
        Self {
            id,
            kind: CallerKind::Programmatic(Arc::new(wrapped)),
        }
    }

    /// Wrap a text-generation backend. The default id is a hash of the
    /// normalized system context.
    pub fn llm(context: impl Into<SystemContext>, fetcher: Arc<dyn Fetcher>) -> Self {
        let context = context.into();
        let id = content_hash(
            context
                .entries()
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
                .as_bytes(),
        );
        Self {
            id,
            kind: CallerKind::Llm { context, fetcher },
        }
    }

    /// Wrap a backend built from `config`, refusing the caller when the
    /// config is invalid so no fetch is ever issued against it.
    pub fn configured_llm(
        context: impl Into<SystemContext>,
        fetcher: Arc<dyn Fetcher>,
        config: &FetchConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::debug!(model = %config.model, url = %config.url(), "caller.configured_llm");
        Ok(Self::llm(context, fetcher))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &CallerKind {
        &self.kind
    }

    /// System context of an LLM caller.
    pub fn context(&self) -> Option<&[ContextEntry]> {
        match &self.kind {
            CallerKind::Llm { context, .. } => Some(context.entries()),
            _ => None,
        }
    }

    /// Transform `content` and record the result as a new response.
    pub async fn run(self: &Arc<Self>, content: impl Into<Input>) -> Result<Arc<Response>, LineageError> {
        let input = content.into();
        tracing::trace!(caller = %self.id, kind = self.kind.name(), "caller.run");

        match &self.kind {
            CallerKind::Identity => {
                let output = input.value().clone();
                Ok(Response::new(output, self, input, Generator::Input))
            }
            CallerKind::Programmatic(f) => {
                let value = match &input {
                    Input::Step(response) => response.output(),
                    Input::Seed(value @ Value::String(_)) => value,
                    Input::Seed(other) => {
                        return Err(self.illegal_input("string or response", other));
                    }
                };
                match f(value) {
                    Ok(Transformed::Response(response)) => Ok(response),
                    Ok(Transformed::Value(output)) => {
                        Ok(Response::new(output, self, input, Generator::Programmatic))
                    }
                    Err(source) => {
                        tracing::debug!(caller = %self.id, error = %source, "caller.run failed");
                        Err(LineageError::transformation(&self.id, input.root_input(), source))
                    }
                }
            }
            CallerKind::Llm { context, fetcher } => {
                let text = match input.value() {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => return Err(self.illegal_input("string or number", other)),
                };
                let reply = fetcher.fetch(&text, context.entries()).await.map_err(|e| {
                    tracing::debug!(caller = %self.id, error = %e, "caller.fetch failed");
                    LineageError::transformation(&self.id, input.root_input(), e)
                })?;
                Ok(Response::new(reply, self, input, Generator::Programmatic))
            }
        }
    }

    fn illegal_input(&self, expected: &'static str, found: &Value) -> LineageError {
        LineageError::IllegalInputType {
            caller: self.id.clone(),
            expected,
            found: value_kind(found),
        }
    }
}

impl PartialEq for Caller {
    fn eq(&self, other: &Self) -> bool {
        self.kind.name() == other.kind.name() && self.id == other.id
    }
}

impl Eq for Caller {}

/// Text identifying a function type: its name, plus its type id for closures.
fn function_key<F: 'static>() -> String {
    let name = std::any::type_name::<F>();
    if name.contains("{{closure}}") {
        format!("{name}#{:?}", TypeId::of::<F>())
    } else {
        name.to_string()
    }
}

/// Truncated hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut id = hex::encode(digest);
    id.truncate(HASH_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Shout;

    #[async_trait]
    impl Fetcher for Shout {
        async fn fetch(&self, content: &str, context: &[ContextEntry]) -> Result<String, FetchError> {
            assert!(context.iter().all(|e| e.role == "system"));
            Ok(content.to_uppercase())
        }
    }

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(&self, _: &str, _: &[ContextEntry]) -> Result<String, FetchError> {
            Err(FetchError::Connection {
                endpoint: "http://localhost:11434".into(),
                reason: "refused".into(),
            })
        }
    }

    fn upper(value: &Value) -> Result<Value, BoxError> {
        let text = value.as_str().ok_or("expected text")?;
        Ok(json!(text.to_uppercase()))
    }

    fn reverse(value: &Value) -> Result<String, BoxError> {
        let text = value.as_str().ok_or("expected text")?;
        Ok(text.chars().rev().collect())
    }

    #[tokio::test]
    async fn test_identity_passes_value_through() {
        let id = Arc::new(Caller::identity());
        let r = id.run("hello").await.unwrap();
        assert_eq!(r.output(), &json!("hello"));
        assert_eq!(r.generator(), Generator::Input);

        let again = id.run(&r).await.unwrap();
        assert_eq!(again.output(), &json!("hello"));
        assert_eq!(again.level(), 2);

        let odd = id.run(json!([1, 2])).await.unwrap();
        assert_eq!(odd.output(), &json!([1, 2]));
    }

    #[tokio::test]
    async fn test_programmatic_chain() {
        let up = Arc::new(Caller::programmatic(upper));
        let rev = Arc::new(Caller::programmatic(reverse));
        assert_ne!(up.id(), rev.id());

        let first = up.run("abc").await.unwrap();
        let second = rev.run(&first).await.unwrap();
        assert_eq!(second.output(), &json!("CBA"));
        assert_eq!(second.generator(), Generator::Programmatic);
        assert_eq!(second.root_input(), &json!("abc"));
        assert_eq!(second.caller_id(), rev.id());
    }

    #[tokio::test]
    async fn test_programmatic_rejects_non_string_seed() {
        let up = Arc::new(Caller::programmatic(upper));
        let err = up.run(json!(42)).await.unwrap_err();
        assert!(matches!(
            err,
            LineageError::IllegalInputType { found: "number", .. }
        ));
    }

    #[tokio::test]
    async fn test_programmatic_failure_carries_root_input() {
        let up = Arc::new(Caller::programmatic(upper).with_id("upper"));
        let id = Arc::new(Caller::identity());
        let start = Response::import(json!({"not": "text"}), &id, "original");
        let err = up.run(&start).await.unwrap_err();
        match err {
            LineageError::Transformation {
                caller, root_input, ..
            } => {
                assert_eq!(caller, "upper");
                assert_eq!(root_input, "\"original\"");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_programmatic_returning_response_is_not_rewrapped() {
        let id = Arc::new(Caller::identity());
        let prebuilt = Response::import("prebuilt", &id, "elsewhere");
        let keep = Arc::clone(&prebuilt);
        let passthrough = Arc::new(
            Caller::programmatic(move |_: &Value| Ok::<_, BoxError>(Arc::clone(&keep)))
                .with_id("passthrough"),
        );
        let out = passthrough.run("ignored").await.unwrap();
        assert!(Arc::ptr_eq(&out, &prebuilt));
    }

    #[tokio::test]
    async fn test_llm_caller_delegates_to_fetcher() {
        let llm = Arc::new(Caller::llm("Answer loudly.", Arc::new(Shout)));
        assert_eq!(llm.context().unwrap(), &[ContextEntry::system("Answer loudly.")]);

        let r = llm.run("quiet").await.unwrap();
        assert_eq!(r.output(), &json!("QUIET"));

        let n = llm.run(json!(7)).await.unwrap();
        assert_eq!(n.output(), &json!("7"));

        assert!(matches!(
            llm.run(json!({"a": 1})).await,
            Err(LineageError::IllegalInputType { .. })
        ));
    }

    #[tokio::test]
    async fn test_llm_fetch_failure_is_transformation_error() {
        let llm = Arc::new(Caller::llm(vec!["a", "b"], Arc::new(Offline)));
        assert_eq!(llm.context().unwrap().len(), 2);
        let err = llm.run("seed").await.unwrap_err();
        assert!(matches!(err, LineageError::Transformation { .. }));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_llm_default_id_follows_context() {
        let a = Caller::llm("same", Arc::new(Shout));
        let b = Caller::llm("same", Arc::new(Offline));
        let c = Caller::llm("different", Arc::new(Shout));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().len(), HASH_ID_LEN);
    }

    #[test]
    fn test_named_function_id_is_stable() {
        let a = Caller::programmatic(upper);
        let b = Caller::programmatic(upper);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), content_hash(std::any::type_name_of_val(&upper).as_bytes()));
    }

    #[test]
    fn test_closures_in_one_item_get_distinct_ids() {
        let shout = Caller::programmatic(|v: &Value| Ok::<_, BoxError>(json!(v.to_string().to_uppercase())));
        let count = Caller::programmatic(|v: &Value| Ok::<_, BoxError>(json!(v.to_string().len())));
        assert_ne!(shout.id(), count.id());

        let mut registry = crate::registry::CallerRegistry::new();
        registry.register(shout).unwrap();
        registry.register(count).unwrap();
        assert_eq!(registry.len(), 2);
    }

    fn backend_config(port: u16) -> FetchConfig {
        FetchConfig {
            model: "llama3".into(),
            path: "http://localhost".into(),
            port,
            endpoint: "/api/chat".into(),
            settings: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_configured_llm_validates_first() {
        let llm = Arc::new(Caller::configured_llm("Answer loudly.", Arc::new(Shout), &backend_config(11434)).unwrap());
        assert_eq!(llm.run("ok").await.unwrap().output(), &json!("OK"));

        let err = Caller::configured_llm("Answer loudly.", Arc::new(Shout), &backend_config(0)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "port", .. }));
    }

    #[test]
    fn test_equality_is_kind_and_id() {
        let a = Caller::identity().with_id("x");
        let b = Caller::identity().with_id("x");
        let c = Caller::programmatic(upper).with_id("x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_context_entries_normalized_to_system() {
        let ctx = SystemContext::from(vec![ContextEntry::user("hi")]);
        assert_eq!(ctx.entries()[0].role, "system");
    }
}

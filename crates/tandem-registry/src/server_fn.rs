//! Server-only functions invokable by reference id.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tandem_core::Node;

/// What a server function asks the caller to do with its result.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Plain value serialized back to the caller.
    Value(Value),
    /// The caller should navigate to this location.
    Redirect(String),
    /// The caller should treat this tree as a fresh render.
    Rerender(Node),
}

/// Arguments that could not be decoded into the function's input type.
///
/// Returned inside `anyhow::Error` so the action channel can tell a bad
/// request apart from a failing function.
#[derive(Debug, thiserror::Error)]
#[error("invalid arguments for {function}: {message}")]
pub struct InvalidArguments {
    /// Function name.
    pub function: String,
    /// Decoder message.
    pub message: String,
}

/// Future returned by a server function.
pub type ServerFnFuture = BoxFuture<'static, anyhow::Result<ActionOutcome>>;

type Handler = Arc<dyn Fn(Value) -> ServerFnFuture + Send + Sync>;

/// A registered server function.
#[derive(Clone)]
pub struct ServerFunction {
    name: String,
    handler: Handler,
}

impl ServerFunction {
    /// Wrap a raw handler taking the serialized argument list.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ActionOutcome>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// Wrap a function whose whole argument list decodes into `A` and whose
    /// result is returned as a plain value.
    pub fn typed<A, R, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        let f = Arc::new(f);
        Self::new(name, move |args: Value| {
            let decoded = decode_args::<A>(&fn_name, args);
            let f = Arc::clone(&f);
            async move {
                let result = f(decoded?).await?;
                Ok(ActionOutcome::Value(serde_json::to_value(result)?))
            }
        })
    }

    /// Wrap a single-argument function. The argument list must hold exactly
    /// one element (a bare non-array value is accepted too).
    pub fn unary<A, R, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        let f = Arc::new(f);
        Self::new(name, move |args: Value| {
            let decoded = single_arg(&fn_name, args).and_then(|arg| decode_args::<A>(&fn_name, arg));
            let f = Arc::clone(&f);
            async move {
                let result = f(decoded?).await?;
                Ok(ActionOutcome::Value(serde_json::to_value(result)?))
            }
        })
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with serialized arguments.
    pub fn call(&self, args: Value) -> ServerFnFuture {
        (self.handler)(args)
    }
}

impl fmt::Debug for ServerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn decode_args<A: DeserializeOwned>(function: &str, args: Value) -> anyhow::Result<A> {
    serde_json::from_value(args).map_err(|e| {
        InvalidArguments {
            function: function.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn single_arg(function: &str, args: Value) -> anyhow::Result<Value> {
    match args {
        Value::Array(mut items) if items.len() == 1 => Ok(items.remove(0)),
        Value::Array(items) => Err(InvalidArguments {
            function: function.to_string(),
            message: format!("expected 1 argument, got {}", items.len()),
        }
        .into()),
        other => Ok(other),
    }
}

use crate::pipe::{ArgumentMetadata, Pipe, PipeError, PipeResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Parses a numeric string into an integer
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseIntPipe;

#[async_trait]
impl Pipe for ParseIntPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        let parsed = match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => return Ok(value),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Value::from)
            .ok_or_else(|| PipeError::Validation("Validation failed (numeric string is expected)".into()))
    }
}

/// Parses a numeric string into a float
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseFloatPipe;

#[async_trait]
impl Pipe for ParseFloatPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        let parsed = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };
        parsed
            .map(Value::from)
            .ok_or_else(|| PipeError::Validation("Validation failed (numeric string is expected)".into()))
    }
}

/// Accepts `true`/`false` as booleans or strings
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseBoolPipe;

#[async_trait]
impl Pipe for ParseBoolPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(PipeError::Validation(
                "Validation failed (boolean string is expected)".into(),
            )),
        }
    }
}

/// Validates a UUID and normalizes it to lowercase hyphenated form
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseUuidPipe;

#[async_trait]
impl Pipe for ParseUuidPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(|id| Value::String(id.hyphenated().to_string()))
            .ok_or_else(|| PipeError::Validation("Validation failed (uuid is expected)".into()))
    }
}

/// Substitutes a default when the argument is missing
#[derive(Debug, Clone)]
pub struct DefaultValuePipe {
    default: Value,
}

impl DefaultValuePipe {
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: default.into(),
        }
    }
}

#[async_trait]
impl Pipe for DefaultValuePipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        match value {
            Value::Null => Ok(self.default.clone()),
            other => Ok(other),
        }
    }
}

/// Rejects arguments that do not deserialize into `T`
///
/// The value itself passes through unchanged.
pub struct ValidationPipe<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValidationPipe<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ValidationPipe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: DeserializeOwned + 'static> Pipe for ValidationPipe<T> {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
        match T::deserialize(&value) {
            Ok(_) => Ok(value),
            Err(e) => Err(PipeError::Validation(format!("Validation failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ParamSource;
    use serde::Deserialize;
    use serde_json::json;

    fn path_arg() -> ArgumentMetadata {
        ArgumentMetadata {
            source: ParamSource::Path,
            key: Some("id".into()),
            index: 0,
        }
    }

    #[tokio::test]
    async fn test_parse_int_pipe() {
        let meta = path_arg();
        assert_eq!(ParseIntPipe.transform(json!("42"), &meta).await.unwrap(), json!(42));
        assert_eq!(ParseIntPipe.transform(json!(-7), &meta).await.unwrap(), json!(-7));

        let err = ParseIntPipe.transform(json!("abc"), &meta).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed (numeric string is expected)");
        assert!(ParseIntPipe.transform(json!("4.2"), &meta).await.is_err());
        assert!(ParseIntPipe.transform(Value::Null, &meta).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_float_and_bool_pipes() {
        let meta = path_arg();
        assert_eq!(ParseFloatPipe.transform(json!("2.5"), &meta).await.unwrap(), json!(2.5));
        assert!(ParseFloatPipe.transform(json!("NaN"), &meta).await.is_err());
        assert_eq!(ParseBoolPipe.transform(json!("true"), &meta).await.unwrap(), json!(true));
        assert!(ParseBoolPipe.transform(json!("yes"), &meta).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_uuid_pipe_normalizes() {
        let meta = path_arg();
        let upper = "67E55044-10B1-426F-9247-BB680E5FE0C8";
        assert_eq!(
            ParseUuidPipe.transform(json!(upper), &meta).await.unwrap(),
            json!("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        assert!(ParseUuidPipe.transform(json!("not-a-uuid"), &meta).await.is_err());
    }

    #[tokio::test]
    async fn test_default_value_pipe_only_fills_missing() {
        let pipe = DefaultValuePipe::new(10);
        let meta = path_arg();
        assert_eq!(pipe.transform(Value::Null, &meta).await.unwrap(), json!(10));
        assert_eq!(pipe.transform(json!("3"), &meta).await.unwrap(), json!("3"));
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct CreateCat {
        name: String,
        age: u8,
    }

    #[tokio::test]
    async fn test_validation_pipe() {
        let pipe = ValidationPipe::<CreateCat>::new();
        let meta = ArgumentMetadata {
            source: ParamSource::Body,
            key: None,
            index: 0,
        };
        let valid = json!({ "name": "Tom", "age": 3 });
        assert_eq!(pipe.transform(valid.clone(), &meta).await.unwrap(), valid);

        let err = pipe.transform(json!({ "name": "Tom" }), &meta).await.unwrap_err();
        assert!(err.to_string().contains("missing field `age`"));
    }
}

//! JSON loading with the failing field's path in the error.
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("at JSON path {path} → {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl PathError {
    fn from_track(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        Self { path, message: err.into_inner().to_string() }
    }
}

pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(PathError::from_track)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(PathError::from_track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeGraph;

    #[test]
    fn errors_name_the_failing_node() {
        let src = r#"{ "nodes": [ { "kind": "string" }, { "kind": "array" } ] }"#;
        let err = from_str_with_path::<TypeGraph>(src).unwrap_err();
        assert!(err.path.starts_with("nodes[1]"), "{}", err.path);
    }
}

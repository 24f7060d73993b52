//! JSON encoding of entity records.

use bytes::Bytes;
use qdb_coordination::path;
use serde_json::{Map, Value};

use crate::{Entity, RepositoryError};

/// Field holding the id in the serialized form of every entity.
const ID_FIELD: &str = "id";

/// Encodes the body of `entity`. The id is not part of the body.
pub fn encode<E: Entity>(record_path: &str, entity: &E) -> Result<Bytes, RepositoryError> {
    let mut body = to_object::<E>(record_path, serde_json::to_value(entity))?;
    body.remove(ID_FIELD);

    serde_json::to_vec(&body)
        .map(Bytes::from)
        .map_err(|e| codec_error::<E>(record_path, e.to_string()))
}

/// Decodes the body stored at `record_path`, taking the id from the path's
/// last segment.
pub fn decode<E: Entity>(record_path: &str, body: &[u8]) -> Result<E, RepositoryError> {
    let mut body = to_object::<E>(record_path, serde_json::from_slice(body))?;
    body.insert(
        ID_FIELD.to_string(),
        Value::String(path::last_segment(record_path).to_string()),
    );

    serde_json::from_value(Value::Object(body))
        .map_err(|e| codec_error::<E>(record_path, e.to_string()))
}

fn to_object<E: Entity>(
    record_path: &str,
    value: serde_json::Result<Value>,
) -> Result<Map<String, Value>, RepositoryError> {
    match value {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(codec_error::<E>(
            record_path,
            format!("expected an object, found {other}"),
        )),
        Err(e) => Err(codec_error::<E>(record_path, e.to_string())),
    }
}

fn codec_error<E: Entity>(record_path: &str, reason: String) -> RepositoryError {
    RepositoryError::Codec {
        kind: E::KIND,
        path: record_path.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Queue, User};
    use assert_matches::assert_matches;

    #[test]
    fn test_body_excludes_id() {
        let user = User::new("alice", "hash", true);
        let body = encode("/qdb/c1/users/alice", &user).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "passwordHash": "hash", "isAdmin": true })
        );

        // The caller's instance is untouched.
        assert_eq!(user.id, "alice");
    }

    #[test]
    fn test_decode_injects_id_from_path() {
        let body = br#"{"database":"orders","name":"incoming"}"#;
        let queue: Queue = decode("/qdb/c1/queues/q-17", body).unwrap();

        assert_eq!(queue.id, "q-17");
        assert_eq!(queue.database, "orders");
        assert_eq!(queue.name, "incoming");
    }

    #[test]
    fn test_decode_ignores_stray_id_field() {
        let body = br#"{"id":"mallory","passwordHash":"h","isAdmin":false}"#;
        let user: User = decode("/qdb/c1/users/alice", body).unwrap();
        assert_eq!(user.id, "alice");
    }

    #[test]
    fn test_non_object_body() {
        let result: Result<User, _> = decode("/qdb/c1/users/alice", b"[1, 2]");
        assert_matches!(result, Err(RepositoryError::Codec { kind: "user", .. }));
    }

    #[test]
    fn test_corrupt_body() {
        let result: Result<User, _> = decode("/qdb/c1/users/alice", b"not json");
        assert_matches!(
            result,
            Err(RepositoryError::Codec { kind: "user", path, .. }) if path == "/qdb/c1/users/alice"
        );
    }
}

//! 컬럼 암호화 코덱
//!
//! - ChaCha20-Poly1305 / XChaCha20-Poly1305 AEAD 암호화
//! - 버전이 붙은 암호문 봉투 `enc:<alg>:<version>:<base64(nonce || ciphertext)>`
//! - 동등 검색용 keyed SHA-256 해시 컬럼

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, XChaCha20Poly1305, XNonce};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::security::key_manager::{KeyEntry, KeyProvider, KeyRing};
use crate::service::db::core::types::Row;
use crate::service::db::query::dialect::split_alias;
use crate::service::db::query::{Condition, ConditionGroup, ConditionNode, CteBody, Operator, QuerySpec};
use crate::tool::error::DataError;

const ENVELOPE_PREFIX: &str = "enc";

/// 암호 알고리즘
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
    #[serde(rename = "xchacha20poly1305")]
    XChaCha20Poly1305,
}

impl CipherAlgorithm {
    fn tag(&self) -> &'static str {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => "c20p",
            CipherAlgorithm::XChaCha20Poly1305 => "xc20p",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "c20p" => Some(CipherAlgorithm::ChaCha20Poly1305),
            "xc20p" => Some(CipherAlgorithm::XChaCha20Poly1305),
            _ => None,
        }
    }

    fn nonce_len(&self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => 12,
            CipherAlgorithm::XChaCha20Poly1305 => 24,
        }
    }
}

/// 테이블의 암호화 컬럼 등록 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedColumnSpec {
    pub column: String,
    #[serde(default)]
    pub algorithm: CipherAlgorithm,
    /// 고정 키 버전 (없으면 활성 키)
    #[serde(default)]
    pub key_version: Option<u32>,
    /// 동등 검색용 해시 컬럼
    #[serde(default)]
    pub hash_column: Option<String>,
}

impl EncryptedColumnSpec {
    /// `<column>_hash` 해시 컬럼을 갖는 검색 가능 컬럼
    pub fn searchable(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            hash_column: Some(format!("{column}_hash")),
            column,
            algorithm: CipherAlgorithm::default(),
            key_version: None,
        }
    }

    /// 검색 불가 컬럼
    pub fn opaque(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            algorithm: CipherAlgorithm::default(),
            key_version: None,
            hash_column: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: CipherAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

type TableKey = (String, String);

/// 암호화 코덱
pub struct EncryptionCodec {
    keys: Arc<KeyRing>,
    columns: DashMap<TableKey, Vec<EncryptedColumnSpec>>,
    hash_pepper: Vec<u8>,
    default_algorithm: CipherAlgorithm,
}

impl EncryptionCodec {
    pub fn new(keys: Arc<KeyRing>, hash_pepper: impl Into<Vec<u8>>, default_algorithm: CipherAlgorithm) -> Self {
        Self {
            keys,
            columns: DashMap::new(),
            hash_pepper: hash_pepper.into(),
            default_algorithm,
        }
    }

    pub fn from_provider(
        provider: &dyn KeyProvider,
        hash_pepper: impl Into<Vec<u8>>,
        default_algorithm: CipherAlgorithm,
    ) -> Result<Self, DataError> {
        let keys = KeyRing::from_provider(provider)?;
        Ok(Self::new(Arc::new(keys), hash_pepper, default_algorithm))
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    pub fn default_algorithm(&self) -> CipherAlgorithm {
        self.default_algorithm
    }

    /// 새 키 버전을 만들고 활성화합니다. 이전 암호문은 계속 복호화됩니다.
    pub fn rotate_key(&self, bytes: Option<Vec<u8>>) -> Result<u32, DataError> {
        self.keys.rotate(bytes)
    }

    /// 단독 값 암호화 (연결 이름이 AAD로 묶임)
    pub fn encrypt(&self, connection: &str, plaintext: &str) -> Result<String, DataError> {
        let key = self.keys.active();
        self.seal(self.default_algorithm, &key, plaintext.as_bytes(), connection.as_bytes())
    }

    /// 단독 값 복호화
    pub fn decrypt(&self, connection: &str, ciphertext: &str) -> Result<String, DataError> {
        let bytes = self.open(ciphertext, connection.as_bytes())?;
        String::from_utf8(bytes).map_err(|_| DataError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    pub fn is_envelope(value: &str) -> bool {
        value.starts_with("enc:")
    }

    pub fn register_column(&self, connection: &str, table: &str, spec: EncryptedColumnSpec) {
        debug!("암호화 컬럼 등록: {}.{}.{}", connection, table, spec.column);
        let mut specs = self
            .columns
            .entry((connection.to_string(), table.to_string()))
            .or_default();
        specs.retain(|existing| existing.column != spec.column);
        specs.push(spec);
    }

    pub fn unregister_column(&self, connection: &str, table: &str, column: &str) {
        if let Some(mut specs) = self.columns.get_mut(&(connection.to_string(), table.to_string())) {
            specs.retain(|spec| spec.column != column);
        }
    }

    pub fn rename_column(&self, connection: &str, table: &str, from: &str, to: &str) {
        if let Some(mut specs) = self.columns.get_mut(&(connection.to_string(), table.to_string())) {
            for spec in specs.iter_mut().filter(|spec| spec.column == from) {
                spec.column = to.to_string();
            }
        }
    }

    pub fn unregister_table(&self, connection: &str, table: &str) {
        self.columns.remove(&(connection.to_string(), table.to_string()));
    }

    pub fn columns(&self, connection: &str, table: &str) -> Vec<EncryptedColumnSpec> {
        self.columns
            .get(&(connection.to_string(), table.to_string()))
            .map(|specs| specs.clone())
            .unwrap_or_default()
    }

    pub fn column(&self, connection: &str, table: &str, column: &str) -> Option<EncryptedColumnSpec> {
        self.columns(connection, table)
            .into_iter()
            .find(|spec| spec.column == column)
    }

    /// 검색용 결정적 해시 (hex)
    ///
    /// JSON 직렬화 값을 해시하므로 `"5"`와 `5`는 서로 다른 값입니다.
    pub fn hash_value(&self, value: &Value) -> String {
        let canonical = value.to_string();
        let mut hasher = Sha256::new();
        hasher.update(&self.hash_pepper);
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// 등록된 컬럼을 암호화하고 해시 컬럼을 채웁니다. 행에 없는 컬럼은 건드리지 않습니다.
    pub fn encrypt_row(&self, connection: &str, table: &str, mut row: Row) -> Result<Row, DataError> {
        for spec in self.columns(connection, table) {
            let Some(value) = row.get(&spec.column).cloned() else {
                continue;
            };

            if value.is_null() {
                if let Some(hash_column) = &spec.hash_column {
                    row.insert(hash_column.clone(), Value::Null);
                }
                continue;
            }

            let key = match spec.key_version {
                Some(version) => self.keys.get(version).ok_or_else(|| {
                    DataError::Encryption(format!(
                        "key version {version} for {table}.{} is not configured",
                        spec.column
                    ))
                })?,
                None => self.keys.active(),
            };
            let plaintext = serde_json::to_vec(&value).map_err(|e| DataError::Encryption(e.to_string()))?;
            let envelope = self.seal(spec.algorithm, &key, &plaintext, column_aad(table, &spec.column).as_bytes())?;

            if let Some(hash_column) = &spec.hash_column {
                row.insert(hash_column.clone(), Value::String(self.hash_value(&value)));
            }
            row.insert(spec.column.clone(), Value::String(envelope));
        }
        Ok(row)
    }

    /// 등록된 컬럼을 복호화하고 해시 컬럼을 결과에서 제거합니다.
    ///
    /// 봉투 형식이 아닌 값(암호화 도입 이전 데이터)은 그대로 둡니다.
    pub fn decrypt_row(&self, connection: &str, table: &str, mut row: Row) -> Result<Row, DataError> {
        for spec in self.columns(connection, table) {
            if let Some(hash_column) = &spec.hash_column {
                row.remove(hash_column);
            }

            let envelope = match row.get(&spec.column) {
                Some(Value::String(text)) if Self::is_envelope(text) => text.clone(),
                _ => continue,
            };
            let plaintext = self.open(&envelope, column_aad(table, &spec.column).as_bytes())?;
            let value: Value = serde_json::from_slice(&plaintext)
                .map_err(|e| DataError::Decryption(format!("{table}.{}: {e}", spec.column)))?;
            row.insert(spec.column.clone(), value);
        }
        Ok(row)
    }

    /// 암호화 컬럼에 대한 조건을 해시 컬럼 조건으로 바꿉니다.
    ///
    /// `=`, `!=`, `IN`, `NOT IN`, `IS NULL`만 허용됩니다.
    pub fn searchable_conditions(
        &self,
        connection: &str,
        table: &str,
        conditions: &[Condition],
    ) -> Result<Vec<Condition>, DataError> {
        let specs = self.columns(connection, table);
        if specs.is_empty() {
            return Ok(conditions.to_vec());
        }
        conditions
            .iter()
            .map(|condition| self.rewrite_condition(condition, &specs))
            .collect()
    }

    /// 본문 조건, JOIN 필터, UNION, CTE 조건을 각자 참조하는 테이블 기준으로 변환합니다.
    pub fn searchable_query(&self, connection: &str, table: &str, spec: &QuerySpec) -> Result<QuerySpec, DataError> {
        let mut spec = spec.clone();
        self.rewrite_query(connection, table, &mut spec)?;
        Ok(spec)
    }

    fn rewrite_query(&self, connection: &str, table: &str, spec: &mut QuerySpec) -> Result<(), DataError> {
        spec.conditions = self.searchable_conditions(connection, split_alias(table).0, &spec.conditions)?;
        for join in &mut spec.joins {
            join.filters = self.searchable_conditions(connection, split_alias(&join.table).0, &join.filters)?;
        }
        for cte in &mut spec.with {
            if let CteBody::Query { table, query } = &mut cte.body {
                self.rewrite_query(connection, table.as_str(), query)?;
            }
        }
        if let Some(union) = spec.union.as_deref_mut() {
            self.rewrite_query(connection, union.table.as_str(), &mut union.query)?;
        }
        Ok(())
    }

    fn rewrite_condition(&self, condition: &Condition, specs: &[EncryptedColumnSpec]) -> Result<Condition, DataError> {
        let node = match condition {
            Condition::Group(group) => {
                let rewritten = group
                    .group
                    .iter()
                    .map(|inner| self.rewrite_condition(inner, specs))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Condition::Group(ConditionGroup {
                    group: rewritten,
                    boolean: group.boolean,
                }));
            }
            Condition::Node(node) => node,
        };

        let (qualifier, column) = match node.column.rsplit_once('.') {
            Some((qualifier, column)) => (Some(qualifier), column),
            None => (None, node.column.as_str()),
        };
        let Some(spec) = specs.iter().find(|spec| spec.column == column) else {
            return Ok(condition.clone());
        };

        let operator: Operator = node.operator.parse()?;
        match operator {
            Operator::IsNull | Operator::IsNotNull => Ok(condition.clone()),
            Operator::Eq | Operator::Ne | Operator::In | Operator::NotIn => {
                let hash_column = spec.hash_column.as_ref().ok_or_else(|| {
                    DataError::QuerySpec(format!("encrypted column '{}' is not searchable", node.column))
                })?;
                let target = match qualifier {
                    Some(qualifier) => format!("{qualifier}.{hash_column}"),
                    None => hash_column.clone(),
                };
                let value = match &node.value {
                    Value::Array(items) => Value::Array(items.iter().map(|item| self.hash_operand(item)).collect()),
                    other => self.hash_operand(other),
                };
                Ok(Condition::Node(ConditionNode {
                    column: target,
                    operator: node.operator.clone(),
                    value,
                    boolean: node.boolean,
                }))
            }
            _ => Err(DataError::QuerySpec(format!(
                "encrypted column '{}' only supports equality lookups",
                node.column
            ))),
        }
    }

    fn hash_operand(&self, value: &Value) -> Value {
        if value.is_null() {
            Value::Null
        } else {
            Value::String(self.hash_value(value))
        }
    }

    fn seal(&self, algorithm: CipherAlgorithm, key: &KeyEntry, plaintext: &[u8], aad: &[u8]) -> Result<String, DataError> {
        let payload = Payload { msg: plaintext, aad };
        let (mut blob, ciphertext) = match algorithm {
            CipherAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.key());
                let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, payload)
                    .map_err(|_| DataError::Encryption("cipher rejected the payload".to_string()))?;
                (nonce.to_vec(), ciphertext)
            }
            CipherAlgorithm::XChaCha20Poly1305 => {
                let cipher = XChaCha20Poly1305::new(key.key());
                let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, payload)
                    .map_err(|_| DataError::Encryption("cipher rejected the payload".to_string()))?;
                (nonce.to_vec(), ciphertext)
            }
        };
        blob.extend_from_slice(&ciphertext);

        Ok(format!(
            "{ENVELOPE_PREFIX}:{}:{}:{}",
            algorithm.tag(),
            key.version,
            general_purpose::STANDARD.encode(blob)
        ))
    }

    fn open(&self, envelope: &str, aad: &[u8]) -> Result<Vec<u8>, DataError> {
        let malformed = || DataError::Decryption("malformed ciphertext envelope".to_string());

        let mut parts = envelope.splitn(4, ':');
        let (Some(prefix), Some(tag), Some(version), Some(body)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if prefix != ENVELOPE_PREFIX {
            return Err(malformed());
        }

        let algorithm = CipherAlgorithm::from_tag(tag)
            .ok_or_else(|| DataError::Decryption(format!("unknown cipher algorithm '{tag}'")))?;
        let version = version.parse::<u32>().map_err(|_| malformed())?;
        let key = self
            .keys
            .get(version)
            .ok_or_else(|| DataError::Decryption(format!("unknown key version {version}")))?;
        let blob = general_purpose::STANDARD.decode(body).map_err(|_| malformed())?;
        if blob.len() < algorithm.nonce_len() {
            return Err(malformed());
        }

        let (nonce, ciphertext) = blob.split_at(algorithm.nonce_len());
        let payload = Payload { msg: ciphertext, aad };
        let plaintext = match algorithm {
            CipherAlgorithm::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(key.key()).decrypt(Nonce::from_slice(nonce), payload)
            }
            CipherAlgorithm::XChaCha20Poly1305 => {
                XChaCha20Poly1305::new(key.key()).decrypt(XNonce::from_slice(nonce), payload)
            }
        };
        plaintext.map_err(|_| DataError::Decryption("authentication failed".to_string()))
    }
}

fn column_aad(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::key_manager::KeyMaterial;
    use crate::service::db::core::config::EncryptionConfig;
    use serde_json::json;

    fn codec() -> EncryptionCodec {
        let config = EncryptionConfig {
            keys: vec![KeyMaterial::generate(1)],
            active_version: None,
            hash_pepper: "pepper".into(),
            default_algorithm: CipherAlgorithm::default(),
        };
        EncryptionCodec::from_provider(&config, config.hash_pepper.as_bytes(), config.default_algorithm).unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_round_trip_including_empty_and_multibyte() {
        let codec = codec();
        for plaintext in ["hello", "", "안녕하세요 🌏"] {
            let ciphertext = codec.encrypt("central", plaintext).unwrap();
            assert!(EncryptionCodec::is_envelope(&ciphertext));
            assert_eq!(codec.decrypt("central", &ciphertext).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let codec = codec();
        let a = codec.encrypt("central", "hello").unwrap();
        let b = codec.encrypt("central", "hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampering_and_wrong_binding_fail() {
        let codec = codec();
        let ciphertext = codec.encrypt("central", "hello").unwrap();

        assert!(matches!(codec.decrypt("tenant_a", &ciphertext), Err(DataError::Decryption(_))));
        assert!(matches!(codec.decrypt("central", "enc:c20p:1:AAAA"), Err(DataError::Decryption(_))));
        assert!(matches!(codec.decrypt("central", "not an envelope"), Err(DataError::Decryption(_))));

        let unknown_version = ciphertext.replacen(":1:", ":9:", 1);
        assert!(matches!(
            codec.decrypt("central", &unknown_version),
            Err(DataError::Decryption(message)) if message.contains("unknown key version 9")
        ));
    }

    #[test]
    fn test_rotation_keeps_old_ciphertext_readable() {
        let codec = codec();
        let old = codec.encrypt("central", "before").unwrap();
        assert_eq!(codec.rotate_key(None).unwrap(), 2);

        let new = codec.encrypt("central", "after").unwrap();
        assert!(new.starts_with("enc:c20p:2:"));
        assert_eq!(codec.decrypt("central", &old).unwrap(), "before");
        assert_eq!(codec.decrypt("central", &new).unwrap(), "after");
    }

    #[test]
    fn test_xchacha_columns() {
        let codec = codec();
        codec.register_column(
            "central",
            "notes",
            EncryptedColumnSpec::opaque("body").with_algorithm(CipherAlgorithm::XChaCha20Poly1305),
        );
        let sealed = codec.encrypt_row("central", "notes", row(json!({"body": "text"}))).unwrap();
        assert!(sealed["body"].as_str().unwrap().starts_with("enc:xc20p:1:"));
        let opened = codec.decrypt_row("central", "notes", sealed).unwrap();
        assert_eq!(opened["body"], json!("text"));
    }

    #[test]
    fn test_row_encryption_fills_hash_and_preserves_types() {
        let codec = codec();
        codec.register_column("central", "users", EncryptedColumnSpec::searchable("secret"));
        codec.register_column("central", "users", EncryptedColumnSpec::opaque("pin"));

        let sealed = codec
            .encrypt_row("central", "users", row(json!({"id": 1, "secret": "hello", "pin": 1234})))
            .unwrap();
        assert_ne!(sealed["secret"], json!("hello"));
        assert_eq!(sealed["secret_hash"], json!(codec.hash_value(&json!("hello"))));
        assert_eq!(sealed["id"], json!(1));

        let opened = codec.decrypt_row("central", "users", sealed).unwrap();
        assert_eq!(opened, row(json!({"id": 1, "secret": "hello", "pin": 1234})));
    }

    #[test]
    fn test_row_binding_prevents_column_swap() {
        let codec = codec();
        codec.register_column("central", "users", EncryptedColumnSpec::opaque("a"));
        codec.register_column("central", "users", EncryptedColumnSpec::opaque("b"));

        let sealed = codec
            .encrypt_row("central", "users", row(json!({"a": "x", "b": "y"})))
            .unwrap();
        let swapped = row(json!({"a": sealed["b"].clone(), "b": sealed["a"].clone()}));
        assert!(codec.decrypt_row("central", "users", swapped).is_err());
    }

    #[test]
    fn test_search_rewrites_to_hash_column() {
        let codec = codec();
        codec.register_column("central", "users", EncryptedColumnSpec::searchable("secret"));
        codec.register_column("central", "users", EncryptedColumnSpec::opaque("pin"));

        let rewritten = codec
            .searchable_conditions(
                "central",
                "users",
                &[Condition::eq("secret", "hello"), Condition::eq("id", 3)],
            )
            .unwrap();
        assert_eq!(
            rewritten,
            vec![
                Condition::eq("secret_hash", codec.hash_value(&json!("hello"))),
                Condition::eq("id", 3)
            ]
        );

        let range = codec.searchable_conditions("central", "users", &[Condition::new("secret", ">", "a")]);
        assert!(matches!(range, Err(DataError::QuerySpec(_))));

        let opaque = codec.searchable_conditions("central", "users", &[Condition::eq("pin", 1)]);
        assert!(matches!(opaque, Err(DataError::QuerySpec(_))));
    }

    #[test]
    fn test_hash_is_keyed_by_pepper() {
        let a = codec();
        let config = EncryptionConfig {
            keys: vec![KeyMaterial::generate(1)],
            active_version: None,
            hash_pepper: "other".into(),
            default_algorithm: CipherAlgorithm::default(),
        };
        let b = EncryptionCodec::from_provider(&config, "other", CipherAlgorithm::default()).unwrap();
        assert_ne!(a.hash_value(&json!("x")), b.hash_value(&json!("x")));
        assert_eq!(a.hash_value(&json!("x")), a.hash_value(&json!("x")));
    }

    #[test]
    fn test_hash_distinguishes_json_types() {
        let codec = codec();
        assert_ne!(codec.hash_value(&json!("5")), codec.hash_value(&json!(5)));
        assert_ne!(codec.hash_value(&json!("true")), codec.hash_value(&json!(true)));
        assert_eq!(codec.hash_value(&json!(5)), codec.hash_value(&json!(5)));
    }
}

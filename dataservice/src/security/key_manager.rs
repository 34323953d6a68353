use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::Key;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::service::db::core::config::EncryptionConfig;
use crate::tool::error::DataError;

/// 키 길이 (ChaCha20 계열 256bit)
pub const KEY_LENGTH: usize = 32;

/// 버전이 붙은 원본 키 바이트
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub version: u32,
    bytes: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(version: u32, bytes: Vec<u8>) -> Self {
        Self { version, bytes }
    }

    /// 새 랜덤 키
    pub fn generate(version: u32) -> Self {
        let mut bytes = vec![0u8; KEY_LENGTH];
        thread_rng().fill_bytes(&mut bytes);
        Self { version, bytes }
    }

    /// `"1:<base64>,2:<base64>"` 형식의 키 목록을 파싱합니다.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, DataError> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (version, encoded) = entry.split_once(':').ok_or_else(|| {
                    DataError::Configuration("encryption key entry must look like <version>:<base64>".to_string())
                })?;
                let version = version.trim().parse::<u32>().map_err(|_| {
                    DataError::Configuration(format!("invalid encryption key version: '{version}'"))
                })?;
                let bytes = general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
                    DataError::Configuration(format!("encryption key {version} is not valid base64: {e}"))
                })?;
                Ok(Self::new(version, bytes))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("version", &self.version)
            .field("bytes", &"***")
            .finish()
    }
}

/// 키를 공급하는 소스
pub trait KeyProvider: Send + Sync {
    fn load_keys(&self) -> Result<Vec<KeyMaterial>, DataError>;

    /// 새 암호문에 쓸 버전 (없으면 가장 높은 버전)
    fn active_version(&self) -> Option<u32> {
        None
    }
}

impl KeyProvider for EncryptionConfig {
    fn load_keys(&self) -> Result<Vec<KeyMaterial>, DataError> {
        Ok(self.keys.clone())
    }

    fn active_version(&self) -> Option<u32> {
        self.active_version
    }
}

/// 링에 등록된 키
pub struct KeyEntry {
    pub version: u32,
    pub key_id: String,
    pub created_at: DateTime<Utc>,
    key: Key,
}

impl KeyEntry {
    fn new(material: &KeyMaterial) -> Result<Self, DataError> {
        if material.bytes.len() != KEY_LENGTH {
            return Err(DataError::Configuration(format!(
                "encryption key {} must be {KEY_LENGTH} bytes, got {}",
                material.version,
                material.bytes.len()
            )));
        }

        // 키 ID 생성 (키의 해시)
        let mut hasher = Sha256::new();
        hasher.update(material.version.to_be_bytes());
        hasher.update(&material.bytes);
        let key_id = general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());

        Ok(Self {
            version: material.version,
            key_id: key_id[..16].to_string(),
            created_at: Utc::now(),
            key: Key::clone_from_slice(&material.bytes),
        })
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }
}

impl std::fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEntry")
            .field("version", &self.version)
            .field("key_id", &self.key_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

struct KeyRingState {
    entries: BTreeMap<u32, Arc<KeyEntry>>,
    active: Arc<KeyEntry>,
}

/// 버전별 키 링
///
/// 키는 추가만 되고 제거되지 않으므로 이전 버전 암호문은 계속 복호화됩니다.
pub struct KeyRing {
    state: RwLock<KeyRingState>,
}

impl KeyRing {
    pub fn from_provider(provider: &dyn KeyProvider) -> Result<Self, DataError> {
        let mut materials = provider.load_keys()?;
        if materials.is_empty() {
            warn!(
                "⚠️  No encryption keys configured. Generated an ephemeral key; \
                 data encrypted with it cannot be read after restart."
            );
            materials.push(KeyMaterial::generate(1));
        }

        let mut entries = BTreeMap::new();
        for material in &materials {
            let entry = KeyEntry::new(material)?;
            if entries.insert(entry.version, Arc::new(entry)).is_some() {
                return Err(DataError::Configuration(format!(
                    "duplicate encryption key version {}",
                    material.version
                )));
            }
        }

        let active = match provider.active_version() {
            Some(version) => entries.get(&version).cloned().ok_or_else(|| {
                DataError::Configuration(format!("active encryption key version {version} is not configured"))
            })?,
            None => entries
                .values()
                .next_back()
                .cloned()
                .ok_or_else(|| DataError::Configuration("no encryption keys".to_string()))?,
        };

        info!("🔐 Key ring initialized");
        info!("  └─ Versions: {:?}", entries.keys().collect::<Vec<_>>());
        info!("  └─ Active: {} ({})", active.version, active.key_id);

        Ok(Self {
            state: RwLock::new(KeyRingState { entries, active }),
        })
    }

    /// 현재 활성 키
    pub fn active(&self) -> Arc<KeyEntry> {
        Arc::clone(&self.state.read().active)
    }

    /// 버전으로 키 가져오기 (복호화용)
    pub fn get(&self, version: u32) -> Option<Arc<KeyEntry>> {
        self.state.read().entries.get(&version).cloned()
    }

    pub fn versions(&self) -> Vec<u32> {
        self.state.read().entries.keys().copied().collect()
    }

    /// 새 버전을 추가하고 활성화합니다. 키가 주어지지 않으면 생성합니다.
    pub fn rotate(&self, bytes: Option<Vec<u8>>) -> Result<u32, DataError> {
        let mut state = self.state.write();
        let version = state.entries.keys().next_back().copied().unwrap_or(0) + 1;
        let material = match bytes {
            Some(bytes) => KeyMaterial::new(version, bytes),
            None => KeyMaterial::generate(version),
        };
        let entry = Arc::new(KeyEntry::new(&material)?);

        state.entries.insert(version, Arc::clone(&entry));
        let previous = std::mem::replace(&mut state.active, Arc::clone(&entry));

        info!("🔄 Encryption key rotated successfully");
        info!("  └─ New version: {} ({})", entry.version, entry.key_id);
        info!("  └─ Previous version retained: {}", previous.version);

        Ok(version)
    }

    /// 이전 버전 키를 추가합니다 (활성 키는 바뀌지 않음).
    pub fn add_key(&self, material: KeyMaterial) -> Result<(), DataError> {
        let entry = KeyEntry::new(&material)?;
        let mut state = self.state.write();
        if state.entries.contains_key(&entry.version) {
            return Err(DataError::Configuration(format!(
                "encryption key version {} already exists",
                entry.version
            )));
        }
        state.entries.insert(entry.version, Arc::new(entry));
        Ok(())
    }
}

//! 테이블 프로필 카탈로그
//!
//! 연결/테이블별 soft delete 설정을 보관합니다. 암호화 컬럼은 코덱이 보관합니다.

use dashmap::DashMap;

/// 기본 soft delete 컬럼
pub const DEFAULT_SOFT_DELETE_COLUMN: &str = "deleted_at";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableProfile {
    pub soft_delete_column: Option<String>,
}

#[derive(Debug, Default)]
pub struct TableCatalog {
    profiles: DashMap<(String, String), TableProfile>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_soft_delete(&self, connection: &str, table: &str, column: &str) {
        self.profiles
            .entry((connection.to_string(), table.to_string()))
            .or_default()
            .soft_delete_column = Some(column.to_string());
    }

    pub fn disable_soft_delete(&self, connection: &str, table: &str) {
        if let Some(mut profile) = self.profiles.get_mut(&(connection.to_string(), table.to_string())) {
            profile.soft_delete_column = None;
        }
    }

    pub fn soft_delete_column(&self, connection: &str, table: &str) -> Option<String> {
        self.profiles
            .get(&(connection.to_string(), table.to_string()))
            .and_then(|profile| profile.soft_delete_column.clone())
    }

    pub fn rename_column(&self, connection: &str, table: &str, from: &str, to: &str) {
        if let Some(mut profile) = self.profiles.get_mut(&(connection.to_string(), table.to_string())) {
            if profile.soft_delete_column.as_deref() == Some(from) {
                profile.soft_delete_column = Some(to.to_string());
            }
        }
    }

    pub fn remove_table(&self, connection: &str, table: &str) {
        self.profiles.remove(&(connection.to_string(), table.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_delete_profile_lifecycle() {
        let catalog = TableCatalog::new();
        assert_eq!(catalog.soft_delete_column("c", "users"), None);

        catalog.enable_soft_delete("c", "users", DEFAULT_SOFT_DELETE_COLUMN);
        assert_eq!(catalog.soft_delete_column("c", "users").as_deref(), Some("deleted_at"));
        assert_eq!(catalog.soft_delete_column("other", "users"), None);

        catalog.rename_column("c", "users", "deleted_at", "removed_at");
        assert_eq!(catalog.soft_delete_column("c", "users").as_deref(), Some("removed_at"));

        catalog.remove_table("c", "users");
        assert_eq!(catalog.soft_delete_column("c", "users"), None);
    }
}

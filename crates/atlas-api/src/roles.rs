use std::collections::HashMap;

use atlas_types::models::UserProfile;
use serde::Deserialize;

/// Injected authorization/identity context.
///
/// Write permissions are decided by the home deployment's role
/// assignments; the catalog core never re-derives them, it only answers
/// lookups with whatever the hosting layer supplied.
pub trait RoleProvider: Send + Sync + 'static {
    /// Research clearance level; 0 means no role.
    fn research_level(&self, user_id: i64) -> i64;

    fn user_profile(&self, user_id: i64) -> Option<UserProfile>;
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    user_id: i64,
    research_level: i64,
    username: String,
    display_name: String,
    #[serde(default)]
    profile_picture_url: String,
}

#[derive(Debug, Deserialize)]
struct RoleFile {
    users: Vec<RoleEntry>,
}

/// Role table loaded from a JSON file, for deployments running without a
/// live identity provider.
#[derive(Default)]
pub struct StaticRoleProvider {
    levels: HashMap<i64, i64>,
    profiles: HashMap<i64, UserProfile>,
}

impl StaticRoleProvider {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let file: RoleFile = serde_json::from_str(raw)?;
        let mut provider = Self::default();
        for entry in file.users {
            provider.levels.insert(entry.user_id, entry.research_level);
            provider.profiles.insert(
                entry.user_id,
                UserProfile {
                    username: entry.username,
                    display_name: entry.display_name,
                    profile_picture_url: entry.profile_picture_url,
                },
            );
        }
        Ok(provider)
    }
}

impl RoleProvider for StaticRoleProvider {
    fn research_level(&self, user_id: i64) -> i64 {
        self.levels.get(&user_id).copied().unwrap_or(0)
    }

    fn user_profile(&self, user_id: i64) -> Option<UserProfile> {
        self.profiles.get(&user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_roles_from_json() {
        let provider = StaticRoleProvider::from_json(
            r#"{"users": [{"user_id": 42, "research_level": 3,
                "username": "franktorio", "display_name": "Franktorio"}]}"#,
        )
        .unwrap();

        assert_eq!(provider.research_level(42), 3);
        assert_eq!(provider.research_level(7), 0);
        assert_eq!(provider.user_profile(42).unwrap().username, "franktorio");
        assert!(provider.user_profile(7).is_none());
    }
}

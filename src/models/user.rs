use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Agent,
    #[default]
    Customer,
    Designer,
    Merchant,
}

impl UserRole {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "agent" => Some(Self::Agent),
            "customer" => Some(Self::Customer),
            "designer" => Some(Self::Designer),
            "merchant" => Some(Self::Merchant),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Customer => "customer",
            Self::Designer => "designer",
            Self::Merchant => "merchant",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub notifications: bool,
    pub email_notifications: bool,
    pub dark_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: true,
            email_notifications: true,
            dark_mode: false,
        }
    }
}

/// Account record. Credentials live with the auth collaborator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    /// Set by the upload collaborator; read-only here
    pub profile_photo: String,
    pub bio: String,
    pub phone: String,
    pub address: Address,
    pub preferences: Preferences,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    pub fn activity_status(&self, now: DateTime<Utc>, window: Duration) -> ActivityStatus {
        ActivityStatus::classify(self.last_seen, now, window)
    }

    /// What other users may see of this account.
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            profile_photo: self.profile_photo.clone(),
            bio: self.bio.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            is_active: self.is_active,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }

    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(bio) = &update.bio {
            self.bio = bio.clone();
        }
        if let Some(phone) = &update.phone {
            self.phone = phone.clone();
        }
        if let Some(address) = &update.address {
            self.address = address.clone();
        }
        if let Some(preferences) = update.preferences {
            self.preferences = preferences;
        }
    }
}

/// Another user's profile: no email, no preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub profile_photo: String,
    pub bio: String,
    pub phone: String,
    pub address: Address,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Self-service profile edit. Absent fields are left alone; a present
/// `address` or `preferences` replaces the stored one whole.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub preferences: Option<Preferences>,
}

/// `last_seen` bound for activity filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastSeen {
    After(DateTime<Utc>),
    AtOrBefore(DateTime<Utc>),
}

impl LastSeen {
    /// The bound that selects users with `status` at `now`.
    pub fn for_status(status: ActivityStatus, now: DateTime<Utc>, window: Duration) -> Self {
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::weeks(5200));
        let cutoff = now - window;
        match status {
            ActivityStatus::Active => Self::After(cutoff),
            ActivityStatus::Offline => Self::AtOrBefore(cutoff),
        }
    }
}

/// Criteria for user listings and search.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of name or email
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub last_seen: Option<LastSeen>,
    pub exclude: Option<Uuid>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if self.exclude == Some(user.id) {
            return false;
        }
        if self.role.is_some_and(|role| role != user.role) {
            return false;
        }
        match self.last_seen {
            Some(LastSeen::After(cutoff)) if user.last_seen <= cutoff => return false,
            Some(LastSeen::AtOrBefore(cutoff)) if user.last_seen > cutoff => return false,
            _ => {}
        }
        match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                user.name.to_lowercase().contains(&needle)
                    || user.email.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Sender identity embedded in delivered messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Recency classification derived from `last_seen`.
///
/// Distinct from presence: a user with an open socket is "online" even when
/// this reports `Offline`, until the next sweep refreshes `last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Offline,
}

impl ActivityStatus {
    pub fn classify(last_seen: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Self {
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::weeks(5200));
        if now.signed_duration_since(last_seen) < window {
            Self::Active
        } else {
            Self::Offline
        }
    }

    pub fn from_query(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

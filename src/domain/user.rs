use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::apply_text;

string_enum! {
    UserRole {
        Inspector("INSPECTOR", "Inspector"),
        Reviewer("REVIEWER", "Reviewer"),
        Admin("ADMIN", "Administrator"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub lbp_number: Option<String>,
    pub qualifications: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn can_review(&self) -> bool {
        matches!(self.role, UserRole::Reviewer | UserRole::Admin)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Option<UserRole>,
    pub lbp_number: Option<String>,
    pub qualifications: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileUpdate {
    pub name: Option<String>,
    pub lbp_number: Option<String>,
    pub qualifications: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}

impl UserProfileUpdate {
    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            if !name.trim().is_empty() {
                user.name = name.trim().to_string();
            }
        }
        apply_text(&mut user.lbp_number, self.lbp_number.map(|n| n.to_uppercase()));
        apply_text(&mut user.qualifications, self.qualifications);
        apply_text(&mut user.company, self.company);
        apply_text(&mut user.phone, self.phone);
    }
}

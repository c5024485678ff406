use serde::{Deserialize, Serialize};

/// A registered account.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub nickname: Option<String>,
    pub manager: Option<Box<User>>,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
    ReadOnly,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: String,
}

#[derive(Debug, Serialize)]
pub struct Audit {
    pub name: i64,
    pub revision: u32,
}

#[derive(Debug, Serialize)]
pub struct AuditedUser {
    #[serde(flatten)]
    pub audit: Audit,
    pub name: String,
}

pub type UserId = AccountId;
pub type AccountId = RawId;
pub type RawId = u64;

pub type Ping = Pong;
pub type Pong = Ping;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::users::repo_types::NewUser;

/// Request body for `POST /register`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    pub name: String,
    #[validate(email(message = "value is not a valid email address"))]
    pub email: String,
    pub phone: String,
    #[serde(default)]
    #[validate(length(
        min = 10,
        max = 100,
        message = "address must be between 10 and 100 characters"
    ))]
    pub address: Option<String>,
    pub password: String,
}

impl RegisterRequest {
    /// Record to insert, carrying the already hashed password.
    pub fn to_new_user(&self, password_hash: String) -> NewUser {
        NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            password: password_hash,
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

/// Public part of the user echoed back to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
}

impl From<RegisterRequest> for PublicUser {
    fn from(req: RegisterRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            phone: req.phone,
            address: req.address,
        }
    }
}

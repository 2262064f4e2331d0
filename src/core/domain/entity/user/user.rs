use thiserror::Error;

use crate::core::domain::entity::user::User;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateUserValidationError {
    #[error("user id must be positive, got {0}")]
    InvalidId(i32),
    #[error("user name must not be empty")]
    EmptyName,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
}

#[derive(Debug)]
pub struct UnvalidatedCreateUserInput {
    pub id: i32,
    pub name: String,
    pub email: String,
}

impl TryFrom<UnvalidatedCreateUserInput> for User {
    type Error = CreateUserValidationError;

    fn try_from(value: UnvalidatedCreateUserInput) -> Result<Self, Self::Error> {
        if value.id <= 0 {
            return Err(CreateUserValidationError::InvalidId(value.id));
        }
        let name = value.name.trim();
        if name.is_empty() {
            return Err(CreateUserValidationError::EmptyName);
        }
        match value.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(CreateUserValidationError::InvalidEmail(value.email)),
        }
        Ok(User {
            id: value.id,
            name: name.to_string(),
            email: value.email,
        })
    }
}

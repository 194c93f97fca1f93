//! Customer model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A debtor owned by a tenant user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub customer_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Customer {
    pub fn new(user_id: Uuid, input: CreateCustomer) -> Self {
        let now = Utc::now();
        Self {
            customer_id: Uuid::new_v4(),
            user_id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            notes: input.notes,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Email address, if one is set and not blank.
    pub fn email_address(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    /// Phone number, if one is set and not blank.
    pub fn phone_number(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Input for creating a customer.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateCustomer {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

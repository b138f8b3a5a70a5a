use common::UserId;
use serde::{Deserialize, Serialize};

/// A registered account as reported by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A buyer who checked out through a phone-verified guest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestIdentity {
    pub phone: String,
}

/// Who placed an order. Exactly one kind of identity per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OrderOwner {
    Registered(RegisteredUser),
    Guest(GuestIdentity),
}

/// Where an order confirmation can be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contact::Email(email) => write!(f, "{email}"),
            Contact::Phone(phone) => write!(f, "{phone}"),
        }
    }
}

impl OrderOwner {
    /// Returns the registered user id, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            OrderOwner::Registered(user) => Some(user.id),
            OrderOwner::Guest(_) => None,
        }
    }

    /// Returns true for guest orders.
    pub fn is_guest(&self) -> bool {
        matches!(self, OrderOwner::Guest(_))
    }

    /// Returns the contact the confirmation goes to.
    ///
    /// Registered users without an email on file have no contact.
    pub fn contact(&self) -> Option<Contact> {
        match self {
            OrderOwner::Registered(user) => user.email.clone().map(Contact::Email),
            OrderOwner::Guest(guest) => Some(Contact::Phone(guest.phone.clone())),
        }
    }

    /// Returns the label shown in admin order listings.
    pub fn display_name(&self) -> String {
        match self {
            OrderOwner::Registered(user) => user
                .name
                .clone()
                .or_else(|| user.email.clone())
                .unwrap_or_else(|| user.id.to_string()),
            OrderOwner::Guest(guest) => format!("Guest ({})", guest.phone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(name: Option<&str>, email: Option<&str>) -> OrderOwner {
        OrderOwner::Registered(RegisteredUser {
            id: UserId::new(),
            name: name.map(String::from),
            email: email.map(String::from),
        })
    }

    #[test]
    fn test_display_name_prefers_name_then_email() {
        assert_eq!(
            registered(Some("Ada"), Some("ada@example.com")).display_name(),
            "Ada"
        );
        assert_eq!(
            registered(None, Some("ada@example.com")).display_name(),
            "ada@example.com"
        );
    }

    #[test]
    fn test_guest_display_and_contact() {
        let guest = OrderOwner::Guest(GuestIdentity {
            phone: "+15550100".to_string(),
        });
        assert!(guest.is_guest());
        assert_eq!(guest.user_id(), None);
        assert_eq!(guest.display_name(), "Guest (+15550100)");
        assert_eq!(guest.contact(), Some(Contact::Phone("+15550100".into())));
    }

    #[test]
    fn test_registered_without_email_has_no_contact() {
        assert_eq!(registered(Some("Ada"), None).contact(), None);
    }

    #[test]
    fn test_owner_serialization_is_tagged() {
        let guest = OrderOwner::Guest(GuestIdentity {
            phone: "+15550100".to_string(),
        });
        let json = serde_json::to_value(&guest).unwrap();
        assert_eq!(json["kind"], "guest");
        assert_eq!(json["phone"], "+15550100");
    }
}

use common::UserId;

/// Filter for listing orders.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Only orders placed by this registered user.
    pub user_id: Option<UserId>,

    /// Only guest orders placed from this phone number.
    pub guest_phone: Option<String>,

    /// Only orders with this seen flag.
    pub is_seen: Option<bool>,

    /// Only orders with this paid flag.
    pub is_paid: Option<bool>,

    /// Only orders with this delivered flag.
    pub is_delivered: Option<bool>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Creates a query for one guest's orders.
    pub fn for_guest(phone: impl Into<String>) -> Self {
        Self {
            guest_phone: Some(phone.into()),
            ..Default::default()
        }
    }

    /// Creates a query for orders an admin has not looked at yet.
    pub fn unseen() -> Self {
        Self {
            is_seen: Some(false),
            ..Default::default()
        }
    }

    /// Sets the paid filter.
    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    /// Sets the delivered filter.
    pub fn delivered(mut self, is_delivered: bool) -> Self {
        self.is_delivered = Some(is_delivered);
        self
    }

    /// Sets the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of results to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if `order` passes every filter. Paging is not applied.
    pub fn matches(&self, order: &domain::Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.owner.user_id() != Some(user_id)
        {
            return false;
        }
        if let Some(phone) = &self.guest_phone {
            match &order.owner {
                domain::OrderOwner::Guest(guest) if &guest.phone == phone => {}
                _ => return false,
            }
        }
        if let Some(seen) = self.is_seen
            && order.is_seen != seen
        {
            return false;
        }
        if let Some(paid) = self.is_paid
            && order.is_paid != paid
        {
            return false;
        }
        if let Some(delivered) = self.is_delivered
            && order.is_delivered != delivered
        {
            return false;
        }
        true
    }
}

// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query key registry for the clinic domains
//!
//! Every family is built from its parent so that invalidating a parent always
//! reaches its children:
//!
//! ```text
//! appointments
//!   appointments/list
//!     appointments/list/{status=confirmed}
//!   appointments/detail/<id>
//!   appointments/range/{from=..,to=..}
//! ```

use super::query_key::{KeySegment, QueryKey};

pub mod appointments {
    use super::*;
    use chrono::NaiveDate;

    pub const DOMAIN: &str = "appointments";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    /// Filtered list, e.g. `[("status", "confirmed")]`
    pub fn list<I, K, V>(filters: I) -> QueryKey
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeySegment>,
    {
        lists().with(KeySegment::params(filters))
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }

    pub fn ranges() -> QueryKey {
        all().with("range")
    }

    /// Calendar view for an inclusive date range
    pub fn range(from: NaiveDate, to: NaiveDate) -> QueryKey {
        ranges().with(KeySegment::params([("from", from), ("to", to)]))
    }
}

pub mod patients {
    use super::*;

    pub const DOMAIN: &str = "patients";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }

    /// Appointment history of one patient
    pub fn appointments(id: impl Into<KeySegment>) -> QueryKey {
        detail(id).with("appointments")
    }
}

pub mod invoices {
    use super::*;

    pub const DOMAIN: &str = "billing-invoice";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }
}

pub mod payments {
    use super::*;

    pub const DOMAIN: &str = "billing-payment";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }

    /// Payments recorded against one invoice
    pub fn by_invoice(invoice_id: impl Into<KeySegment>) -> QueryKey {
        all().with("by-invoice").with(invoice_id)
    }
}

pub mod stock {
    use super::*;

    pub const DOMAIN: &str = "stock-item";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }

    pub fn low_stock() -> QueryKey {
        all().with("low-stock")
    }
}

pub mod staff {
    use super::*;

    pub const DOMAIN: &str = "staff";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: impl Into<KeySegment>) -> QueryKey {
        details().with(id)
    }
}

/// Aggregates derived from several domains
pub mod dashboard {
    use super::*;

    pub const DOMAIN: &str = "dashboard";

    pub fn all() -> QueryKey {
        QueryKey::domain(DOMAIN)
    }

    pub fn today_appointments() -> QueryKey {
        all().with("today-appointments")
    }

    pub fn revenue() -> QueryKey {
        all().with("revenue")
    }
}

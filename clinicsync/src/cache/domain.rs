// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical domains that mutations are issued against

use serde::{Deserialize, Serialize};

/// Logical domain of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationDomain {
    Appointments,
    Patients,
    BillingInvoice,
    BillingPayment,
    StockItem,
    Staff,
}

impl MutationDomain {
    pub const ALL: [MutationDomain; 6] = [
        MutationDomain::Appointments,
        MutationDomain::Patients,
        MutationDomain::BillingInvoice,
        MutationDomain::BillingPayment,
        MutationDomain::StockItem,
        MutationDomain::Staff,
    ];

    /// Domain name, also the first segment of the domain's query keys
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationDomain::Appointments => "appointments",
            MutationDomain::Patients => "patients",
            MutationDomain::BillingInvoice => "billing-invoice",
            MutationDomain::BillingPayment => "billing-payment",
            MutationDomain::StockItem => "stock-item",
            MutationDomain::Staff => "staff",
        }
    }
}

impl std::str::FromStr for MutationDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MutationDomain::ALL
            .iter()
            .find(|d| d.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!(
                    "Unknown mutation domain: {}. Valid options: {}",
                    s,
                    MutationDomain::ALL
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

impl std::fmt::Display for MutationDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

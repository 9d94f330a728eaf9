//! Legacy two-partner fields.
//!
//! Older consumers read a distribution as `partner_a` / `partner_b` with
//! their counts. Internally partners are always an ordered name list plus
//! integer slot indices; this module translates at the boundary only.

use serde::{Deserialize, Serialize};

use geo_partition_engine::{Distribution, PartnerCounts};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyPartnerFields {
    pub partner_a: String,
    pub partner_b: String,
    pub count_a: usize,
    pub count_b: usize,
}

impl LegacyPartnerFields {
    /// Legacy view of a two-partner distribution.
    pub fn from_distribution(distribution: &Distribution) -> Result<Self> {
        let [a, b] = distribution.partner_names.as_slice() else {
            return Err(Error::LegacyShape(distribution.partner_count()));
        };
        let count = |slot: usize| distribution.partner_counts.get(&slot).copied().unwrap_or(0);
        Ok(Self {
            partner_a: a.clone(),
            partner_b: b.clone(),
            count_a: count(0),
            count_b: count(1),
        })
    }

    /// Ordered partner names and slot counts.
    pub fn into_indexed(self) -> (Vec<String>, PartnerCounts) {
        let counts = PartnerCounts::from([(0, self.count_a), (1, self.count_b)]);
        (vec![self.partner_a, self.partner_b], counts)
    }

    /// Whether these fields describe `distribution`.
    pub fn describes(&self, distribution: &Distribution) -> bool {
        let (names, counts) = self.clone().into_indexed();
        names == distribution.partner_names && counts == distribution.partner_counts
    }
}

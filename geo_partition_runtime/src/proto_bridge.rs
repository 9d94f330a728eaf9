//! Proto ↔ domain conversion bridge.
//!
//! Encoding is infallible. Decoding rejects records with missing required
//! messages or out-of-range values as `StoreError::Corrupt`; header/row
//! consistency is checked by the caller.

use chrono::{DateTime, Utc};

use geo_partition_engine::{
    Assignment, AssignmentId, Distribution, DistributionId, FilterSnapshot, PartnerCounts,
    StructureId,
};

use crate::proto_types::*;
use crate::store::{StoreError, StoredDistribution};

/// Convert a stored distribution to its wire record.
pub fn record_to_proto(record: &StoredDistribution) -> ProtoDistributionRecord {
    let d = &record.distribution;
    ProtoDistributionRecord {
        distribution: Some(ProtoDistribution {
            id: d.id.0,
            name: d.name.clone(),
            filter: Some(filter_to_proto(&d.filter)),
            threshold_meters: d.threshold_meters,
            partner_names: d.partner_names.clone(),
            partner_counts: d
                .partner_counts
                .iter()
                .map(|(&slot, &count)| ProtoPartnerCount {
                    partner_index: slot as u32,
                    count: count as u64,
                })
                .collect(),
            total: d.total as u64,
            active: d.active,
            created_at: Some(ProtoTimestamp {
                seconds: d.created_at.timestamp(),
                nanos: d.created_at.timestamp_subsec_nanos(),
            }),
        }),
        assignments: record
            .assignments
            .iter()
            .map(|a| ProtoAssignment {
                id: a.id.0,
                structure_id: a.structure_id.0,
                partner_index: a.partner_index as u32,
                random: a.random,
            })
            .collect(),
    }
}

/// Convert a wire record back to a stored distribution.
pub fn proto_to_record(proto: &ProtoDistributionRecord) -> Result<StoredDistribution, StoreError> {
    let d = proto
        .distribution
        .as_ref()
        .ok_or_else(|| corrupt("distribution record has no header"))?;
    let id = DistributionId(d.id);

    let created = d
        .created_at
        .as_ref()
        .ok_or_else(|| corrupt(format!("distribution {} has no creation time", id)))?;
    let created_at: DateTime<Utc> = DateTime::from_timestamp(created.seconds, created.nanos)
        .ok_or_else(|| corrupt(format!("distribution {} has an invalid creation time", id)))?;

    let partner_counts: PartnerCounts = d
        .partner_counts
        .iter()
        .map(|c| (c.partner_index as usize, c.count as usize))
        .collect();

    let distribution = Distribution {
        id,
        name: d.name.clone(),
        filter: d.filter.as_ref().map(proto_to_filter).unwrap_or_default(),
        threshold_meters: d.threshold_meters,
        partner_names: d.partner_names.clone(),
        partner_counts,
        total: d.total as usize,
        active: d.active,
        created_at,
    };

    let assignments = proto
        .assignments
        .iter()
        .map(|a| Assignment {
            id: AssignmentId(a.id),
            distribution_id: id,
            structure_id: StructureId(a.structure_id),
            partner_index: a.partner_index as usize,
            random: a.random,
        })
        .collect();

    Ok(StoredDistribution {
        distribution,
        assignments,
    })
}

fn filter_to_proto(filter: &FilterSnapshot) -> ProtoFilterSnapshot {
    ProtoFilterSnapshot {
        categories: filter.categories.iter().cloned().collect(),
        regions: filter.regions.iter().cloned().collect(),
        localities: filter.localities.iter().cloned().collect(),
        tags: filter.tags.iter().cloned().collect(),
    }
}

fn proto_to_filter(proto: &ProtoFilterSnapshot) -> FilterSnapshot {
    FilterSnapshot {
        categories: proto.categories.iter().cloned().collect(),
        regions: proto.regions.iter().cloned().collect(),
        localities: proto.localities.iter().cloned().collect(),
        tags: proto.tags.iter().cloned().collect(),
    }
}

fn corrupt(msg: impl Into<String>) -> StoreError {
    StoreError::Corrupt(msg.into())
}

//! Deterministic traffic allocation. A visitor is hashed into one of 100 buckets and the
//! bucket is walked through the group's cumulative allocation weights, so the same visitor
//! always lands on the same variation.
use crate::bucketing::{Variation, VariationGroup};
use crate::{Error, Result};

const TOTAL_BUCKETS: u32 = 100;

/// Picks the variation for the visitor inside the group.
///
/// Returns [`Error::VisitorUnallocated`] when the group's allocation weights sum to less
/// than 100 and the visitor's bucket falls into the unallocated remainder.
pub(crate) fn allocate_variation<'a>(
    group: &'a VariationGroup,
    visitor_id: &str,
) -> Result<&'a Variation> {
    let bucket = bucket_of(visitor_id, &group.id);

    let mut cumulative = 0;
    for variation in &group.variations {
        cumulative += variation.allocation;
        if bucket < cumulative {
            return Ok(variation);
        }
    }

    Err(Error::VisitorUnallocated {
        visitor_id: visitor_id.to_owned(),
        variation_group_id: group.id.clone(),
    })
}

/// Hashes visitor id and group id into a bucket in `0..100`.
fn bucket_of(visitor_id: &str, group_id: &str) -> u32 {
    let mut input = Vec::with_capacity(visitor_id.len() + group_id.len());
    input.extend_from_slice(visitor_id.as_bytes());
    input.extend_from_slice(group_id.as_bytes());

    let hash = md5::compute(&input);
    // md5 digest is 16 bytes, so the slice is guaranteed to fit.
    let value = u32::from_be_bytes(hash[0..4].try_into().unwrap());
    value % TOTAL_BUCKETS
}

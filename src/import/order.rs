use super::normalize::PendingMutation;

/// Order mutations so foreign-key targets are written before their
/// dependents. The sort is keyed solely by dependency rank and must stay
/// stable: mutations sharing a rank keep their first-seen batch order,
/// which both covers dependencies the rank cannot express and keeps the
/// apply order reproducible.
pub fn sort_mutations(mutations: &mut [PendingMutation]) {
    mutations.sort_by_key(|m| m.entity.rank);
}

//! Free-text product resolution.
//!
//! Resolution order: exact id, case-insensitive exact name, substring
//! containment, then Levenshtein distance under a length-scaled threshold.
//! Ties at the same distance break by catalog order so resolution is
//! deterministic.

use crate::domain::product::Product;

/// Classic two-row Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Maximum accepted edit distance for a name of the given length.
///
/// Scales sub-linearly and is capped at 2, so short names ("vpn") cannot be
/// reached by arbitrary three-letter queries while typical product names
/// tolerate one or two typos.
fn threshold_for(name_len: usize) -> usize {
    (name_len / 4).clamp(1, 2)
}

/// Resolves a free-text query against the catalog.
///
/// Returns at most one product and never fails: empty queries, an empty
/// catalog and over-long queries all resolve to `None`.
pub fn resolve<'a>(query: &str, products: &'a [Product]) -> Option<&'a Product> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }

    // 1. Exact id.
    if let Some(product) = products.iter().find(|p| p.id == query) {
        return Some(product);
    }

    // 2. Case-insensitive exact name.
    if let Some(product) = products.iter().find(|p| p.name.to_lowercase() == query) {
        return Some(product);
    }

    // 3. Substring containment on name or id.
    if let Some(product) = products.iter().find(|p| {
        let name = p.name.to_lowercase();
        name.contains(&query) || query.contains(&name) || p.id.contains(&query)
    }) {
        return Some(product);
    }

    // 4. Edit distance, first-listed wins on ties.
    let mut best: Option<(usize, &Product)> = None;
    for product in products {
        let name = product.name.to_lowercase();
        let distance = levenshtein(&query, &name);
        if distance <= threshold_for(name.chars().count())
            && best.is_none_or(|(best_distance, _)| distance < best_distance)
        {
            best = Some((distance, product));
        }
    }
    best.map(|(_, product)| product)
}

use rust_decimal::Decimal;

/// Minimum similarity ratio for a fuzzy catalog match.
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.6;

/// A POS catalog product eligible for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogProduct {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

/// An event line item as supplied by the events platform.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub name: String,
    pub quantity: u32,
    pub price: Option<Decimal>,
}

/// How a source item was paired with its catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Substring,
    Fuzzy,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// A line item resolved against the POS catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLineItem {
    pub product_id: i64,
    /// Catalog-side product name, used for logs and the supply feed.
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub match_kind: MatchKind,
}

impl ResolvedLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Result of resolving a batch of source items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub items: Vec<ResolvedLineItem>,
    /// Source names that could not be paired with any catalog product.
    /// Dropped, never guessed into existence.
    pub unmatched: Vec<String>,
}

impl Resolution {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(ResolvedLineItem::line_total).sum()
    }
}

/// Resolves source items against a location's product catalog.
///
/// Matching per item, first hit wins: case-insensitive exact, substring in
/// either direction, then best fuzzy candidate at or above
/// [`FUZZY_MATCH_THRESHOLD`]. Price prefers the source value when positive
/// and falls back to the catalog price.
pub fn resolve_items(items: &[SourceItem], catalog: &[CatalogProduct]) -> Resolution {
    let mut resolution = Resolution::default();
    for item in items {
        if item.quantity == 0 {
            resolution.unmatched.push(item.name.clone());
            continue;
        }
        match match_product(&item.name, catalog) {
            Some((product, match_kind)) => {
                let unit_price = item
                    .price
                    .filter(|price| *price > Decimal::ZERO)
                    .unwrap_or(product.price);
                resolution.items.push(ResolvedLineItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    quantity: item.quantity,
                    unit_price,
                    match_kind,
                });
            }
            None => resolution.unmatched.push(item.name.clone()),
        }
    }
    resolution
}

/// Finds the catalog product for a source item name, if any.
pub fn match_product<'a>(
    name: &str,
    catalog: &'a [CatalogProduct],
) -> Option<(&'a CatalogProduct, MatchKind)> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    for product in catalog {
        if product.name.trim().to_lowercase() == needle {
            return Some((product, MatchKind::Exact));
        }
    }

    for product in catalog {
        let hay = product.name.trim().to_lowercase();
        if !hay.is_empty() && (hay.contains(&needle) || needle.contains(&hay)) {
            return Some((product, MatchKind::Substring));
        }
    }

    let mut best: Option<(&CatalogProduct, f64)> = None;
    for product in catalog {
        let score = similarity(&needle, &product.name.trim().to_lowercase());
        if score >= FUZZY_MATCH_THRESHOLD && best.map_or(true, |(_, leader)| score > leader) {
            best = Some((product, score));
        }
    }
    best.map(|(product, _)| (product, MatchKind::Fuzzy))
}

/// Normalized edit-distance ratio in `[0, 1]`; 1.0 means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 && b_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    1.0 - distance as f64 / a_len.max(b_len) as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

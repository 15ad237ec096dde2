pub mod envelope;
pub mod idempotency;
pub mod invoice;
pub mod resolver;
pub mod timegate;
pub mod types;

pub use envelope::{DeliveryEnvelope, EnvelopeError};
pub use idempotency::{DeliveryKey, IdempotencyGuard};
pub use invoice::extract_items;
pub use resolver::{
    match_product, resolve_items, CatalogProduct, MatchKind, Resolution, ResolvedLineItem,
    SourceItem, FUZZY_MATCH_THRESHOLD,
};
pub use timegate::GateDecision;
pub use types::{Ack, InjectionResult, OrderDetail, TriggerType};

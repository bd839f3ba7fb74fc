pub mod bill;
pub mod entity;
pub mod enums;
pub mod negotiation;

pub use bill::{BillRecord, LineItem};
pub use entity::{effective_timestamp, entity_id, EntityId};
pub use enums::{BillStatus, DiscountType, NegotiationStatus};
pub use negotiation::NegotiationCase;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}

pub mod gip;
pub mod mt76;

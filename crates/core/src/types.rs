/// Catalog option identifiers are 1-based integers assigned server-side.
pub type OptionId = i64;

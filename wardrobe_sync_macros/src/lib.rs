mod record;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Record)]
// ============================================================================

/// Derive macro for the `Record` trait (and `Identified` for id-keyed records).
///
/// # Usage
///
/// Id-keyed record (the `id: String` field is the key, placeholders can be assigned):
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Record)]
/// #[record(collection = "garments")]
/// struct Garment {
///     pub id: String,
///     pub name: String,
/// }
/// ```
///
/// Record keyed by a natural key instead of `id`:
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Record)]
/// #[record(collection = "planner")]
/// struct PlannerEntry {
///     #[record(key)]
///     pub date: String,
///     pub look_id: Option<String>,
/// }
/// ```
///
/// Without `collection`, the collection name defaults to the snake_case struct name plus `s`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}

//! Pure scoring models. Each takes already-fetched interactions and products and
//! returns ranked candidates; none of them touch a store.

pub mod collaborative;
pub mod content;
pub mod hybrid;
pub mod popularity;
pub mod tfidf;

pub use collaborative::{RatingMatrix, UserBasedCollaborative};
pub use content::ContentBasedFilter;
pub use hybrid::HybridCombiner;
pub use popularity::PopularityRanker;
pub use tfidf::TfIdfVectorizer;

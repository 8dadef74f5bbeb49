pub mod explanation;
pub mod lifecycle;
pub mod recommendation;
pub mod refresh;
pub mod serving;
pub mod store;

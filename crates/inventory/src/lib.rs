//! `comptoir-inventory`: articles and the rules for changing them.
//!
//! Pure domain code: validation of submitted patches and stock-delta
//! arithmetic. Persistence and batching live in `comptoir-infra`.

pub mod article;

pub use article::{
    Article, ArticlePatch, Availability, DESCRIPTION_MAX_CHARS, LIBELLE_MAX_CHARS, NewArticle, PRICE_MAX,
    PatchError, apply_stock_delta,
};

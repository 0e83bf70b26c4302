use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use comptoir_core::{ArticleId, DomainError, DomainResult, TenantId};

pub const LIBELLE_MAX_CHARS: usize = 255;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
/// Prices are stored as signed 64-bit integers.
pub const PRICE_MAX: u64 = i64::MAX as u64;

/// A stocked article.
///
/// # Invariants
/// - `libelle` is non-empty and `price <= PRICE_MAX`.
/// - [`Article::patched`] never yields a negative stock: deltas go through
///   [`apply_stock_delta`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub tenant_id: TenantId,
    pub libelle: String,
    pub description: Option<String>,
    /// Minor currency units.
    pub price: u64,
    pub stock: i64,
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn new(
        id: ArticleId,
        tenant_id: TenantId,
        libelle: impl Into<String>,
        description: Option<String>,
        price: u64,
        stock: i64,
    ) -> DomainResult<Self> {
        let draft = NewArticle::new(tenant_id, libelle, description, price, stock)?;
        Ok(draft.with_id(id, Utc::now()))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.stock > 0
    }

    pub fn matches(&self, availability: Option<Availability>) -> bool {
        match availability {
            None => true,
            Some(Availability::InStock) => self.is_available(),
            Some(Availability::OutOfStock) => !self.is_available(),
        }
    }

    /// Return the article with `patch` applied; the stock field of the patch is
    /// a delta on top of the current stock.
    pub fn patched(&self, patch: &ArticlePatch, now: DateTime<Utc>) -> Result<Article, PatchError> {
        let mut next = self.clone();
        if let Some(libelle) = &patch.libelle {
            next.libelle = libelle.clone();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(price) = patch.price {
            next.price = price;
        }
        if let Some(delta) = patch.stock_delta {
            next.stock = apply_stock_delta(self.stock, delta)?;
        }
        next.updated_at = Some(now);
        Ok(next)
    }
}

/// A validated article that has no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub tenant_id: TenantId,
    pub libelle: String,
    pub description: Option<String>,
    pub price: u64,
    pub stock: i64,
}

impl NewArticle {
    pub fn new(
        tenant_id: TenantId,
        libelle: impl Into<String>,
        description: Option<String>,
        price: u64,
        stock: i64,
    ) -> DomainResult<Self> {
        let libelle = validate_libelle(libelle.into()).map_err(DomainError::from)?;
        let description = validate_description(description).map_err(DomainError::from)?;
        let price = validate_price(price).map_err(DomainError::from)?;
        if stock < 0 {
            return Err(DomainError::invariant("stock cannot be negative"));
        }
        Ok(Self {
            tenant_id,
            libelle,
            description,
            price,
            stock,
        })
    }

    /// Validate a creation request. `libelle`, `price` and `stock` are
    /// required; `stock` is the opening quantity and cannot be negative.
    pub fn from_json(tenant_id: TenantId, obj: &Map<String, Value>) -> Result<Self, PatchError> {
        let libelle = match obj.get("libelle") {
            None | Some(Value::Null) => return Err(PatchError::invalid("libelle", "is required")),
            Some(v) => v
                .as_str()
                .ok_or_else(|| PatchError::invalid("libelle", "must be a string"))?,
        };
        let description = match obj.get("description") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(PatchError::invalid("description", "must be a string or null")),
        };
        let price = match obj.get("price") {
            None => return Err(PatchError::invalid("price", "is required")),
            Some(v) => parse_price(v)?,
        };
        let stock = match obj.get("stock") {
            None => return Err(PatchError::invalid("stock", "is required")),
            Some(v) => v
                .as_i64()
                .filter(|s| *s >= 0)
                .ok_or_else(|| PatchError::invalid("stock", "must be a non-negative integer"))?,
        };

        Ok(Self {
            tenant_id,
            libelle: validate_libelle(libelle.to_string())?,
            description: validate_description(description)?,
            price,
            stock,
        })
    }

    pub fn with_id(self, id: ArticleId, now: DateTime<Utc>) -> Article {
        Article {
            id,
            tenant_id: self.tenant_id,
            libelle: self.libelle,
            description: self.description,
            price: self.price,
            stock: self.stock,
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: None,
        }
    }
}

/// Stock filter for listings (`available=yes|no`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    InStock,
    OutOfStock,
}

impl Availability {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(Availability::InStock),
            "no" => Some(Availability::OutOfStock),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("no valid fields")]
    NoValidFields,

    #[error("negative stock")]
    NegativeStock,

    #[error("stock overflow")]
    StockOverflow,
}

impl PatchError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Another live article of the tenant already has this libelle.
    pub fn libelle_taken() -> Self {
        Self::invalid("libelle", "already used")
    }
}

impl From<PatchError> for DomainError {
    fn from(e: PatchError) -> Self {
        match e {
            PatchError::NegativeStock | PatchError::StockOverflow => DomainError::invariant(e.to_string()),
            other => DomainError::validation(other.to_string()),
        }
    }
}

/// Validated partial update of an article.
///
/// `description: Some(None)` clears the description. `stock_delta` is added to
/// the current stock, never assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePatch {
    pub libelle: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<u64>,
    pub stock_delta: Option<i64>,
}

impl ArticlePatch {
    pub fn is_empty(&self) -> bool {
        self.libelle.is_none() && self.description.is_none() && self.price.is_none() && self.stock_delta.is_none()
    }

    /// Validate the recognised fields of a submitted JSON object.
    ///
    /// Unknown keys (including `id`) are ignored. The first bad recognised
    /// field wins; an object with no recognised field is `NoValidFields`.
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, PatchError> {
        let mut patch = ArticlePatch::default();

        if let Some(v) = obj.get("libelle") {
            let s = v
                .as_str()
                .ok_or_else(|| PatchError::invalid("libelle", "must be a string"))?;
            patch.libelle = Some(validate_libelle(s.to_string())?);
        }

        if let Some(v) = obj.get("description") {
            let d = match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                _ => return Err(PatchError::invalid("description", "must be a string or null")),
            };
            patch.description = Some(validate_description(d)?);
        }

        if let Some(v) = obj.get("price") {
            patch.price = Some(parse_price(v)?);
        }

        if let Some(v) = obj.get("stock") {
            let delta = v
                .as_i64()
                .ok_or_else(|| PatchError::invalid("stock", "must be an integer"))?;
            patch.stock_delta = Some(delta);
        }

        if patch.is_empty() {
            return Err(PatchError::NoValidFields);
        }
        Ok(patch)
    }
}

/// `current + delta`, refusing results below zero.
pub fn apply_stock_delta(current: i64, delta: i64) -> Result<i64, PatchError> {
    let next = current.checked_add(delta).ok_or(PatchError::StockOverflow)?;
    if next < 0 {
        return Err(PatchError::NegativeStock);
    }
    Ok(next)
}

fn parse_price(v: &Value) -> Result<u64, PatchError> {
    let price = v
        .as_u64()
        .ok_or_else(|| PatchError::invalid("price", "must be a non-negative integer"))?;
    validate_price(price)
}

fn validate_price(price: u64) -> Result<u64, PatchError> {
    if price > PRICE_MAX {
        return Err(PatchError::invalid("price", format!("cannot exceed {PRICE_MAX}")));
    }
    Ok(price)
}

fn validate_libelle(libelle: String) -> Result<String, PatchError> {
    let trimmed = libelle.trim();
    if trimmed.is_empty() {
        return Err(PatchError::invalid("libelle", "cannot be empty"));
    }
    if trimmed.chars().count() > LIBELLE_MAX_CHARS {
        return Err(PatchError::invalid(
            "libelle",
            format!("longer than {LIBELLE_MAX_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>, PatchError> {
    match description {
        Some(d) if d.chars().count() > DESCRIPTION_MAX_CHARS => Err(PatchError::invalid(
            "description",
            format!("longer than {DESCRIPTION_MAX_CHARS} characters"),
        )),
        other => Ok(other),
    }
}

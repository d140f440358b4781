//! Category → SubCategory classification used on every ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::NAME_MAX_CHARS;
pub use crate::ids::{CategoryId, SubCategoryId};
use crate::store::StoreError;
use crate::validation::FieldErrors;

pub const CODE_MAX_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, code: &str) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = errors.require("name", name, NAME_MAX_CHARS);
        let code = errors.require("code", code, CODE_MAX_CHARS);
        errors.into_result()?;

        Ok(Self {
            id: CategoryId::new(),
            name,
            code: code.to_ascii_uppercase(),
            created_at: Utc::now(),
        })
    }
}

/// A SubCategory is only meaningful together with its owning [`Category`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    pub id: SubCategoryId,
    pub name: String,
    pub code: String,
    pub category: CategoryId,
    pub created_at: DateTime<Utc>,
}

impl SubCategory {
    pub fn new(name: &str, code: &str, category: CategoryId) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = errors.require("name", name, NAME_MAX_CHARS);
        let code = errors.require("code", code, CODE_MAX_CHARS);
        errors.into_result()?;

        Ok(Self {
            id: SubCategoryId::new(),
            name,
            code: code.to_ascii_uppercase(),
            category,
            created_at: Utc::now(),
        })
    }

    pub fn belongs_to(&self, category: CategoryId) -> bool {
        self.category == category
    }
}

/// `(id, name)` pair served to the form layer when a category is picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCategoryOption {
    pub id: SubCategoryId,
    pub name: String,
}

impl From<&SubCategory> for SubCategoryOption {
    fn from(subcategory: &SubCategory) -> Self {
        Self {
            id: subcategory.id,
            name: subcategory.name.clone(),
        }
    }
}

pub trait TaxonomyRepository: Send + Sync {
    fn insert_category(&self, category: Category) -> Result<Category, StoreError>;
    fn insert_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError>;

    fn update_category(&self, category: Category) -> Result<Category, StoreError>;
    /// Moving a subcategory to another category is refused while tickets use it.
    fn update_subcategory(&self, subcategory: SubCategory) -> Result<SubCategory, StoreError>;

    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;
    fn subcategory(&self, id: SubCategoryId) -> Result<Option<SubCategory>, StoreError>;

    fn categories(&self) -> Result<Vec<Category>, StoreError>;
    fn subcategories(&self) -> Result<Vec<SubCategory>, StoreError>;
    fn subcategories_of(&self, category: CategoryId) -> Result<Vec<SubCategory>, StoreError>;

    fn delete_category(&self, id: CategoryId) -> Result<(), StoreError>;
    fn delete_subcategory(&self, id: SubCategoryId) -> Result<(), StoreError>;
}

//! Country → Region → Centre reference hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::ids::{CentreId, CountryId, RegionId};
use crate::store::StoreError;
use crate::validation::FieldErrors;

pub const NAME_MAX_CHARS: usize = 30;
pub const ACRONYM_MAX_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    /// Two-letter code, stored upper-case and unique across countries.
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Country {
    pub fn new(name: &str, code: &str) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = errors.require("name", name, NAME_MAX_CHARS);
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push("code", "country code must be exactly two letters");
        }
        errors.into_result()?;

        Ok(Self {
            id: CountryId::new(),
            name,
            code,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub country: CountryId,
    pub created_at: DateTime<Utc>,
}

impl Region {
    pub fn new(name: &str, country: CountryId) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = errors.require("name", name, NAME_MAX_CHARS);
        errors.into_result()?;

        Ok(Self {
            id: RegionId::new(),
            name,
            country,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Centre {
    pub id: CentreId,
    pub name: String,
    pub acronym: String,
    pub region: RegionId,
    pub created_at: DateTime<Utc>,
}

impl Centre {
    pub fn new(name: &str, acronym: &str, region: RegionId) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = errors.require("name", name, NAME_MAX_CHARS);
        let acronym = errors.require("acronym", acronym, ACRONYM_MAX_CHARS);
        errors.into_result()?;

        Ok(Self {
            id: CentreId::new(),
            name,
            acronym: acronym.to_ascii_uppercase(),
            region,
            created_at: Utc::now(),
        })
    }
}

/// Storage contract for the geographic hierarchy.
///
/// Inserts fail with [`StoreError::MissingParent`] when the parent does not exist and
/// deletes fail with [`StoreError::ReferentialIntegrity`] while dependents remain.
pub trait DirectoryRepository: Send + Sync {
    fn insert_country(&self, country: Country) -> Result<Country, StoreError>;
    fn insert_region(&self, region: Region) -> Result<Region, StoreError>;
    fn insert_centre(&self, centre: Centre) -> Result<Centre, StoreError>;

    fn update_country(&self, country: Country) -> Result<Country, StoreError>;
    fn update_region(&self, region: Region) -> Result<Region, StoreError>;
    fn update_centre(&self, centre: Centre) -> Result<Centre, StoreError>;

    fn country(&self, id: CountryId) -> Result<Option<Country>, StoreError>;
    fn region(&self, id: RegionId) -> Result<Option<Region>, StoreError>;
    fn centre(&self, id: CentreId) -> Result<Option<Centre>, StoreError>;

    fn countries(&self) -> Result<Vec<Country>, StoreError>;
    fn regions(&self) -> Result<Vec<Region>, StoreError>;
    fn centres(&self) -> Result<Vec<Centre>, StoreError>;

    fn delete_country(&self, id: CountryId) -> Result<(), StoreError>;
    fn delete_region(&self, id: RegionId) -> Result<(), StoreError>;
    fn delete_centre(&self, id: CentreId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_is_normalised_to_upper_case() {
        let country = Country::new("Zambia", "zm").expect("valid country");
        assert_eq!(country.code, "ZM");
    }

    #[test]
    fn country_code_must_be_two_letters() {
        let errors = Country::new("Zambia", "ZMB").expect_err("three letters rejected");
        assert!(errors.has("code"));

        let errors = Country::new("", "Z1").expect_err("blank name and digit rejected");
        assert!(errors.has("name"));
        assert!(errors.has("code"));
    }

    #[test]
    fn centre_acronym_is_bounded() {
        let region = RegionId::new();
        let errors = Centre::new("Lumezi Primary", "LUMEZI", region).expect_err("too long");
        assert!(errors.has("acronym"));

        let centre = Centre::new("Lumezi Primary", "ldl", region).expect("valid centre");
        assert_eq!(centre.acronym, "LDL");
        assert_eq!(centre.region, region);
    }
}

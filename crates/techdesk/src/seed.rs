//! Reference data and demo accounts for local runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::Deserialize;
use tracing::info;

use crate::directory::{Centre, Country, DirectoryRepository, Region};
use crate::identity::{Identity, IdentityError, IdentityService, NewUser, Role};
use crate::ids::{CategoryId, CentreId, CountryId, RegionId, SubCategoryId, UserId};
use crate::notifications::NotificationSender;
use crate::store::{HelpdeskStore, StoreError};
use crate::taxonomy::{Category, SubCategory, TaxonomyRepository};
use crate::tickets::{NewTicketRequest, Priority, TicketService, TicketServiceError};
use crate::validation::FieldErrors;

const DIRECTORY_CSV: &str = "\
country_name,country_code,region_name,centre_name,centre_acronym
Zambia,ZM,Eastern Region,Lumezi Primary,LDL
Zambia,ZM,Western Region,Mayukwayukwa Secondary,MYS
Zambia,ZM,Western Region,Kanyajalo,KNJ
Zambia,ZM,Zambia Hub,Zambia Hub,HUB
South Africa,ZA,KwaZulu-Natal,Umlazi Learning Centre,UMZ
South Africa,ZA,Mpumalanga,Mbombela Centre,MBC
";

/// `(category name, code, [(subcategory name, code)])`.
const TAXONOMY: &[(&str, &str, &[(&str, &str)])] = &[
    (
        "Hardware",
        "HWE",
        &[
            ("Tablet Issues", "TAB"),
            ("Laptop Issues", "LAP"),
            ("Router Issues", "RTR"),
            ("Headphones Issues", "HDP"),
            ("Solar Kit Issues", "SOL"),
            ("General Power Issues", "PWR"),
            ("Other Hardware Issue", "OHW"),
        ],
    ),
    (
        "Software",
        "SWE",
        &[
            ("Google Drive Issues", "GDR"),
            ("Kolibri Issues", "KOL"),
            ("Tests/Assessments Issues", "TST"),
            ("Assign/Enroll Learners", "ENR"),
            ("Delete/Insert Learners", "DIL"),
            ("Classlist Issues", "CLS"),
            ("Other Software Issue", "OSW"),
        ],
    ),
    (
        "Operations",
        "OPS",
        &[
            ("Stock Sheet Issues", "STK"),
            ("Other Operational Issue", "OOP"),
        ],
    ),
];

/// A demo login. Geography is referenced by name and resolved against the catalog.
#[derive(Debug, Clone, Copy)]
pub struct DemoAccount {
    pub username: &'static str,
    pub password: &'static str,
    pub role: Role,
    pub country: Option<&'static str>,
    pub region: Option<&'static str>,
    pub centres: &'static [&'static str],
}

pub const DEMO_ACCOUNTS: &[DemoAccount] = &[
    DemoAccount {
        username: "superadmin",
        password: "Superadmin01",
        role: Role::SuperAdmin,
        country: None,
        region: None,
        centres: &[],
    },
    DemoAccount {
        username: "admin.zm",
        password: "AdminZambia1",
        role: Role::Admin,
        country: Some("ZM"),
        region: Some("Mpumalanga"),
        centres: &[],
    },
    DemoAccount {
        username: "mulenga",
        password: "Manager2024",
        role: Role::Manager,
        country: Some("ZA"),
        region: Some("KwaZulu-Natal"),
        centres: &[],
    },
    DemoAccount {
        username: "levy",
        password: "Technician1",
        role: Role::Technician,
        country: None,
        region: None,
        centres: &[],
    },
    DemoAccount {
        username: "ntipa",
        password: "Technician2",
        role: Role::Technician,
        country: None,
        region: None,
        centres: &[],
    },
    DemoAccount {
        username: "mwila",
        password: "Lumezi2024",
        role: Role::User,
        country: None,
        region: None,
        centres: &["Lumezi Primary"],
    },
    DemoAccount {
        username: "chipo",
        password: "Kanyajalo24",
        role: Role::User,
        country: None,
        region: None,
        centres: &["Kanyajalo"],
    },
];

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Validation(#[from] FieldErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Tickets(#[from] TicketServiceError),
    #[error("failed to read directory CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown {kind} '{name}' in seed data")]
    UnknownReference { kind: &'static str, name: String },
}

#[derive(Debug, Deserialize)]
struct DirectoryRow {
    country_name: String,
    country_code: String,
    region_name: String,
    centre_name: String,
    centre_acronym: String,
}

/// Name-keyed handles for everything seeded.
#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    pub countries: BTreeMap<String, CountryId>,
    pub regions: BTreeMap<String, RegionId>,
    pub centres: BTreeMap<String, CentreId>,
    pub categories: BTreeMap<String, CategoryId>,
    pub subcategories: BTreeMap<String, SubCategoryId>,
    pub users: BTreeMap<String, UserId>,
}

impl SeedCatalog {
    fn lookup<T: Copy>(
        map: &BTreeMap<String, T>,
        kind: &'static str,
        name: &str,
    ) -> Result<T, SeedError> {
        map.get(name)
            .copied()
            .ok_or_else(|| SeedError::UnknownReference {
                kind,
                name: name.to_string(),
            })
    }

    pub fn country(&self, code: &str) -> Result<CountryId, SeedError> {
        Self::lookup(&self.countries, "country", code)
    }

    pub fn region(&self, name: &str) -> Result<RegionId, SeedError> {
        Self::lookup(&self.regions, "region", name)
    }

    pub fn centre(&self, name: &str) -> Result<CentreId, SeedError> {
        Self::lookup(&self.centres, "centre", name)
    }

    pub fn category(&self, name: &str) -> Result<CategoryId, SeedError> {
        Self::lookup(&self.categories, "category", name)
    }

    pub fn subcategory(&self, name: &str) -> Result<SubCategoryId, SeedError> {
        Self::lookup(&self.subcategories, "subcategory", name)
    }

    pub fn user(&self, username: &str) -> Result<UserId, SeedError> {
        Self::lookup(&self.users, "user", username)
    }
}

/// Imports `country_name,country_code,region_name,centre_name,centre_acronym` rows,
/// reusing entities already created by earlier rows.
pub fn import_directory<R, S>(
    store: &S,
    reader: R,
    catalog: &mut SeedCatalog,
) -> Result<usize, SeedError>
where
    R: Read,
    S: DirectoryRepository + ?Sized,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut created = 0;
    for row in csv_reader.deserialize::<DirectoryRow>() {
        let row = row?;

        let code = row.country_code.to_ascii_uppercase();
        let country = match catalog.countries.get(&code) {
            Some(id) => *id,
            None => {
                let country = store.insert_country(Country::new(&row.country_name, &code)?)?;
                catalog.countries.insert(code, country.id);
                created += 1;
                country.id
            }
        };

        let region = match catalog.regions.get(&row.region_name) {
            Some(id) => *id,
            None => {
                let region = store.insert_region(Region::new(&row.region_name, country)?)?;
                catalog.regions.insert(row.region_name.clone(), region.id);
                created += 1;
                region.id
            }
        };

        if !catalog.centres.contains_key(&row.centre_name) {
            let centre =
                store.insert_centre(Centre::new(&row.centre_name, &row.centre_acronym, region)?)?;
            catalog.centres.insert(row.centre_name.clone(), centre.id);
            created += 1;
        }
    }

    Ok(created)
}

pub fn seed_taxonomy<S>(store: &S, catalog: &mut SeedCatalog) -> Result<(), SeedError>
where
    S: TaxonomyRepository + ?Sized,
{
    for (name, code, subcategories) in TAXONOMY {
        let category = store.insert_category(Category::new(name, code)?)?;
        catalog.categories.insert(category.name.clone(), category.id);
        for (sub_name, sub_code) in subcategories.iter() {
            let subcategory =
                store.insert_subcategory(SubCategory::new(sub_name, sub_code, category.id)?)?;
            catalog
                .subcategories
                .insert(subcategory.name.clone(), subcategory.id);
        }
    }
    Ok(())
}

/// Seeds the standard directory and taxonomy into an empty store.
pub fn seed_reference_data<S>(store: &S) -> Result<SeedCatalog, SeedError>
where
    S: HelpdeskStore + ?Sized,
{
    let mut catalog = SeedCatalog::default();
    let created = import_directory(store, DIRECTORY_CSV.as_bytes(), &mut catalog)?;
    seed_taxonomy(store, &mut catalog)?;
    info!(
        directory_entries = created,
        categories = catalog.categories.len(),
        subcategories = catalog.subcategories.len(),
        "reference data seeded"
    );
    Ok(catalog)
}

pub fn seed_demo_users<S>(
    identity: &IdentityService<S>,
    catalog: &mut SeedCatalog,
) -> Result<(), SeedError>
where
    S: HelpdeskStore + 'static,
{
    for account in DEMO_ACCOUNTS {
        let centres = account
            .centres
            .iter()
            .map(|name| catalog.centre(name))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let user = identity.register(NewUser {
            username: account.username.to_string(),
            email: Some(format!("{}@example.org", account.username)),
            password: account.password.to_string(),
            role: account.role,
            country: account.country.map(|code| catalog.country(code)).transpose()?,
            region: account.region.map(|name| catalog.region(name)).transpose()?,
            centres,
        })?;
        catalog.users.insert(user.username.clone(), user.id);
    }
    Ok(())
}

/// A handful of tickets across centres, filed by the demo accounts.
pub fn seed_demo_tickets<S, N>(
    tickets: &TicketService<S, N>,
    identity: &IdentityService<S>,
    catalog: &SeedCatalog,
) -> Result<usize, SeedError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let samples: [(&str, &str, &str, &str, &str, Priority); 4] = [
        (
            "mwila",
            "Lumezi Primary",
            "Hardware",
            "Tablet Issues",
            "Six tablets will not charge after the storm",
            Priority::High,
        ),
        (
            "mwila",
            "Lumezi Primary",
            "Software",
            "Kolibri Issues",
            "Kolibri shows an empty channel list",
            Priority::Medium,
        ),
        (
            "chipo",
            "Kanyajalo",
            "Operations",
            "Stock Sheet Issues",
            "Stock sheet totals do not match delivery",
            Priority::Low,
        ),
        (
            "superadmin",
            "Mbombela Centre",
            "Hardware",
            "Router Issues",
            "Router drops connection every hour",
            Priority::Medium,
        ),
    ];

    let mut created = 0;
    for (username, centre, category, subcategory, description, priority) in samples {
        let actor: Identity = identity.identity_for(catalog.user(username)?)?;
        tickets.create(
            &actor,
            NewTicketRequest {
                centre: Some(catalog.centre(centre)?),
                category: Some(catalog.category(category)?),
                subcategory: Some(catalog.subcategory(subcategory)?),
                title: None,
                description: description.to_string(),
                priority: Some(priority),
            },
        )?;
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn directory_import_reuses_existing_parents() {
        let store = InMemoryStore::new();
        let mut catalog = SeedCatalog::default();
        let created = import_directory(&store, DIRECTORY_CSV.as_bytes(), &mut catalog)
            .expect("directory imports");

        assert_eq!(catalog.countries.len(), 2);
        assert_eq!(catalog.regions.len(), 5);
        assert_eq!(catalog.centres.len(), 6);
        assert_eq!(created, 13);
        assert_eq!(store.regions().expect("regions").len(), 5);
    }

    #[test]
    fn taxonomy_codes_are_seeded() {
        let store = InMemoryStore::new();
        let catalog = seed_reference_data(&store).expect("seeded");
        let hardware = catalog.category("Hardware").expect("hardware");
        let subcategories = store.subcategories_of(hardware).expect("subcategories");
        assert_eq!(subcategories.len(), 7);
        assert!(subcategories.iter().any(|s| s.code == "TAB"));
    }

    #[test]
    fn demo_passwords_satisfy_the_policy() {
        let policy = crate::identity::PasswordPolicy::default();
        for account in DEMO_ACCOUNTS {
            assert!(
                policy.violations(account.password).is_empty(),
                "{} has a weak demo password",
                account.username
            );
        }
    }

    #[test]
    fn unknown_names_are_reported() {
        let catalog = SeedCatalog::default();
        assert!(matches!(
            catalog.centre("Atlantis"),
            Err(SeedError::UnknownReference { kind: "centre", .. })
        ));
    }
}
